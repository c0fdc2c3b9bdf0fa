use crate::di::{HookStage, ResolutionPath, ServiceKey};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error type for user supplied constructors, hooks and disposers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, MelderError>;

#[derive(Debug, Error)]
pub enum MelderError {
    #[error("Service not registered: {service} (resolution path: {path})")]
    UnregisteredService {
        service: ServiceKey,
        path: ResolutionPath,
    },

    #[error("Duplicate binding: {service} is already bound")]
    DuplicateBinding { service: ServiceKey },

    #[error("Ambiguous binding: {service} has {count} unnamed bindings")]
    AmbiguousBinding { service: ServiceKey, count: usize },

    #[error("Circular dependency detected for {service}: {cycle}")]
    CircularDependency {
        service: ServiceKey,
        cycle: ResolutionPath,
    },

    #[error("Constructor for {service} failed (resolution path: {path}): {source}")]
    Constructor {
        service: ServiceKey,
        path: ResolutionPath,
        #[source]
        source: BoxError,
    },

    #[error("{stage} hook for {service} failed (resolution path: {path}): {source}")]
    ActivationHook {
        service: ServiceKey,
        stage: HookStage,
        path: ResolutionPath,
        #[source]
        source: BoxError,
    },

    #[error("Scope {scope} is sealed")]
    ScopeSealed {
        scope: Uuid,
        service: Option<ServiceKey>,
    },

    #[error("{} disposal(s) failed while sealing {scope}: {}", .failures.len(), DisplayFailures(.failures))]
    DisposalAggregate {
        scope: Uuid,
        failures: Vec<DisposalFailure>,
    },

    #[error("Failed to downcast {service}: expected {expected}")]
    DowncastFailed {
        service: ServiceKey,
        expected: &'static str,
    },

    #[error("Invalid configuration for '{key}': {message}")]
    InvalidConfig { key: String, message: String },
}

impl MelderError {
    /// The service the error originated from, when there is one.
    pub fn service(&self) -> Option<&ServiceKey> {
        match self {
            Self::UnregisteredService { service, .. }
            | Self::DuplicateBinding { service }
            | Self::AmbiguousBinding { service, .. }
            | Self::CircularDependency { service, .. }
            | Self::Constructor { service, .. }
            | Self::ActivationHook { service, .. }
            | Self::DowncastFailed { service, .. } => Some(service),
            Self::ScopeSealed { service, .. } => service.as_ref(),
            Self::DisposalAggregate { .. } | Self::InvalidConfig { .. } => None,
        }
    }

    /// The resolution path recorded for resolution-time failures.
    pub fn path(&self) -> Option<&ResolutionPath> {
        match self {
            Self::UnregisteredService { path, .. }
            | Self::Constructor { path, .. }
            | Self::ActivationHook { path, .. } => Some(path),
            Self::CircularDependency { cycle, .. } => Some(cycle),
            _ => None,
        }
    }

    pub(crate) fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// One disposer that failed while a scope or the container was being sealed.
#[derive(Debug)]
pub struct DisposalFailure {
    pub service: ServiceKey,
    pub error: BoxError,
}

impl fmt::Display for DisposalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}

struct DisplayFailures<'a>(&'a [DisposalFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}
