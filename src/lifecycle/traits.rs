//! Disposal contract
//!
//! Services that hold resources implement [`Dispose`] so the scope (or the
//! container, for `Unique` services) that created them can release them.

use crate::error::BoxError;

/// Called when the scope owning an instance is sealed
///
/// Use this hook to:
/// - Close connections
/// - Flush buffers
/// - Join worker threads
/// - Release file handles
///
/// # Note
///
/// Instances are disposed in **reverse order** of their creation so that a
/// dependent is always disposed before the services it depends on. A failing
/// disposer does not stop the remaining ones from running.
///
/// # Example
///
/// ```rust
/// use melder::{BoxError, Dispose};
/// use std::sync::Mutex;
///
/// struct ConnectionPool {
///     open: Mutex<usize>,
/// }
///
/// impl Dispose for ConnectionPool {
///     fn dispose(&self) -> Result<(), BoxError> {
///         *self.open.lock().unwrap() = 0;
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync {
    /// Release the resources held by this instance.
    ///
    /// May be called at most once per registered instance.
    fn dispose(&self) -> Result<(), BoxError>;
}
