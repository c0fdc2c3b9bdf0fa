//! Lifecycle Module
//!
//! Disposal of the instances a scope or the container owns.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Bindings registered (graph validated)
//!    ↓
//! 2. State created
//!    ↓
//! 3. meld() builds instances        ← Dispose instances are tracked
//!    ↓
//! [Running...]
//!    ↓
//! 4. State::seal()                  ← Dispose (reverse order)
//!    ↓
//! 5. Container::shutdown()          ← remaining states, root scope, Unique services
//! ```

mod manager;
mod traits;

pub use manager::DisposalList;
pub use traits::Dispose;
