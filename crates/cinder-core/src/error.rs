//! Error types for the core engine.

use thiserror::Error;

/// Engine-level failures callers handle programmatically; command-level
/// failures travel as error reply frames instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A database index outside the configured range was selected.
    #[error("ERR DB index is out of range")]
    BadDbIndex,
}
