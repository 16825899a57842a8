use thiserror::Error;

/// Returned by a [`crate::Database`] method an engine has not implemented.
///
/// Carries no payload; the command layer maps it onto [`CommandError::Unimplemented`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation not implemented by this engine")]
pub struct Unimplemented;

/// The outcome of one REPL command, as seen by the command layer.
///
/// Engines never return this directly — they either succeed or panic on an
/// invariant violation, which is deliberately not recoverable. `CommandError`
/// is produced only at the command-dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// An unrecognized command token.
    #[error("Invalid command")]
    Invalid,
    /// The selected engine does not implement the requested operation.
    #[error("Unimplemented command")]
    Unimplemented,
    /// Pseudo-error signaling a clean `quit`.
    #[error("Quit")]
    Quit,
}

impl From<Unimplemented> for CommandError {
    fn from(_: Unimplemented) -> Self {
        CommandError::Unimplemented
    }
}
