use thiserror::Error;

/// Construction-time contract violations. Operational hiccups (double
/// recorder start, undo on an empty log, ...) are warnings, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("text source content must not be empty")]
    EmptyContent,
    #[error("a typing session needs either text or a text source")]
    MissingInput,
}
