use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),
    #[error("Validation failed: {0}")]
    Validation(String),
}
