use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("forbidden")]
    Forbidden,
    #[error("cannot open a chat on your own listing")]
    SelfContact,
    #[error("thread is not empty")]
    NotEmpty,
    #[error("storage unavailable: {0}")]
    Storage(String),
}
