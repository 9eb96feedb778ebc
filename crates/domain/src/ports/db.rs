use thiserror::Error;

use crate::ports::BoxFuture;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

pub trait DbAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>>;
}
