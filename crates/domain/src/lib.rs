pub mod audit;
pub mod chat;
pub mod error;
pub mod identity;
pub mod listing;
pub mod ports;
pub mod unread;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
