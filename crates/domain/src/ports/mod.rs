use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod audit;
pub mod chat;
pub mod db;
pub mod deal;
pub mod directory;
pub mod read_store;
