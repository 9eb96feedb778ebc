use crate::DomainResult;
use crate::listing::NewDeal;

/// Sink that persists a new deal and returns its generated id.
pub trait DealSink: Send + Sync {
    fn create_deal(&self, deal: &NewDeal) -> crate::ports::BoxFuture<'_, DomainResult<String>>;
}
