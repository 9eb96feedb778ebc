use crate::DomainResult;
use crate::listing::{PropertyRef, UserRef};

/// Read-side view of the listing catalogue. The chat core never mutates
/// listings except to adopt an ownerless one onto the fallback assignee.
pub trait PropertyDirectory: Send + Sync {
    fn get_property(
        &self,
        property_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<PropertyRef>>>;

    fn assign_owner(
        &self,
        property_id: &str,
        owner_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}

pub trait UserDirectory: Send + Sync {
    fn get_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserRef>>>;
}
