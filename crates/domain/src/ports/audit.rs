use crate::DomainResult;
use crate::audit::AuditEvent;

/// Best-effort audit log. Callers log and swallow failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}
