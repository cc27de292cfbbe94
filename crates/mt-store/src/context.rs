//! Component A: the tenant-context provider.
//!
//! Tenant identity is process-wide state scoped to the current logical
//! caller (§5). We model it as task-local storage, matching the
//! `tokio::task_local!` forwarder/log-level pattern used elsewhere in this
//! codebase for other per-call ambient state. A value of the empty string
//! is the sentinel "no tenant" and is rejected by tenant-scoped facade
//! operations.

tokio::task_local! {
    static TENANT_ID: String;
}

/// The empty string is the sentinel for "no tenant bound".
pub const NO_TENANT: &str = "";

/// Returns the tenant id bound to the current logical operation, or the
/// empty-string sentinel if none is bound. Every public facade operation
/// calls this exactly once at entry (§5) and threads the result explicitly
/// through everything below it; nested/recursive context changes within a
/// single logical operation are not supported.
pub fn current_tenant() -> String {
    TENANT_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| NO_TENANT.to_string())
}

/// Runs `f` with `tenant_id` bound as the current tenant for the duration
/// of the returned future. Intended for host processes (request handlers,
/// tests) that need to establish the ambient tenant before calling into a
/// facade.
pub async fn with_tenant<F, T>(tenant_id: impl Into<String>, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    TENANT_ID.scope(tenant_id.into(), f).await
}
