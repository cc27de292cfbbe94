/// Error kinds surfaced by the facades, table mapping, and streams cache.
///
/// Rewriting errors (everything except the pass-through variants) are
/// raised before any physical call is made. `ConditionalCheckFailed` and
/// `IteratorExpired` are pass-through: the underlying store/streams client
/// raised them and this crate forwards them unchanged, except for the case
/// in §4.E where the rewriter itself proves a condition constant-true or
/// constant-false.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No tenant is bound to the current logical operation (empty-string sentinel).
    #[error("no tenant context is bound to the current operation")]
    NoTenantContext,

    #[error("virtual table '{0}' does not exist")]
    TableNotFound(String),

    #[error("virtual table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("virtual table schema is incompatible with the physical table: {0}")]
    IncompatibleSchema(String),

    #[error("no physical secondary index is compatible with virtual index '{0}'")]
    NoCompatibleIndex(String),

    #[error("unsupported key-condition predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("malformed physical key: {0}")]
    MalformedPhysicalKey(String),

    #[error("conditional check failed")]
    ConditionalCheckFailed,

    #[error("rate limit exceeded after retries were exhausted")]
    LimitExceeded,

    #[error("iterator expired")]
    IteratorExpired,

    #[error("operation cancelled")]
    Cancelled,

    /// Error surfaced unchanged from the external store/streams client or
    /// the table-metadata repository.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sentinel error types an external `StoreClient`/streams-endpoint
/// implementation raises (wrapped in `anyhow::Error`) to signal a
/// specific physical-layer condition that the façade must map back to a
/// typed `Error` variant rather than forwarding as opaque `Upstream`.
#[derive(Debug, thiserror::Error)]
#[error("conditional check failed")]
pub struct ConditionalCheckFailedMarker;

#[derive(Debug, thiserror::Error)]
#[error("rate limit exceeded")]
pub struct LimitExceededMarker;

#[derive(Debug, thiserror::Error)]
#[error("iterator expired")]
pub struct IteratorExpiredMarker;

#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct CancelledMarker;

/// Classifies an `anyhow::Error` surfaced by an external collaborator,
/// recovering the typed variant when the error carries one of the marker
/// types above, and falling back to `Upstream` otherwise.
pub fn classify_upstream(err: anyhow::Error) -> Error {
    if err.downcast_ref::<ConditionalCheckFailedMarker>().is_some() {
        Error::ConditionalCheckFailed
    } else if err.downcast_ref::<LimitExceededMarker>().is_some() {
        Error::LimitExceeded
    } else if err.downcast_ref::<IteratorExpiredMarker>().is_some() {
        Error::IteratorExpired
    } else if err.downcast_ref::<CancelledMarker>().is_some() {
        Error::Cancelled
    } else {
        Error::Upstream(err)
    }
}
