use thiserror::Error;

/// The "store" and "corruption" kinds of the error taxonomy. Every variant
/// here is either retried internally or escalated — never surfaced
/// directly to a client (§7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no record found")]
    NotFound,

    #[error("persisted state failed invariant checks: {0}")]
    CorruptState(String),
}
