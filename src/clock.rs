use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, used for heartbeat timestamps and TTL
/// bookkeeping. Never exposed to clients directly — only compared against
/// itself.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}
