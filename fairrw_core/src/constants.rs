//! Constants and tuning knobs for the reentrant read-write lock

/// Polls between `yield_now` calls for `WaitStrategy::SpinThenYield`.
pub const DEFAULT_SPIN_LIMIT: u32 = 100;

/// Ids handed out by `HolderId::current` start here. Raw ids chosen by
/// callers must stay below it or they may alias a thread.
pub const THREAD_HOLDER_BASE: u64 = 1 << 63;

/// Handle ids start here; 0 is reserved for null/invalid.
pub const FIRST_HANDLE_ID: u64 = 1;

// metric names
pub const METRIC_WRITE_GRANTS: &str = "fairrw_write_grants_total";
pub const METRIC_READ_GRANTS: &str = "fairrw_read_grants_total";
pub const METRIC_REENTRANT_WRITE_GRANTS: &str = "fairrw_reentrant_write_grants_total";
pub const METRIC_BLOCKED: &str = "fairrw_blocked_total";
pub const METRIC_WAKEUPS: &str = "fairrw_wakeups_total";
pub const METRIC_USAGE_ERRORS: &str = "fairrw_usage_errors_total";
pub const METRIC_QUEUE_LEN: &str = "fairrw_queue_len";
pub const METRIC_SPIN_ITERATIONS: &str = "fairrw_spin_iterations";
