pub mod constants;
pub mod diagnostics;
pub mod errors;
pub mod handle_registry;
pub mod public_api;
pub mod reentrant_rwlock;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod wait;

pub use crate::diagnostics::{DiagnosticSink, EntrySnapshot, LogSink, QueueSnapshot, SnapshotCause};
pub use crate::errors::{Error, ErrorCode};
pub use crate::reentrant_rwlock::{LockConfig, ReadGuard, ReentrantRwLock, WriteGuard};
pub use crate::types::{EntryKind, EntryStatus, HolderId};
pub use crate::wait::WaitStrategy;

use once_cell::sync::OnceCell;

// ---- logging bootstraper -------------------------------------------------
pub(crate) fn ensure_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        // Fallback: simple env_logger with RFC‑3339 ts off.
        let _ = env_logger::builder()
            .format_timestamp(None)
            .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
            .try_init();
    });
}
