//! Reentrant, FIFO-biased read-write lock built from one monitor plus a
//! spin-wait protocol.
//!
//! - A writer may re-acquire the lock it holds without blocking.
//! - Readers run concurrently, batched together, as long as no writer is
//!   running or waiting anywhere in the queue.
//! - A writer never runs together with readers or with another writer.
//!
//! Writers can still starve if readers keep arriving before any writer is
//! queued; there is no upgrade from read to write and no timeout.
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::error;
use metrics::gauge;

use crate::constants::METRIC_QUEUE_LEN;
use crate::diagnostics::{DiagnosticSink, LogSink, QueueSnapshot, SnapshotCause};
use crate::errors::Error;
use crate::state::LockState;
use crate::types::{Admission, EntryKind, HolderId, WaitEntry};
use crate::wait::WaitStrategy;

/// Construction-time settings.
#[derive(Clone)]
pub struct LockConfig {
    pub wait: WaitStrategy,
    pub sink: Option<Arc<dyn DiagnosticSink>>,
    /// Fall back to [`LogSink`] when no sink is given.
    pub log_snapshots: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait: WaitStrategy::default(),
            sink: None,
            log_snapshots: true,
        }
    }
}

impl fmt::Debug for LockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockConfig")
            .field("wait", &self.wait)
            .field("sink", &self.sink.as_ref().map(|_| "<dyn DiagnosticSink>"))
            .field("log_snapshots", &self.log_snapshots)
            .finish()
    }
}

impl LockConfig {
    pub fn wait_strategy(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn log_snapshots(mut self, enabled: bool) -> Self {
        self.log_snapshots = enabled;
        self
    }
}

pub struct ReentrantRwLock {
    state: Mutex<LockState>,
    wait: WaitStrategy,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for ReentrantRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReentrantRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ReentrantRwLock");
        match self.state.try_lock() {
            Ok(state) => d
                .field("queue_len", &state.len())
                .field("writer_depth", &state.writer_depth())
                .field("reader_depth", &state.reader_depth()),
            Err(_) => d.field("state", &"<locked>"),
        };
        d.field("wait", &self.wait).finish()
    }
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    pub fn with_config(config: LockConfig) -> Self {
        crate::ensure_logging();
        crate::telemetry::init();
        let sink = match config.sink {
            Some(sink) => Some(sink),
            None if config.log_snapshots => Some(Arc::new(LogSink) as Arc<dyn DiagnosticSink>),
            None => None,
        };
        Self {
            state: Mutex::new(LockState::new()),
            wait: config.wait,
            sink,
        }
    }

    #[inline]
    fn lock_state(&self) -> Result<MutexGuard<'_, LockState>, Error> {
        self.state.lock().map_err(|_| Error::Poisoned)
    }

    /// Run one state transition inside the critical section, then report
    /// the resulting queue outside it.
    fn transition<T>(
        &self,
        f: impl FnOnce(&mut LockState) -> Result<T, Error>,
        cause: impl FnOnce(&T) -> SnapshotCause,
    ) -> Result<T, Error> {
        let (out, snapshot) = {
            let mut state = self.lock_state()?;
            let out = f(&mut state)?;
            #[cfg(debug_assertions)]
            state.check_invariants();
            gauge!(METRIC_QUEUE_LEN).set(state.len() as f64);
            let snapshot = self.sink.as_ref().map(|_| state.snapshot(Some(cause(&out))));
            (out, snapshot)
        };
        if let (Some(sink), Some(snapshot)) = (&self.sink, snapshot) {
            sink.on_snapshot(&snapshot);
        }
        Ok(out)
    }

    fn admit(&self, kind: EntryKind, holder: HolderId) -> Result<(), Error> {
        let admission = self.transition(
            |state| match kind {
                EntryKind::Writer => state.admit_writer(holder),
                EntryKind::Reader => state.admit_reader(holder),
            },
            |adm| match (adm, kind) {
                (Admission::Blocked(_), kind) => SnapshotCause::Blocked(kind),
                (Admission::Reentrant, _) => SnapshotCause::ReentrantWriteGranted,
                (Admission::Granted, EntryKind::Writer) => SnapshotCause::WriteGranted,
                (Admission::Granted, EntryKind::Reader) => SnapshotCause::ReadGranted,
            },
        )?;
        if let Admission::Blocked(entry) = admission {
            self.spin_on(&entry);
        }
        Ok(())
    }

    fn spin_on(&self, entry: &WaitEntry) {
        self.wait.wait_until_running(entry);
    }

    /// Acquire exclusive access, spinning until granted. Reentrant for the
    /// holder that currently owns the write lock.
    pub fn acquire_write(&self, holder: HolderId) -> Result<(), Error> {
        self.admit(EntryKind::Writer, holder)
    }

    /// Acquire shared access, spinning until granted.
    pub fn acquire_read(&self, holder: HolderId) -> Result<(), Error> {
        self.admit(EntryKind::Reader, holder)
    }

    pub fn release_write(&self, holder: HolderId) -> Result<(), Error> {
        self.transition(
            |state| state.release_writer(holder),
            |_| SnapshotCause::WriteReleased,
        )
    }

    pub fn release_read(&self, holder: HolderId) -> Result<(), Error> {
        self.transition(
            |state| state.release_reader(holder),
            |_| SnapshotCause::ReadReleased,
        )
    }

    /// Acquire exclusive access and release it when the guard drops.
    pub fn write(&self, holder: HolderId) -> Result<WriteGuard<'_>, Error> {
        self.acquire_write(holder)?;
        Ok(WriteGuard { lock: self, holder })
    }

    /// Acquire shared access and release it when the guard drops.
    pub fn read(&self, holder: HolderId) -> Result<ReadGuard<'_>, Error> {
        self.acquire_read(holder)?;
        Ok(ReadGuard { lock: self, holder })
    }

    /// Copy of the queue and counters, taken inside the critical section.
    pub fn snapshot(&self) -> Result<QueueSnapshot, Error> {
        Ok(self.lock_state()?.snapshot(None))
    }

    pub fn is_idle(&self) -> Result<bool, Error> {
        Ok(self.lock_state()?.is_empty())
    }

    pub fn queue_len(&self) -> Result<usize, Error> {
        Ok(self.lock_state()?.len())
    }
}

/// Represents an acquired exclusive (write) lock.
/// The lock is released when this guard is dropped.
#[must_use = "if unused the lock will immediately unlock"]
pub struct WriteGuard<'a> {
    lock: &'a ReentrantRwLock,
    holder: HolderId,
}

impl WriteGuard<'_> {
    pub fn holder(&self) -> HolderId {
        self.holder
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release_write(self.holder) {
            error!("[WRITE_GUARD] release for holder={} failed: {}", self.holder, e);
        }
    }
}

/// Represents an acquired shared (read) lock.
/// The lock is released when this guard is dropped.
#[must_use = "if unused the lock will immediately unlock"]
pub struct ReadGuard<'a> {
    lock: &'a ReentrantRwLock,
    holder: HolderId,
}

impl ReadGuard<'_> {
    pub fn holder(&self) -> HolderId {
        self.holder
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release_read(self.holder) {
            error!("[READ_GUARD] release for holder={} failed: {}", self.holder, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{get_last_error, ErrorCode};
    use crate::handle_registry::{get_handle, register_handle, unregister_handle};
    use crate::public_api::{fairrw_acquire_write, fairrw_queue_len};
    use std::thread;

    fn poison(lock: &Arc<ReentrantRwLock>) {
        let lock = Arc::clone(lock);
        let died = thread::spawn(move || {
            let _state = lock.state.lock().unwrap();
            panic!("dies inside the critical section");
        })
        .join();
        assert!(died.is_err());
    }

    #[test]
    fn poisoned_state_fails_every_operation() {
        let lock = Arc::new(ReentrantRwLock::with_config(
            LockConfig::default().log_snapshots(false),
        ));
        let me = HolderId::from_raw(1);
        lock.acquire_write(me).unwrap();
        poison(&lock);

        assert_eq!(lock.acquire_write(me), Err(Error::Poisoned));
        assert_eq!(lock.acquire_read(me), Err(Error::Poisoned));
        assert_eq!(lock.release_write(me), Err(Error::Poisoned));
        assert_eq!(lock.release_read(me), Err(Error::Poisoned));
        assert_eq!(lock.snapshot().err(), Some(Error::Poisoned));
        assert_eq!(lock.is_idle(), Err(Error::Poisoned));
        assert_eq!(lock.queue_len(), Err(Error::Poisoned));
        assert!(lock.write(me).is_err());
        assert!(lock.read(me).is_err());
    }

    #[test]
    fn poisoned_handle_reports_poisoned_code() {
        let h = register_handle(ReentrantRwLock::with_config(
            LockConfig::default().log_snapshots(false),
        ))
        .unwrap();
        poison(&get_handle(h).unwrap());

        assert_eq!(fairrw_acquire_write(h, 1), ErrorCode::Poisoned);
        assert_eq!(get_last_error(), ErrorCode::Poisoned);
        let mut len = 0usize;
        assert_eq!(fairrw_queue_len(h, &mut len), ErrorCode::Poisoned);
        unregister_handle(h).unwrap();
    }

    #[test]
    fn guards_release_on_drop() {
        let lock = ReentrantRwLock::with_config(LockConfig::default().log_snapshots(false));
        let me = HolderId::from_raw(7);
        {
            let outer = lock.write(me).unwrap();
            let _inner = lock.write(outer.holder()).unwrap();
            assert_eq!(lock.snapshot().unwrap().writer_depth, 2);
        }
        assert!(lock.is_idle().unwrap());
        {
            let _r = lock.read(me).unwrap();
            assert_eq!(lock.queue_len().unwrap(), 1);
        }
        assert!(lock.is_idle().unwrap());
    }
}
