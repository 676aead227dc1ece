//! Lock state: the wait queue, the two reentrancy counters, and the
//! admission / release / wake protocol that mutates them.
//!
//! Everything here runs inside the lock's single critical section; nothing
//! in this module blocks or spins.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, trace, warn};
use metrics::counter;

use crate::constants::*;
use crate::diagnostics::{EntrySnapshot, QueueSnapshot, SnapshotCause};
use crate::errors::Error;
use crate::types::{Admission, EntryKind, EntryStatus, HolderId, WaitEntry};

#[derive(Debug, Default)]
pub struct LockState {
    queue: VecDeque<Arc<WaitEntry>>,
    writer_depth: usize,
    reader_depth: usize,
    last_running: Option<HolderId>,
    /// Outstanding read acquisitions per holder. Only consulted to reject
    /// misuse; queue shape and counters never depend on it.
    read_holds: HashMap<HolderId, usize>,
    seq: u64,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn writer_depth(&self) -> usize {
        self.writer_depth
    }

    #[inline]
    pub fn reader_depth(&self) -> usize {
        self.reader_depth
    }

    #[inline]
    pub fn last_running(&self) -> Option<HolderId> {
        self.last_running
    }

    // ---- admission ----------------------------------------------------------

    /// Decide an arriving write request.
    pub fn admit_writer(&mut self, holder: HolderId) -> Result<Admission, Error> {
        if self.queue.is_empty() {
            self.enqueue_running(EntryKind::Writer, holder);
            self.writer_depth = 1;
            counter!(METRIC_WRITE_GRANTS).increment(1);
            debug!("[ACQUIRE_WRITE] holder={} granted on empty queue", holder);
            return Ok(Admission::Granted);
        }

        if self.is_running_writer(holder) {
            self.writer_depth += 1;
            counter!(METRIC_REENTRANT_WRITE_GRANTS).increment(1);
            debug!(
                "[ACQUIRE_WRITE] holder={} reentrant, writer_depth={}",
                holder, self.writer_depth
            );
            return Ok(Admission::Reentrant);
        }

        if self.holds_read(holder) {
            counter!(METRIC_USAGE_ERRORS).increment(1);
            warn!("[ACQUIRE_WRITE] holder={} holds a read lock; upgrade refused", holder);
            return Err(Error::WouldDeadlock {
                holder,
                kind: EntryKind::Writer,
            });
        }

        let entry = self.enqueue_blocked(EntryKind::Writer, holder);
        debug!(
            "[ACQUIRE_WRITE] holder={} blocked at position {}",
            holder,
            self.queue.len() - 1
        );
        Ok(Admission::Blocked(entry))
    }

    /// Decide an arriving read request.
    ///
    /// A reentrant read by a context that already holds a read lock is not
    /// special-cased: it gets its own Running entry and bumps the shared
    /// counter, exactly like a fresh concurrent reader.
    pub fn admit_reader(&mut self, holder: HolderId) -> Result<Admission, Error> {
        if self.queue.is_empty() {
            self.enqueue_running(EntryKind::Reader, holder);
            self.reader_depth = 1;
            self.note_read_hold(holder);
            counter!(METRIC_READ_GRANTS).increment(1);
            debug!("[ACQUIRE_READ] holder={} granted on empty queue", holder);
            return Ok(Admission::Granted);
        }

        if self.is_running_writer(holder) {
            counter!(METRIC_USAGE_ERRORS).increment(1);
            warn!("[ACQUIRE_READ] holder={} holds the write lock; read refused", holder);
            return Err(Error::WouldDeadlock {
                holder,
                kind: EntryKind::Reader,
            });
        }

        if self.readers_can_run_in_parallel() {
            self.enqueue_running(EntryKind::Reader, holder);
            self.reader_depth += 1;
            self.note_read_hold(holder);
            counter!(METRIC_READ_GRANTS).increment(1);
            debug!(
                "[ACQUIRE_READ] holder={} joined batch, reader_depth={}",
                holder, self.reader_depth
            );
            return Ok(Admission::Granted);
        }

        // would queue behind a writer that is itself waiting for this holder
        if self.holds_read(holder) {
            counter!(METRIC_USAGE_ERRORS).increment(1);
            warn!(
                "[ACQUIRE_READ] holder={} re-entering behind a waiting writer; refused",
                holder
            );
            return Err(Error::WouldDeadlock {
                holder,
                kind: EntryKind::Reader,
            });
        }

        let entry = self.enqueue_blocked(EntryKind::Reader, holder);
        debug!(
            "[ACQUIRE_READ] holder={} blocked at position {}",
            holder,
            self.queue.len() - 1
        );
        Ok(Admission::Blocked(entry))
    }

    /// New readers may run immediately iff no writer is running or waiting.
    fn readers_can_run_in_parallel(&self) -> bool {
        !self.queue.iter().any(|e| e.is_writer())
    }

    /// Only the head can be a running writer, and only while `writer_depth > 0`.
    fn is_running_writer(&self, holder: HolderId) -> bool {
        self.writer_depth > 0 && self.last_running == Some(holder)
    }

    fn holds_read(&self, holder: HolderId) -> bool {
        self.read_holds.contains_key(&holder)
    }

    fn note_read_hold(&mut self, holder: HolderId) {
        *self.read_holds.entry(holder).or_insert(0) += 1;
    }

    fn running_readers(&self) -> impl Iterator<Item = &Arc<WaitEntry>> {
        self.queue
            .iter()
            .take_while(|e| e.is_reader() && e.is_running())
    }

    fn enqueue_running(&mut self, kind: EntryKind, holder: HolderId) {
        self.queue
            .push_back(WaitEntry::new(kind, holder, EntryStatus::Running));
        self.last_running = Some(holder);
    }

    fn enqueue_blocked(&mut self, kind: EntryKind, holder: HolderId) -> Arc<WaitEntry> {
        let entry = WaitEntry::new(kind, holder, EntryStatus::Blocked);
        self.queue.push_back(Arc::clone(&entry));
        counter!(METRIC_BLOCKED, "kind" => kind.as_str()).increment(1);
        entry
    }

    // ---- release ------------------------------------------------------------

    /// Drop one write hold. When the depth reaches zero the writer leaves the
    /// queue and the next batch is woken.
    pub fn release_writer(&mut self, holder: HolderId) -> Result<(), Error> {
        if !self.is_running_writer(holder) {
            counter!(METRIC_USAGE_ERRORS).increment(1);
            warn!(
                "[RELEASE_WRITE] holder={} does not hold the write lock (writer_depth={})",
                holder, self.writer_depth
            );
            return Err(Error::UnmatchedRelease {
                kind: EntryKind::Writer,
            });
        }

        self.writer_depth -= 1;
        if self.writer_depth > 0 {
            trace!(
                "[RELEASE_WRITE] holder={} writer_depth={}",
                holder,
                self.writer_depth
            );
            return Ok(());
        }

        let head = self.queue.pop_front();
        assert!(
            matches!(&head, Some(e) if e.is_writer() && e.is_running() && e.holder() == holder),
            "queue head is not the running writer {holder}: {head:?}"
        );
        debug!("[RELEASE_WRITE] holder={} left the queue", holder);
        self.wake_next();
        Ok(())
    }

    /// Drop one read hold from the shared counter. When it reaches zero the
    /// whole running reader prefix leaves as one batch and the next batch is
    /// woken.
    pub fn release_reader(&mut self, holder: HolderId) -> Result<(), Error> {
        if self.reader_depth == 0 || !self.holds_read(holder) {
            counter!(METRIC_USAGE_ERRORS).increment(1);
            warn!(
                "[RELEASE_READ] holder={} holds no read lock (reader_depth={})",
                holder, self.reader_depth
            );
            return Err(Error::UnmatchedRelease {
                kind: EntryKind::Reader,
            });
        }

        self.reader_depth -= 1;
        if let Some(n) = self.read_holds.get_mut(&holder) {
            *n -= 1;
            if *n == 0 {
                self.read_holds.remove(&holder);
            }
        }
        if self.reader_depth > 0 {
            trace!(
                "[RELEASE_READ] holder={} reader_depth={}",
                holder,
                self.reader_depth
            );
            return Ok(());
        }

        let mut drained = 0usize;
        while let Some(head) = self.queue.front() {
            if !head.is_reader() {
                break;
            }
            assert!(
                head.is_running(),
                "blocked reader {} at the head of a draining batch",
                head.holder()
            );
            self.queue.pop_front();
            drained += 1;
        }
        debug!("[RELEASE_READ] batch of {} reader entries drained", drained);
        self.wake_next();
        Ok(())
    }

    // ---- wake ---------------------------------------------------------------

    /// Promote the next runnable batch: either every consecutive reader at
    /// the head, or the single writer at the head.
    fn wake_next(&mut self) {
        let mut promoted_readers = 0usize;
        for entry in self.queue.iter() {
            assert!(
                !entry.is_running(),
                "wake found running {} entry of holder {}",
                entry.kind(),
                entry.holder()
            );
            if entry.is_reader() {
                entry.mark_running();
                self.reader_depth += 1;
                *self.read_holds.entry(entry.holder()).or_insert(0) += 1;
                self.last_running = Some(entry.holder());
                promoted_readers += 1;
                continue;
            }
            if promoted_readers == 0 {
                entry.mark_running();
                self.writer_depth += 1;
                self.last_running = Some(entry.holder());
                counter!(METRIC_WAKEUPS, "kind" => "writer").increment(1);
                debug!("[WAKE] writer holder={} promoted", entry.holder());
            }
            break;
        }
        if promoted_readers > 0 {
            counter!(METRIC_WAKEUPS, "kind" => "reader").increment(promoted_readers as u64);
            debug!("[WAKE] {} reader entries promoted", promoted_readers);
        }
    }

    // ---- introspection ------------------------------------------------------

    /// Capture the queue for diagnostics, bumping the sequence number.
    pub fn snapshot(&mut self, cause: Option<SnapshotCause>) -> QueueSnapshot {
        self.seq += 1;
        let entries = self
            .queue
            .iter()
            .map(|e| {
                let status = e.status();
                let depth = match (status, e.kind()) {
                    (EntryStatus::Blocked, _) => 0,
                    (EntryStatus::Running, EntryKind::Writer) => self.writer_depth,
                    (EntryStatus::Running, EntryKind::Reader) => self.reader_depth,
                };
                EntrySnapshot {
                    kind: e.kind(),
                    status,
                    holder: e.holder(),
                    depth,
                }
            })
            .collect();
        QueueSnapshot {
            seq: self.seq,
            cause,
            entries,
            writer_depth: self.writer_depth,
            reader_depth: self.reader_depth,
            last_running: self.last_running,
        }
    }

    /// Panics if any structural invariant of the queue is broken.
    pub fn check_invariants(&self) {
        let running_writers = self
            .queue
            .iter()
            .filter(|e| e.is_writer() && e.is_running())
            .count();
        assert!(running_writers <= 1, "{running_writers} running writers");

        let prefix = self.running_readers().count();
        let running_readers = self
            .queue
            .iter()
            .filter(|e| e.is_reader() && e.is_running())
            .count();
        assert_eq!(prefix, running_readers, "running readers are not a prefix");
        assert!(
            running_writers == 0 || running_readers == 0,
            "writer and readers running together"
        );

        let head_is_running_writer = self
            .queue
            .front()
            .is_some_and(|e| e.is_writer() && e.is_running());
        assert_eq!(
            self.writer_depth > 0,
            head_is_running_writer,
            "writer_depth={} disagrees with the queue head",
            self.writer_depth
        );
        assert_eq!(
            self.reader_depth > 0,
            prefix > 0,
            "reader_depth={} disagrees with the running prefix ({prefix})",
            self.reader_depth
        );
        assert_eq!(
            self.read_holds.values().sum::<usize>(),
            self.reader_depth,
            "per-holder read holds disagree with reader_depth"
        );
        if head_is_running_writer {
            assert_eq!(
                self.last_running,
                self.queue.front().map(|e| e.holder()),
                "last running identity is not the running writer"
            );
        }
    }
}
