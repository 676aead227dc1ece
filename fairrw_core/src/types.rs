//! Data structures shared by the lock state machine

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::constants::THREAD_HOLDER_BASE;

/// Opaque identity of a calling context.
///
/// Reentrancy is decided by plain equality of these tokens, so two threads
/// must never share one unless they deliberately act as the same session.
/// Thread ids live at or above [`THREAD_HOLDER_BASE`]; raw ids below it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(u64);

static NEXT_HOLDER: AtomicU64 = AtomicU64::new(THREAD_HOLDER_BASE);

thread_local! {
    static CURRENT_HOLDER: Cell<Option<HolderId>> = const { Cell::new(None) };
}

impl HolderId {
    /// Identity of the calling thread, allocated on first use.
    pub fn current() -> Self {
        CURRENT_HOLDER.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = HolderId(NEXT_HOLDER.fetch_add(1, Ordering::Relaxed));
                cell.set(Some(id));
                id
            }
        })
    }

    /// Wrap a caller-chosen identity.
    ///
    /// Keep `raw` below [`THREAD_HOLDER_BASE`] when the same lock is also
    /// used with [`HolderId::current`]: an equal id is the same holder and is
    /// granted its reentrant write.
    pub const fn from_raw(raw: u64) -> Self {
        HolderId(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Reader,
    Writer,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Reader => "reader",
            EntryKind::Writer => "writer",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Blocked = 0,
    Running = 1,
}

impl EntryStatus {
    #[inline]
    fn from_u8(raw: u8) -> Self {
        if raw == EntryStatus::Running as u8 {
            EntryStatus::Running
        } else {
            EntryStatus::Blocked
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Blocked => "blocked",
            EntryStatus::Running => "running",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admitted or queued request.
///
/// `status` is written only inside the lock's critical section and read
/// without it by the entry's own spinning caller, hence the atomic.
#[derive(Debug)]
pub struct WaitEntry {
    kind: EntryKind,
    holder: HolderId,
    status: AtomicU8,
}

impl WaitEntry {
    pub(crate) fn new(kind: EntryKind, holder: HolderId, status: EntryStatus) -> Arc<Self> {
        Arc::new(Self {
            kind,
            holder,
            status: AtomicU8::new(status as u8),
        })
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    #[inline]
    pub fn holder(&self) -> HolderId {
        self.holder
    }

    #[inline]
    pub fn status(&self) -> EntryStatus {
        EntryStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status() == EntryStatus::Running
    }

    #[inline]
    pub fn is_reader(&self) -> bool {
        self.kind == EntryKind::Reader
    }

    #[inline]
    pub fn is_writer(&self) -> bool {
        self.kind == EntryKind::Writer
    }

    /// Promote to Running. Caller must hold the critical section.
    #[inline]
    pub(crate) fn mark_running(&self) {
        self.status.store(EntryStatus::Running as u8, Ordering::Release);
    }
}

/// Outcome of an admission decision.
#[derive(Debug)]
pub enum Admission {
    /// Granted immediately with a new Running entry.
    Granted,
    /// Granted by bumping the writer depth; no entry created.
    Reentrant,
    /// Queued; the caller must spin on this entry.
    Blocked(Arc<WaitEntry>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn thread_ids_never_alias_raw_ids() {
        let here = HolderId::current();
        let there = thread::spawn(HolderId::current).join().unwrap();
        assert!(here.as_raw() >= THREAD_HOLDER_BASE);
        assert!(there.as_raw() >= THREAD_HOLDER_BASE);
        assert_ne!(here, there);
        assert_eq!(here, HolderId::current());
        for raw in [0, 1, 2, 3, THREAD_HOLDER_BASE - 1] {
            assert_ne!(HolderId::from_raw(raw), here);
        }
    }

    #[test]
    fn entry_promotion_is_visible() {
        let entry = WaitEntry::new(EntryKind::Writer, HolderId::from_raw(1), EntryStatus::Blocked);
        assert_eq!(entry.status(), EntryStatus::Blocked);
        entry.mark_running();
        assert!(entry.is_running());
        assert!(entry.is_writer() && !entry.is_reader());
    }
}
