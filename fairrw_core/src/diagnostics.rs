//! Queue snapshots and the sinks that consume them.
//!
//! A snapshot is captured inside the critical section and handed to the sink
//! after the section is left, so a sink is free to call back into the lock.
//! Concurrent operations may therefore deliver snapshots out of order; `seq`
//! restores the order in which the state changes actually happened.

use std::fmt;

use log::debug;

use crate::types::{EntryKind, EntryStatus, HolderId};

/// What triggered a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SnapshotCause {
    WriteGranted,
    ReentrantWriteGranted,
    ReadGranted,
    Blocked(EntryKind),
    WriteReleased,
    ReadReleased,
}

impl fmt::Display for SnapshotCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotCause::WriteGranted => f.write_str("write granted"),
            SnapshotCause::ReentrantWriteGranted => f.write_str("reentrant write granted"),
            SnapshotCause::ReadGranted => f.write_str("read granted"),
            SnapshotCause::Blocked(kind) => write!(f, "{kind} blocked"),
            SnapshotCause::WriteReleased => f.write_str("write released"),
            SnapshotCause::ReadReleased => f.write_str("read released"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub kind: EntryKind,
    pub status: EntryStatus,
    pub holder: HolderId,
    /// Reentrant depth currently attributed to the entry: `writer_depth` for
    /// a running writer, the shared `reader_depth` for a running reader, 0
    /// while blocked.
    pub depth: usize,
}

impl fmt::Display for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[status:{}, holder:{}, depth:{}]",
            self.kind, self.status, self.holder, self.depth
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub seq: u64,
    pub cause: Option<SnapshotCause>,
    pub entries: Vec<EntrySnapshot>,
    pub writer_depth: usize,
    pub reader_depth: usize,
    pub last_running: Option<HolderId>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn running(&self) -> impl Iterator<Item = &EntrySnapshot> {
        self.entries.iter().filter(|e| e.status == EntryStatus::Running)
    }

    pub fn running_writers(&self) -> usize {
        self.running().filter(|e| e.kind == EntryKind::Writer).count()
    }

    pub fn running_readers(&self) -> usize {
        self.running().filter(|e| e.kind == EntryKind::Reader).count()
    }
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "queue empty");
        }
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        writeln!(f, "-----------------------------------")
    }
}

/// Consumer of queue snapshots. Must not affect lock semantics.
pub trait DiagnosticSink: Send + Sync {
    fn on_snapshot(&self, snapshot: &QueueSnapshot);
}

/// Writes every snapshot to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn on_snapshot(&self, snapshot: &QueueSnapshot) {
        match snapshot.cause {
            Some(cause) => debug!("[SNAPSHOT #{}] {}\n{}", snapshot.seq, cause, snapshot),
            None => debug!("[SNAPSHOT #{}]\n{}", snapshot.seq, snapshot),
        }
    }
}

impl<F> DiagnosticSink for F
where
    F: Fn(&QueueSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &QueueSnapshot) {
        self(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntryKind, status: EntryStatus, holder: u64, depth: usize) -> EntrySnapshot {
        EntrySnapshot {
            kind,
            status,
            holder: HolderId::from_raw(holder),
            depth,
        }
    }

    #[test]
    fn renders_empty_queue() {
        let snap = QueueSnapshot {
            seq: 1,
            cause: None,
            entries: vec![],
            writer_depth: 0,
            reader_depth: 0,
            last_running: None,
        };
        assert_eq!(snap.to_string(), "queue empty\n");
    }

    #[test]
    fn renders_one_line_per_entry() {
        let snap = QueueSnapshot {
            seq: 7,
            cause: Some(SnapshotCause::WriteReleased),
            entries: vec![
                entry(EntryKind::Writer, EntryStatus::Running, 3, 1),
                entry(EntryKind::Reader, EntryStatus::Blocked, 4, 0),
            ],
            writer_depth: 1,
            reader_depth: 0,
            last_running: Some(HolderId::from_raw(3)),
        };
        let text = snap.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "writer[status:running, holder:3, depth:1]");
        assert_eq!(lines[1], "reader[status:blocked, holder:4, depth:0]");
        assert!(lines[2].starts_with("---"));
        assert_eq!(snap.running_writers(), 1);
        assert_eq!(snap.running_readers(), 0);
    }
}
