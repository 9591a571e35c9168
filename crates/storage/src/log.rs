//! Mutation log for local writes awaiting remote confirmation.
//!
//! Every local mutation is applied to the row store at append time; the log is
//! the ledger used to reconcile that optimistic state with the remote store. It
//! is not a write-ahead buffer.

use crate::mutation::{Mutation, SequenceNumber};
use alloc::collections::VecDeque;
use alloc::string::String;
use tarn_core::Value;

/// A logged mutation with its sequence number and target table.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub seq: SequenceNumber,
    pub table: String,
    pub mutation: Mutation,
    /// Set on an INSERT whose primary key was allocated locally rather than
    /// given by the caller. Such a row may be moved to another key if the
    /// remote store already has one with this key.
    pub allocated_key: bool,
}

impl LogEntry {
    /// Returns true if this entry writes the given row.
    pub fn touches(&self, table: &str, key: &Value) -> bool {
        self.table == table && self.mutation.key() == key
    }
}

/// Ordered, append-only record of unacknowledged local mutations.
#[derive(Debug)]
pub struct MutationLog {
    entries: VecDeque<LogEntry>,
    next_seq: SequenceNumber,
    acked_through: SequenceNumber,
}

impl Default for MutationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationLog {
    /// Creates an empty log. The first appended mutation gets sequence 1.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 1,
            acked_through: 0,
        }
    }

    /// Appends a mutation and returns its sequence number.
    pub fn append(&mut self, table: impl Into<String>, mutation: Mutation) -> SequenceNumber {
        self.push(table.into(), mutation, false)
    }

    /// Appends an INSERT whose key was allocated locally.
    pub fn append_allocated(
        &mut self,
        table: impl Into<String>,
        mutation: Mutation,
    ) -> SequenceNumber {
        self.push(table.into(), mutation, true)
    }

    fn push(&mut self, table: String, mutation: Mutation, allocated_key: bool) -> SequenceNumber {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(LogEntry {
            seq,
            table,
            mutation,
            allocated_key,
        });
        seq
    }

    /// The pending entry with sequence `seq`.
    pub fn get(&self, seq: SequenceNumber) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.seq == seq)
    }

    /// Readdresses every pending write of row `from` to row `to`, returning how
    /// many entries changed.
    pub fn rekey(&mut self, table: &str, from: &Value, to: &Value, pk_index: usize) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|e| e.touches(table, from)) {
            entry.mutation = entry.mutation.rekeyed(to.clone(), pk_index);
            changed += 1;
        }
        changed
    }

    /// Drops every entry with sequence ≤ `seq`, returning how many were removed.
    pub fn ack_through(&mut self, seq: SequenceNumber) -> usize {
        let mut removed = 0;
        while self.entries.front().is_some_and(|e| e.seq <= seq) {
            self.entries.pop_front();
            removed += 1;
        }
        if seq > self.acked_through {
            self.acked_through = seq.min(self.last_sequence());
        }
        removed
    }

    /// Removes a single entry, e.g. one the remote store refused.
    pub fn discard(&mut self, seq: SequenceNumber) -> Option<LogEntry> {
        let idx = self.entries.iter().position(|e| e.seq == seq)?;
        self.entries.remove(idx)
    }

    /// Pending entries in sequence order.
    pub fn pending(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter()
    }

    /// Pending entries with sequence greater than `seq`, in order.
    pub fn pending_after(&self, seq: SequenceNumber) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter().filter(move |e| e.seq > seq)
    }

    /// Returns true if any pending entry writes the given row.
    pub fn touches(&self, table: &str, key: &Value) -> bool {
        self.entries.iter().any(|e| e.touches(table, key))
    }

    /// Returns true if any pending entry targets the given table.
    pub fn touches_table(&self, table: &str) -> bool {
        self.entries.iter().any(|e| e.table == table)
    }

    /// Sequence number of the most recent append, or 0 if nothing was appended.
    pub fn last_sequence(&self) -> SequenceNumber {
        self.next_seq - 1
    }

    /// Highest sequence acknowledged so far.
    pub fn acked_through(&self) -> SequenceNumber {
        self.acked_through
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
