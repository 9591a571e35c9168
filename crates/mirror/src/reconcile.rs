//! Replica state and the rules for merging remote changes into it.
//!
//! Local mutations are applied to the row store as soon as they are logged.
//! Remote deltas are then merged as follows:
//! - a delta whose remote version is not newer than the last one seen for the
//!   row is a duplicate and changes nothing;
//! - a delta for a row with a pending local mutation is held back until every
//!   pending mutation on that row is acknowledged, then replayed in remote
//!   version order;
//! - anything else is applied directly. Inserts overwrite, and updates or
//!   deletes of rows that do not exist locally are dropped.
//!
//! While a table is being reloaded from a snapshot its deltas are queued and
//! merged, by the same rules, once the snapshot rows are in place.

use crate::channel::{RemoteDelta, RemoteRow};
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;
use tarn_core::{Row, Value, Version};
use tarn_storage::{
    AffectedKeys, Mutation, MutationLog, RowStore, SequenceNumber, TableCache,
};
use tracing::{debug, warn};

/// Identifies one row across tables.
type RowId = (String, Value);

/// What merging one remote delta did.
#[derive(Debug, PartialEq)]
pub(crate) enum Reconciled {
    Applied(AffectedKeys),
    /// Held back behind a pending local mutation.
    Deferred,
    /// Waiting for the table's snapshot to be installed.
    Queued,
    Duplicate,
    /// Could not be applied; the row store is unchanged.
    Ignored,
}

/// Result of applying a batch of local mutations.
#[derive(Debug, Default)]
pub(crate) struct LocalApply {
    pub affected: Option<AffectedKeys>,
    pub sequences: Vec<SequenceNumber>,
    pub inserted_key: Option<Value>,
    /// Set if a mutation failed; mutations before it stay applied and logged.
    pub error: Option<tarn_core::Error>,
}

/// Rows, the mutation log and what the replica knows about remote versions.
#[derive(Default)]
pub(crate) struct ReplicaState {
    pub cache: TableCache,
    pub log: MutationLog,
    remote_versions: HashMap<RowId, Version>,
    deferred: HashMap<RowId, Vec<RemoteDelta>>,
    /// Tables with a snapshot on the way.
    loading: HashSet<String>,
    /// Deltas for loading tables, in arrival order.
    queued: Vec<RemoteDelta>,
}

impl ReplicaState {
    /// Applies local mutations in order and logs each one that succeeds.
    ///
    /// `allocated_key` marks inserts whose primary key was allocated here.
    pub fn apply_local(
        &mut self,
        table: &str,
        mutations: Vec<Mutation>,
        allocated_key: bool,
    ) -> LocalApply {
        let mut out = LocalApply::default();
        let mut changes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match self.cache.apply(table, &mutation) {
                Ok(affected) => {
                    changes.push(affected);
                    let seq = match &mutation {
                        Mutation::Insert(row) => {
                            out.inserted_key = Some(row.key().clone());
                            if allocated_key {
                                self.log.append_allocated(table, mutation)
                            } else {
                                self.log.append(table, mutation)
                            }
                        }
                        _ => self.log.append(table, mutation),
                    };
                    out.sequences.push(seq);
                }
                Err(e) => {
                    out.error = Some(e);
                    break;
                }
            }
        }
        let mut changes = changes.into_iter();
        if let Some(mut all) = changes.next() {
            all.merge_all(changes);
            out.affected = Some(all);
        }
        out
    }

    /// Merges one remote delta.
    pub fn reconcile(&mut self, delta: RemoteDelta) -> Reconciled {
        if self.loading.contains(&delta.table) {
            debug!(table = %delta.table, version = delta.version, "delta queued behind snapshot");
            self.queued.push(delta);
            return Reconciled::Queued;
        }
        let id: RowId = (delta.table.clone(), delta.mutation.key().clone());
        if let Some(&seen) = self.remote_versions.get(&id) {
            if delta.version <= seen {
                debug!(table = %delta.table, key = %id.1, version = delta.version, seen, "duplicate delta");
                return Reconciled::Duplicate;
            }
        }
        if let Ok(store) = self.cache.table_mut(&delta.table) {
            store.reserve_key(&id.1);
        }

        if self.log.touches(&delta.table, &id.1) {
            debug!(
                table = %delta.table,
                key = %id.1,
                version = delta.version,
                "delta held back behind pending local mutation"
            );
            self.remote_versions.insert(id.clone(), delta.version);
            self.deferred.entry(id).or_default().push(delta);
            return Reconciled::Deferred;
        }

        match self.apply_remote(&delta) {
            Some(affected) => {
                debug!(table = %delta.table, key = %id.1, version = delta.version, kind = delta.mutation.kind(), "delta applied");
                self.remote_versions.insert(id, delta.version);
                Reconciled::Applied(affected)
            }
            None => Reconciled::Ignored,
        }
    }

    /// Queues deltas for `tables` until their snapshots are loaded.
    pub fn begin_load<'a>(&mut self, tables: impl IntoIterator<Item = &'a str>) {
        self.loading.extend(tables.into_iter().map(str::to_string));
    }

    /// Stops queueing for `tables` without a snapshot. Their queued deltas are
    /// merged if `keep` is set and dropped otherwise.
    pub fn abort_load(&mut self, tables: &[String], keep: bool) -> Vec<AffectedKeys> {
        let mut affected = Vec::new();
        for table in tables {
            if !self.loading.remove(table.as_str()) {
                continue;
            }
            let queued = self.take_queued(table);
            if keep {
                affected.extend(self.reconcile_queued(queued));
            } else if !queued.is_empty() {
                debug!(table = %table, dropped = queued.len(), "queued deltas dropped");
            }
        }
        affected
    }

    /// Moves a locally keyed insert that the remote refused as a duplicate key
    /// to a fresh key, together with every pending write of that row. Deltas
    /// held back for the old key are then applied.
    ///
    /// Returns the new key, or `None` if the entry cannot be moved.
    pub fn rekey(&mut self, seq: SequenceNumber) -> Option<(Value, Vec<AffectedKeys>)> {
        let entry = self.log.get(seq)?;
        if !entry.allocated_key || !matches!(entry.mutation, Mutation::Insert(_)) {
            return None;
        }
        let table = entry.table.clone();
        let from = entry.mutation.key().clone();

        let store = self.cache.table_mut(&table).ok()?;
        let pk = store.schema().primary_key_index();
        let to = store.next_key().ok()?;
        if let Some(row) = store.get(&from) {
            let moved = Mutation::Insert(Row::clone(&row)).rekeyed(to.clone(), pk);
            if let Err(e) = store.apply(&moved) {
                warn!(table = %table, key = %to, error = %e, "row could not be moved");
                return None;
            }
            if let Err(e) = store.apply(&Mutation::delete(from.clone())) {
                warn!(table = %table, key = %from, error = %e, "old row could not be removed");
            }
        }
        let moved = self.log.rekey(&table, &from, &to, pk);
        debug!(table = %table, %from, %to, entries = moved, "pending insert moved to a new key");

        let mut affected = vec![AffectedKeys::rows(
            table.clone(),
            vec![from, to.clone()],
        )];
        for released in self.release_deferred() {
            match affected.iter_mut().find(|a| a.table == released.table) {
                Some(all) => all.merge(released),
                None => affected.push(released),
            }
        }
        Some((to, affected))
    }

    /// Acknowledges the log through `seq` and replays the deltas that were
    /// held back for rows with nothing pending any more.
    pub fn acknowledge(&mut self, seq: SequenceNumber) -> Vec<AffectedKeys> {
        let removed = self.log.ack_through(seq);
        if removed == 0 {
            return Vec::new();
        }
        debug!(through = seq, removed, pending = self.log.len(), "log acknowledged");
        self.release_deferred()
    }

    /// Drops a refused entry from the log and replays deltas that were held
    /// back only because of it.
    pub fn reject(&mut self, seq: SequenceNumber) -> Vec<AffectedKeys> {
        if self.log.discard(seq).is_none() {
            return Vec::new();
        }
        self.release_deferred()
    }

    /// Replaces a table with snapshot rows and replays pending local
    /// mutations on top, in sequence order.
    pub fn load_snapshot(
        &mut self,
        table: &str,
        rows: Vec<RemoteRow>,
    ) -> tarn_core::Result<AffectedKeys> {
        let store = self.cache.table_mut(table)?;
        let pk = store.schema().primary_key_index();
        let mut versions = Vec::with_capacity(rows.len());
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|r| {
                let key = r.values.get(pk).cloned().unwrap_or(Value::Null);
                versions.push((key.clone(), r.version));
                Row::new(key, r.values)
            })
            .collect();
        let mut affected = store.load(rows)?;

        let mut present = HashSet::with_capacity(versions.len());
        for (key, version) in versions {
            present.insert(key.clone());
            let seen = self
                .remote_versions
                .entry((table.to_string(), key))
                .or_insert(0);
            *seen = (*seen).max(version);
        }
        // Rows gone from the snapshot need no version unless a local write
        // still refers to them.
        let log = &self.log;
        self.remote_versions
            .retain(|(t, key), _| t != table || present.contains(key) || log.touches(t, key));
        let remote_versions = &self.remote_versions;
        self.deferred.retain(|id, deltas| {
            if id.0 != table {
                return true;
            }
            let seen = remote_versions.get(id).copied().unwrap_or(0);
            deltas.retain(|d| d.version > seen);
            !deltas.is_empty()
        });

        let mut replayed = 0usize;
        for entry in self.log.pending().filter(|e| e.table == table) {
            match replay(store, &entry.mutation) {
                Ok(a) => {
                    affected.merge(a);
                    replayed += 1;
                }
                Err(e) => {
                    debug!(seq = entry.seq, error = %e, "pending mutation does not apply over snapshot")
                }
            }
        }
        debug!(table, rows = store.len(), replayed, "snapshot loaded");

        if self.loading.remove(table) {
            let queued = self.take_queued(table);
            let merged = self.reconcile_queued(queued);
            affected.merge_all(merged.into_iter().filter(|a| a.table == table));
        }
        Ok(affected)
    }

    fn take_queued(&mut self, table: &str) -> Vec<RemoteDelta> {
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queued)
            .into_iter()
            .partition(|d| d.table == table);
        self.queued = rest;
        mine
    }

    fn reconcile_queued(&mut self, queued: Vec<RemoteDelta>) -> Vec<AffectedKeys> {
        queued
            .into_iter()
            .filter_map(|delta| match self.reconcile(delta) {
                Reconciled::Applied(affected) => Some(affected),
                _ => None,
            })
            .collect()
    }

    /// Number of remembered remote row versions.
    #[cfg(test)]
    pub fn tracked_versions(&self) -> usize {
        self.remote_versions.len()
    }

    /// Returns true if a row has deltas held back.
    #[cfg(test)]
    pub fn has_deferred(&self, table: &str, key: &Value) -> bool {
        self.deferred.contains_key(&(table.to_string(), key.clone()))
    }

    fn release_deferred(&mut self) -> Vec<AffectedKeys> {
        let log = &self.log;
        let ready: Vec<RowId> = self
            .deferred
            .keys()
            .filter(|(table, key)| !log.touches(table, key))
            .cloned()
            .collect();

        let mut by_table: BTreeMap<String, AffectedKeys> = BTreeMap::new();
        for id in ready {
            let Some(mut deltas) = self.deferred.remove(&id) else {
                continue;
            };
            deltas.sort_by_key(|d| d.version);
            for delta in deltas {
                if let Some(affected) = self.apply_remote(&delta) {
                    match by_table.get_mut(&affected.table) {
                        Some(all) => all.merge(affected),
                        None => {
                            by_table.insert(affected.table.clone(), affected);
                        }
                    }
                }
            }
        }
        by_table.into_values().collect()
    }

    fn apply_remote(&mut self, delta: &RemoteDelta) -> Option<AffectedKeys> {
        let store = match self.cache.table_mut(&delta.table) {
            Ok(store) => store,
            Err(_) => {
                warn!(table = %delta.table, "delta for a table that is not mirrored");
                return None;
            }
        };
        let key = delta.mutation.key();
        let result = match &delta.mutation {
            Mutation::Insert(row) => store.upsert(row),
            m if !store.contains(key) => {
                warn!(table = %delta.table, %key, kind = m.kind(), "remote change to a row that does not exist locally");
                return None;
            }
            m => store.apply(m),
        };
        match result {
            Ok(affected) => Some(affected),
            Err(e) => {
                warn!(table = %delta.table, %key, error = %e, "remote delta rejected by the row store");
                None
            }
        }
    }
}

/// Re-applies a pending mutation over freshly loaded rows.
fn replay(store: &mut RowStore, mutation: &Mutation) -> tarn_core::Result<AffectedKeys> {
    match mutation {
        Mutation::Insert(row) => store.upsert(row),
        m => store.apply(m),
    }
}
