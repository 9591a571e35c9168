//! Subscription registry.
//!
//! This module provides `SubscriptionRegistry`, which owns every live query
//! and routes row changes to the subscriptions they can affect.

use crate::subscription::{
    ChangeCallback, Notification, Subscription, SubscriptionHandle, SubscriptionId,
};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use tarn_core::{Error, Result};
use tarn_query::{evaluate, Binding, QueryDescriptor, ResultSet, RowSource};
use tarn_storage::AffectedKeys;

/// Tracks live queries and re-evaluates them when their table changes.
///
/// Notifications are returned to the caller rather than fired here, so the
/// caller can release its locks first. They always come in registration
/// order.
pub struct SubscriptionRegistry {
    /// Subscription ID -> subscription; ID order is registration order
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    /// Table name -> subscriptions on it, ascending
    table_subscriptions: HashMap<String, Vec<SubscriptionId>>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Creates a new registry.
    pub fn new() -> Self {
        Self {
            subscriptions: BTreeMap::new(),
            table_subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a live query and evaluates its initial result.
    ///
    /// The initial result is available through [`result`](Self::result); the
    /// callback only sees later changes.
    pub fn subscribe<S, F>(
        &mut self,
        descriptor: QueryDescriptor,
        binding: Binding,
        on_change: F,
        source: &S,
    ) -> Result<SubscriptionHandle>
    where
        S: RowSource + ?Sized,
        F: Fn(&ResultSet) + Send + Sync + 'static,
    {
        self.subscribe_with(descriptor, binding, Arc::new(on_change), source)
    }

    /// Like [`subscribe`](Self::subscribe) with an already shared callback.
    pub fn subscribe_with<S: RowSource + ?Sized>(
        &mut self,
        descriptor: QueryDescriptor,
        binding: Binding,
        callback: ChangeCallback,
        source: &S,
    ) -> Result<SubscriptionHandle> {
        let result = evaluate(&descriptor, &binding, source)?;

        let id = self.next_id;
        self.next_id += 1;

        self.table_subscriptions
            .entry(descriptor.table().to_string())
            .or_default()
            .push(id);
        self.subscriptions
            .insert(id, Subscription::new(id, descriptor, binding, result, callback));
        Ok(SubscriptionHandle::new(id))
    }

    /// Re-evaluates a subscription with a new binding.
    ///
    /// Returns a notification if the result changed. On error the previous
    /// binding stays in place.
    pub fn rebind<S: RowSource + ?Sized>(
        &mut self,
        handle: SubscriptionHandle,
        binding: Binding,
        source: &S,
    ) -> Result<Option<Notification>> {
        let sub = self
            .subscriptions
            .get_mut(&handle.id())
            .ok_or_else(|| unknown(handle))?;
        binding.check(sub.descriptor().params())?;
        let previous = sub.replace_binding(binding);
        match sub.refresh(source) {
            Err(e) => {
                sub.replace_binding(previous);
                Err(e)
            }
            ok => ok,
        }
    }

    /// Removes a subscription. Its callback is not invoked again, including
    /// for notifications produced before this call but not yet fired.
    ///
    /// Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let Some(sub) = self.subscriptions.remove(&handle.id()) else {
            return false;
        };
        sub.deactivate();
        let table = sub.descriptor().table();
        if let Some(ids) = self.table_subscriptions.get_mut(table) {
            ids.retain(|id| *id != handle.id());
            if ids.is_empty() {
                self.table_subscriptions.remove(table);
            }
        }
        true
    }

    /// The last published result of a subscription.
    pub fn result(&self, handle: SubscriptionHandle) -> Option<&ResultSet> {
        self.subscriptions.get(&handle.id()).map(|s| s.result())
    }

    /// Re-evaluates the subscriptions `affected` can reach and returns a
    /// notification for each result that changed.
    ///
    /// A subscription whose re-evaluation fails keeps its last published
    /// result.
    pub fn on_change<S: RowSource + ?Sized>(
        &mut self,
        affected: &AffectedKeys,
        source: &S,
    ) -> Vec<Notification> {
        let Some(ids) = self.table_subscriptions.get(&affected.table) else {
            return Vec::new();
        };
        let mut notifications = Vec::new();
        for id in ids {
            if let Some(sub) = self.subscriptions.get_mut(id) {
                if sub.affected_by(affected) {
                    if let Ok(Some(n)) = sub.refresh(source) {
                        notifications.push(n);
                    }
                }
            }
        }
        notifications
    }

    /// Re-evaluates every subscription on a table, e.g. after a bulk reload.
    pub fn refresh_table<S: RowSource + ?Sized>(
        &mut self,
        table: &str,
        source: &S,
    ) -> Vec<Notification> {
        let Some(ids) = self.table_subscriptions.get(table) else {
            return Vec::new();
        };
        let mut notifications = Vec::new();
        for id in ids {
            if let Some(sub) = self.subscriptions.get_mut(id) {
                notifications.extend(sub.refresh(source).ok().flatten());
            }
        }
        notifications
    }

    /// Deactivates and removes every subscription.
    pub fn clear(&mut self) {
        for sub in self.subscriptions.values() {
            sub.deactivate();
        }
        self.subscriptions.clear();
        self.table_subscriptions.clear();
    }

    /// Returns the number of live subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if there are no subscriptions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Returns the number of subscriptions on a table.
    pub fn subscriptions_for_table(&self, table: &str) -> usize {
        self.table_subscriptions.get(table).map_or(0, Vec::len)
    }
}

fn unknown(handle: SubscriptionHandle) -> Error {
    Error::invalid_operation(format!("Unknown subscription {}", handle.id()))
}
