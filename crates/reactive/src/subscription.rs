//! Subscriptions to live query results.
//!
//! A subscription pairs a query descriptor and its current binding with the
//! last result published to the caller.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use tarn_query::{evaluate, Binding, QueryDescriptor, ResultSet, RowSource};
use tarn_storage::AffectedKeys;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type ChangeCallback = Arc<dyn Fn(&ResultSet) + Send + Sync>;

/// Caller-owned handle to a subscription. Plain value, freely copied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(SubscriptionId);

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId) -> Self {
        Self(id)
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.0
    }
}

/// A live query.
pub struct Subscription {
    /// Unique identifier
    id: SubscriptionId,
    descriptor: QueryDescriptor,
    binding: Binding,
    /// Last result handed to the callback (or the initial result)
    result: ResultSet,
    /// Callback to invoke on changes
    callback: ChangeCallback,
    /// Cleared on unsubscribe; shared with pending notifications
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Creates a subscription with an already evaluated initial result.
    pub fn new(
        id: SubscriptionId,
        descriptor: QueryDescriptor,
        binding: Binding,
        result: ResultSet,
        callback: ChangeCallback,
    ) -> Self {
        Self {
            id,
            descriptor,
            binding,
            result,
            callback,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// The last published result.
    pub fn result(&self) -> &ResultSet {
        &self.result
    }

    /// Returns whether this subscription is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivates this subscription. Notifications already produced for it
    /// will not invoke the callback.
    #[inline]
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Returns true if `affected` can change this subscription's result.
    pub fn affected_by(&self, affected: &AffectedKeys) -> bool {
        if affected.table != self.descriptor.table() || affected.is_empty() {
            return false;
        }
        match self.descriptor.referenced_columns() {
            Some(columns) => affected.columns.intersects(columns.into_iter()),
            None => true,
        }
    }

    /// Replaces the binding, returning the old one. The result is not
    /// re-evaluated.
    pub fn replace_binding(&mut self, binding: Binding) -> Binding {
        core::mem::replace(&mut self.binding, binding)
    }

    /// Re-evaluates the query and publishes the result if it changed.
    pub fn refresh<S: RowSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> tarn_core::Result<Option<Notification>> {
        let result = evaluate(&self.descriptor, &self.binding, source)?;
        if result == self.result {
            return Ok(None);
        }
        self.result = result;
        Ok(Some(Notification {
            id: self.id,
            result: self.result.clone(),
            callback: self.callback.clone(),
            active: self.active.clone(),
        }))
    }
}

/// A changed result waiting to be delivered.
///
/// Notifications are produced while the store is locked and fired after the
/// locks are released.
pub struct Notification {
    id: SubscriptionId,
    result: ResultSet,
    callback: ChangeCallback,
    active: Arc<AtomicBool>,
}

impl Notification {
    pub fn subscription(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.id)
    }

    pub fn result(&self) -> &ResultSet {
        &self.result
    }

    /// Invokes the callback unless the subscription was cancelled in the
    /// meantime. Returns whether the callback ran.
    pub fn fire(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        (self.callback)(&self.result);
        true
    }
}

impl core::fmt::Debug for Notification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id)
            .field("rows", &self.result.len())
            .finish()
    }
}
