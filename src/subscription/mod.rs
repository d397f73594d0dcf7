// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device subscription bookkeeping.
//!
//! Every `subscribe` call adds one callback and one reference for a
//! device serial. The transport-level subscription is shared: it is
//! created when a serial's reference count goes 0→1 and torn down when
//! it returns to 0. Callback identity is a [`SubscriptionId`], handed
//! out at registration and required for removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::DeviceCodec;
use crate::status::DeviceStatus;

/// Unique identifier for one registered callback.
///
/// Returned by `DeviceClient::subscribe` and passed back to
/// `DeviceClient::unsubscribe`. IDs are unique within a client's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Callback invoked with each decoded status for a device.
pub type StatusCallback = Arc<dyn Fn(DeviceStatus) + Send + Sync>;

/// Reference-counted subscription state for one device serial.
pub(crate) struct DeviceSubscription {
    /// Codec bound at first subscribe, never re-resolved per message.
    pub(crate) codec: DeviceCodec,
    /// Whether the serial is attached on the current broker session.
    /// Cleared on session loss so the next session re-attaches it.
    attached: bool,
    /// Registered callbacks; the reference count is the map's size.
    callbacks: HashMap<SubscriptionId, StatusCallback>,
}

impl DeviceSubscription {
    pub(crate) fn new(codec: DeviceCodec) -> Self {
        Self {
            codec,
            attached: false,
            callbacks: HashMap::new(),
        }
    }

    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    /// Registers a callback, returning its id and whether it was the
    /// serial's first reference.
    pub(crate) fn add<F>(&mut self, callback: F) -> (SubscriptionId, bool)
    where
        F: Fn(DeviceStatus) + Send + Sync + 'static,
    {
        let first = self.callbacks.is_empty();
        let id = SubscriptionId::next();
        self.callbacks.insert(id, Arc::new(callback));
        (id, first)
    }

    /// Removes a callback by id. Returns `false` for unknown ids.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// The current reference count for this serial.
    pub(crate) fn reference_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Clones out the registered callbacks for dispatch outside any lock.
    pub(crate) fn callbacks(&self) -> Vec<StatusCallback> {
        self.callbacks.values().cloned().collect()
    }
}

impl std::fmt::Debug for DeviceSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSubscription")
            .field("codec", &self.codec)
            .field("attached", &self.attached)
            .field("reference_count", &self.reference_count())
            .finish()
    }
}
