//! # Callback Marshaler
//!
//! Turns local callables into small numeric handles that can cross the
//! boundary, and turns handles back into callables.
//!
//! ## Invariants
//!
//! - Ids are minted from a per-zone counter starting at 1. They never repeat,
//!   so "already consumed" (id below the counter, not in the store) and
//!   "never issued" (id at or above the counter) are distinguishable.
//! - A single-use entry is removed the first time it is taken. The original
//!   callable can therefore never run twice through its handle.
//! - A handle that is never fired keeps its entry alive for the lifetime of
//!   the runtime. `pending()` exposes the store size so that growth is visible.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde_json::Value;

use zonewire::CallbackHandle;
use zonewire::Zone;

/// What a callback receives: the reserved `error` and `callbackData` fields
/// of a response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reply {
    pub error: Option<Value>,
    pub data: Value,
}

impl Reply {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            error: None,
            data: data.into(),
        }
    }

    pub fn err(error: impl Into<Value>) -> Self {
        Self {
            error: Some(error.into()),
            data: Value::Null,
        }
    }
}

pub type Callback = Arc<dyn Fn(Reply) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Reply) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A callable that does nothing, handed out for handles that must not fire.
pub(crate) fn noop() -> Callback {
    Arc::new(|_| {})
}

/// Where a handle stands relative to this zone's store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    /// Issued here and still waiting to fire.
    Live,
    /// Issued here and already fired or released.
    Consumed,
    /// Claims to be ours, but this zone never issued that id.
    Unknown,
    /// Minted by the other zone.
    Foreign,
}

struct Entry {
    callback: Callback,
    persistent: bool,
}

/// The per-zone store behind every handle this zone has minted.
pub struct CallbackStore {
    zone: Zone,
    next_id: AtomicU64,
    live: DashMap<u64, Entry>,
}

impl CallbackStore {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            next_id: AtomicU64::new(1),
            live: DashMap::new(),
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Registers a single-use callable and returns its handle.
    pub fn to_handle(&self, callback: Callback) -> CallbackHandle {
        self.register(callback, false)
    }

    /// Registers a callable that survives being fired. It stays in the store
    /// until [`release`](Self::release) is called.
    pub fn to_persistent_handle(&self, callback: Callback) -> CallbackHandle {
        self.register(callback, true)
    }

    fn register(&self, callback: Callback, persistent: bool) -> CallbackHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.insert(id, Entry { callback, persistent });
        CallbackHandle::new(id, self.zone)
    }

    pub fn state(&self, handle: CallbackHandle) -> HandleState {
        if handle.zone != self.zone {
            HandleState::Foreign
        } else if self.live.contains_key(&handle.id) {
            HandleState::Live
        } else if handle.id >= 1 && handle.id < self.next_id.load(Ordering::Relaxed) {
            HandleState::Consumed
        } else {
            HandleState::Unknown
        }
    }

    /// Takes the callable behind a live handle of this zone. Single-use
    /// entries are removed, persistent ones are cloned out.
    pub fn take(&self, handle: CallbackHandle) -> Option<Callback> {
        if handle.zone != self.zone {
            return None;
        }
        if let Some((_, entry)) = self.live.remove_if(&handle.id, |_, e| !e.persistent) {
            return Some(entry.callback);
        }
        self.live.get(&handle.id).map(|e| e.callback.clone())
    }

    /// Drops an entry without firing it. Returns false if it was not live.
    pub fn release(&self, handle: CallbackHandle) -> bool {
        handle.zone == self.zone && self.live.remove(&handle.id).is_some()
    }

    /// Number of entries still waiting to fire.
    pub fn pending(&self) -> usize {
        self.live.len()
    }
}
