//! # Batch
//!
//! A nesting counter plus the ordered, de-duplicated set of objects waiting
//! to be pushed to the other zone.
//!
//! ## Invariants
//!
//! - Only the `end` that brings the depth back to zero reports `true`; that
//!   is the single point at which the owner flushes.
//! - An object is pending at most once, no matter how often it is queued.
//! - Entries leave the set one at a time through `next_pending`, so an
//!   object queued during a flush is still picked up by that flush.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::warn;

use zonewire::ObjectRef;

#[derive(Default)]
struct State {
    depth: usize,
    order: VecDeque<ObjectRef>,
    pending: HashSet<ObjectRef>,
}

#[derive(Default)]
pub struct Batch {
    state: Mutex<State>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self) {
        self.lock().depth += 1;
    }

    /// Closes one level. Returns true when the outermost level closed.
    pub fn end(&self) -> bool {
        let mut state = self.lock();
        match state.depth {
            0 => {
                warn!("end_batch without matching begin_batch");
                false
            }
            depth => {
                state.depth = depth - 1;
                state.depth == 0
            }
        }
    }

    /// Returns false if the object was already pending.
    pub fn enqueue(&self, object: ObjectRef) -> bool {
        let mut state = self.lock();
        if !state.pending.insert(object.clone()) {
            return false;
        }
        state.order.push_back(object);
        true
    }

    /// Removes and returns the oldest pending object.
    pub fn next_pending(&self) -> Option<ObjectRef> {
        let mut state = self.lock();
        let object = state.order.pop_front()?;
        state.pending.remove(&object);
        Some(object)
    }

    pub fn depth(&self) -> usize {
        self.lock().depth
    }

    pub fn is_open(&self) -> bool {
        self.depth() > 0
    }

    pub fn pending(&self) -> usize {
        self.lock().order.len()
    }
}
