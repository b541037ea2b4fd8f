//! Bounded per-task thread reuse.
//!
//! Each `<assistant_id>_<task_type>` slot holds up to `capacity` thread ids.
//! Acquiring from a full slot pops the oldest id and pushes it to the back,
//! so consecutive acquisitions cycle round-robin through the slot.

use std::collections::HashMap;

use tracing::debug;

const DEFAULT_CAPACITY: usize = 3;

/// In-process cache of reusable thread ids, keyed by assistant and task type
#[derive(Debug, Clone)]
pub struct ThreadPool {
    capacity: usize,
    slots: HashMap<String, Vec<String>>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ThreadPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: HashMap::new(),
        }
    }

    fn slot_key(assistant_id: &str, task_type: &str) -> String {
        format!("{}_{}", assistant_id, task_type)
    }

    /// Take a thread id for reuse, cycling it to the back of its slot.
    /// Returns None when the slot has no pooled threads.
    pub fn acquire(&mut self, assistant_id: &str, task_type: &str) -> Option<String> {
        let key = Self::slot_key(assistant_id, task_type);
        let slot = self.slots.get_mut(&key)?;
        if slot.is_empty() {
            return None;
        }

        let thread_id = slot.remove(0);
        slot.push(thread_id.clone());
        debug!(%key, %thread_id, "Reusing pooled thread");
        Some(thread_id)
    }

    /// Record a thread id in its slot, evicting the oldest past capacity
    pub fn store(&mut self, assistant_id: &str, task_type: &str, thread_id: String) {
        let key = Self::slot_key(assistant_id, task_type);
        let slot = self.slots.entry(key).or_default();

        if !slot.contains(&thread_id) {
            slot.push(thread_id);
        }

        if slot.len() > self.capacity {
            let excess = slot.len() - self.capacity;
            slot.drain(..excess);
        }
    }

    pub fn len(&self, assistant_id: &str, task_type: &str) -> usize {
        self.slots
            .get(&Self::slot_key(assistant_id, task_type))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }

    /// Drop every pooled thread id
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
