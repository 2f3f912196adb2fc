//! Per-CPU run queue
//!
//! An unordered list of the task ids a core may schedule, plus the position
//! of the last dispatch so round-robin scanning resumes where it stopped.

use alloc::vec::Vec;

use super::TaskId;

#[derive(Debug, Clone)]
pub struct RunQueue {
    entries: Vec<TaskId>,
    /// Index of the last dispatched entry; `None` before the first pick.
    current_index: Option<usize>,
    capacity: usize,
}

impl RunQueue {
    /// An empty queue able to hold `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            current_index: None,
            capacity,
        }
    }

    /// Put a booting core's first task at the front as the dispatched
    /// entry. Tasks admitted before the core came online stay queued behind
    /// it.
    pub fn install_first(&mut self, id: TaskId) {
        debug_assert!(!self.contains(id), "task {} installed twice", id);
        self.entries.insert(0, id);
        self.current_index = Some(0);
    }

    /// Append `id`. The queue is sized for every task slot, so there is
    /// always room.
    pub fn admit(&mut self, id: TaskId) {
        debug_assert!(self.entries.len() < self.capacity, "run queue overflow admitting {}", id);
        debug_assert!(!self.contains(id), "task {} admitted twice", id);
        self.entries.push(id);
    }

    /// Remove `id` by swapping the last entry into its place.
    ///
    /// Returns false if `id` was not queued.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.entries.iter().position(|&entry| entry == id) {
            Some(pos) => {
                self.entries.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Scan circularly from the entry after the last dispatch for the first
    /// task `eligible` accepts, and make it the dispatched position.
    ///
    /// The scan visits every entry once, ending on the last dispatched one,
    /// so a running task is picked again only when nothing else qualifies.
    pub fn advance_and_pick<F>(&mut self, eligible: F) -> Option<TaskId>
    where
        F: Fn(TaskId) -> bool,
    {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }

        let start = self.current_index.map_or(0, |index| index + 1);
        let found = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| eligible(self.entries[index]))?;

        self.current_index = Some(found);
        Some(self.entries[found])
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().copied()
    }

    /// Copy of the entries in queue order.
    pub fn snapshot(&self) -> Vec<TaskId> {
        self.entries.clone()
    }
}
