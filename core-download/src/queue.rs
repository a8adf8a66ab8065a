//! # Queue Store
//!
//! Ordered main queue plus an unordered background list, with a revision
//! counter bumped on every mutation.
//!
//! ## Overview
//!
//! Consumers poll [`QueueStore::revision`] and compare it with the last value
//! they saw instead of diffing contents. Entries are shared handles (`Arc<T>`)
//! and identity is pointer identity: the same track queued twice is two
//! distinct entries.
//!
//! ## Usage
//!
//! ```rust
//! use core_download::queue::QueueStore;
//! use std::sync::Arc;
//!
//! let mut queue = QueueStore::new();
//! let a = Arc::new("a");
//! queue.insert(vec![a.clone(), Arc::new("b"), Arc::new("c")], 0);
//! let before = queue.revision();
//!
//! queue.reorder(0, 10);
//! assert_eq!(queue.index_of(&a), Some(2));
//! assert!(queue.revision() > before);
//! ```

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Main and background queues with a shared revision counter.
#[derive(Debug)]
pub struct QueueStore<T> {
    main: Vec<Arc<T>>,
    background: Vec<Arc<T>>,
    revision: u64,
}

impl<T> Default for QueueStore<T> {
    fn default() -> Self {
        Self {
            main: Vec::new(),
            background: Vec::new(),
            revision: 0,
        }
    }
}

impl<T> QueueStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // ========================================================================
    // Main queue
    // ========================================================================

    pub fn len(&self) -> usize {
        self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.main.get(index)
    }

    pub fn entries(&self) -> &[Arc<T>] {
        &self.main
    }

    pub fn last(&self) -> Option<&Arc<T>> {
        self.main.last()
    }

    /// Insert `entries` before `position` (clamped to the queue length).
    pub fn insert(&mut self, entries: Vec<Arc<T>>, position: usize) {
        if entries.is_empty() {
            return;
        }
        let position = position.min(self.main.len());
        self.main.splice(position..position, entries);
        self.bump();
    }

    pub fn push(&mut self, entry: Arc<T>) {
        self.main.push(entry);
        self.bump();
    }

    pub fn remove(&mut self, index: usize) -> Option<Arc<T>> {
        if index >= self.main.len() {
            return None;
        }
        let removed = self.main.remove(index);
        self.bump();
        Some(removed)
    }

    /// Remove `entry` from both queues. Returns whether anything was removed.
    pub fn remove_entry(&mut self, entry: &Arc<T>) -> bool {
        let before = self.main.len() + self.background.len();
        self.main.retain(|e| !Arc::ptr_eq(e, entry));
        self.background.retain(|e| !Arc::ptr_eq(e, entry));

        let removed = before != self.main.len() + self.background.len();
        if removed {
            self.bump();
        }
        removed
    }

    /// Keep only main-queue entries matching `keep`; returns the removed ones.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<Arc<T>>
    where
        F: FnMut(&Arc<T>) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) = self.main.drain(..).partition(|e| keep(e));
        self.main = kept;
        if !removed.is_empty() {
            self.bump();
        }
        removed
    }

    /// Drop the first `count` main-queue entries and return them.
    pub fn drain_front(&mut self, count: usize) -> Vec<Arc<T>> {
        let count = count.min(self.main.len());
        if count == 0 {
            return Vec::new();
        }
        let drained = self.main.drain(..count).collect();
        self.bump();
        drained
    }

    /// Empty the main queue.
    pub fn clear(&mut self) {
        self.main.clear();
        self.bump();
    }

    /// Move the entry at `from` to `to`, clamping `to` into `[0, len - 1]`.
    ///
    /// Returns `false` (and leaves the revision alone) when `from` is out of range.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.main.len() {
            return false;
        }
        let to = to.min(self.main.len() - 1);
        let entry = self.main.remove(from);
        self.main.insert(to, entry);
        self.bump();
        true
    }

    /// Randomize the main queue, pinning `current` (when queued) at index 0.
    pub fn shuffle(&mut self, current: Option<&Arc<T>>) {
        self.shuffle_with(current, &mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, current: Option<&Arc<T>>, rng: &mut R) {
        if self.main.is_empty() {
            return;
        }

        match current.and_then(|c| self.index_of(c)) {
            Some(index) => {
                self.main.swap(0, index);
                self.main[1..].shuffle(rng);
            }
            None => self.main.shuffle(rng),
        }
        self.bump();
    }

    /// Position of `entry` in the main queue.
    pub fn index_of(&self, entry: &Arc<T>) -> Option<usize> {
        self.main.iter().position(|e| Arc::ptr_eq(e, entry))
    }

    pub fn contains(&self, entry: &Arc<T>) -> bool {
        self.index_of(entry).is_some()
    }

    // ========================================================================
    // Background queue
    // ========================================================================

    pub fn background(&self) -> &[Arc<T>] {
        &self.background
    }

    pub fn push_background(&mut self, entry: Arc<T>) {
        self.background.push(entry);
        self.bump();
    }

    pub fn remove_background(&mut self, index: usize) -> Option<Arc<T>> {
        if index >= self.background.len() {
            return None;
        }
        let removed = self.background.remove(index);
        self.bump();
        Some(removed)
    }

    pub fn contains_background(&self, entry: &Arc<T>) -> bool {
        self.background.iter().any(|e| Arc::ptr_eq(e, entry))
    }

    pub fn clear_background(&mut self) {
        self.background.clear();
        self.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn queue_of(names: &[&'static str]) -> (QueueStore<&'static str>, Vec<Arc<&'static str>>) {
        let entries: Vec<_> = names.iter().map(|n| Arc::new(*n)).collect();
        let mut queue = QueueStore::new();
        queue.insert(entries.clone(), 0);
        (queue, entries)
    }

    fn names(queue: &QueueStore<&'static str>) -> Vec<&'static str> {
        queue.entries().iter().map(|e| **e).collect()
    }

    #[test]
    fn insert_clamps_position() {
        let (mut queue, _) = queue_of(&["a", "b"]);
        queue.insert(vec![Arc::new("z")], 99);
        queue.insert(vec![Arc::new("x")], 1);
        assert_eq!(names(&queue), vec!["a", "x", "b", "z"]);
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let (mut queue, entries) = queue_of(&["a", "b", "c"]);
        let mut last = queue.revision();
        let mut check = |queue: &QueueStore<&'static str>| {
            assert!(queue.revision() > last);
            last = queue.revision();
        };

        queue.push(Arc::new("d"));
        check(&queue);
        queue.reorder(0, 2);
        check(&queue);
        queue.remove(0);
        check(&queue);
        assert!(queue.remove_entry(&entries[2]));
        check(&queue);
        queue.shuffle(None);
        check(&queue);
        queue.push_background(Arc::new("bg"));
        check(&queue);
        queue.clear();
        check(&queue);
    }

    #[test]
    fn no_op_leaves_revision_unchanged() {
        let (mut queue, _) = queue_of(&["a"]);
        let before = queue.revision();

        assert!(queue.remove(5).is_none());
        assert!(!queue.reorder(3, 0));
        assert!(!queue.remove_entry(&Arc::new("a")));
        queue.insert(Vec::new(), 0);
        assert_eq!(queue.index_of(&Arc::new("a")), None);

        assert_eq!(queue.revision(), before);
    }

    #[test]
    fn reorder_clamps_target() {
        let (mut queue, _) = queue_of(&["a", "b", "c"]);
        assert!(queue.reorder(0, 100));
        assert_eq!(names(&queue), vec!["b", "c", "a"]);

        assert!(queue.reorder(2, 0));
        assert_eq!(names(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn shuffle_pins_current_and_preserves_entries() {
        let (mut queue, entries) = queue_of(&["a", "b", "c", "d", "e", "f", "g"]);
        let current = entries[4].clone();

        for seed in 0..20 {
            queue.shuffle_with(Some(&current), &mut StdRng::seed_from_u64(seed));
            assert_eq!(queue.index_of(&current), Some(0));

            let after: HashSet<_> = names(&queue).into_iter().collect();
            assert_eq!(after.len(), entries.len());
            assert_eq!(queue.len(), entries.len());
        }
    }

    #[test]
    fn index_of_uses_identity() {
        let (queue, entries) = queue_of(&["a", "a"]);
        assert_eq!(queue.index_of(&entries[1]), Some(1));
        assert!(queue.contains(&entries[0]));
    }

    #[test]
    fn retain_and_drain_front() {
        let (mut queue, _) = queue_of(&["a", "b", "c", "d"]);

        let removed = queue.retain(|e| **e != "b");
        assert_eq!(removed.len(), 1);
        assert_eq!(names(&queue), vec!["a", "c", "d"]);

        let drained = queue.drain_front(2);
        assert_eq!(drained.len(), 2);
        assert_eq!(names(&queue), vec!["d"]);
        assert!(queue.drain_front(0).is_empty());
    }

    #[test]
    fn background_is_separate_from_main() {
        let (mut queue, _) = queue_of(&["a"]);
        let bg = Arc::new("bg");
        queue.push_background(bg.clone());

        assert_eq!(queue.len(), 1);
        assert!(queue.contains_background(&bg));
        assert!(!queue.contains(&bg));

        assert!(queue.remove_entry(&bg));
        assert!(queue.background().is_empty());
    }
}
