//! Ordered callback registry used for lifecycle hooks and frame callbacks.
//!
//! Delegates are plain values compared by identity (`PartialEq`). The
//! owner of a set decides what a delegate value means when it runs, which
//! keeps the registry free of captured mutable state.

#[derive(Clone, Debug, PartialEq)]
struct Entry<D> {
    delegate: D,
    priority: i32,
}

/// Delegates ordered by ascending priority, insertion order within equal
/// priorities.
#[derive(Clone, Debug)]
pub struct DelegateSet<D> {
    entries: Vec<Entry<D>>,
}

impl<D> Default for DelegateSet<D> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<D: Clone + PartialEq> DelegateSet<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `delegate` is already registered.
    pub fn add(&mut self, delegate: D, priority: i32) -> bool {
        if self.contains(&delegate) {
            return false;
        }

        let index = self
            .entries
            .partition_point(|entry| entry.priority <= priority);
        self.entries.insert(index, Entry { delegate, priority });
        true
    }

    /// Returns false when `delegate` was not registered.
    pub fn remove(&mut self, delegate: &D) -> bool {
        let Some(index) =
            self.entries.iter().position(|e| &e.delegate == delegate)
        else {
            return false;
        };

        self.entries.remove(index);
        true
    }

    pub fn contains(&self, delegate: &D) -> bool {
        self.entries.iter().any(|e| &e.delegate == delegate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.iter().map(|e| &e.delegate)
    }

    /// Copy of the current delegates in execution order.
    pub fn snapshot(&self) -> Vec<D> {
        self.iter().cloned().collect()
    }

    /// Runs every delegate present at call time. Delegates returning false
    /// are removed. `exec` sees a snapshot so the set may change while it
    /// runs.
    pub fn run_all(&mut self, mut exec: impl FnMut(&D) -> bool) {
        for delegate in self.snapshot() {
            if !exec(&delegate) {
                self.remove(&delegate);
            }
        }
    }

    /// Variant of [`DelegateSet::run_all`] for sets stored inside `owner`
    /// when the executor itself needs `owner` mutably. `select` re-borrows
    /// the set after every call; a set that disappeared mid-run simply
    /// stops receiving removals.
    pub fn run_all_in<O>(
        owner: &mut O,
        select: impl for<'a> Fn(&'a mut O) -> Option<&'a mut DelegateSet<D>>,
        mut exec: impl FnMut(&mut O, &D) -> bool,
    ) {
        let snapshot = match select(owner) {
            Some(set) => set.snapshot(),
            None => return,
        };

        for delegate in snapshot {
            if exec(owner, &delegate) {
                continue;
            }

            if let Some(set) = select(owner) {
                set.remove(&delegate);
            }
        }
    }
}
