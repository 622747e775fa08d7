//! Read-copy-update primitives shared by the policy tables
//!
//! Both tables follow the same discipline:
//!
//! ```text
//! Reader -> CowList::load() -> ArcSwap::load() -> Vec<Arc<T>>   (lock-free)
//!
//! Writer -> TableLock::lock() -> clone Vec -> modify -> ArcSwap::store()
//!                                                         |
//!                                   unlinked Arc<T> freed when the last
//!                                   reader snapshot holding it is dropped
//! ```
//!
//! Unlinking is visible to new readers as soon as the new vector is stored.
//! An unlinked element is reclaimed (its `Drop` runs) only after every
//! snapshot that could have observed it has been released, which is the
//! grace period the tables rely on to release DOI references safely.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, MutexGuard};

/// Per-table writer lock.
///
/// Readers never touch it. Every mutation of a table's chains or address
/// lists happens while the returned [`WriteGuard`] is alive.
#[derive(Debug, Default)]
pub struct TableLock {
    inner: Mutex<()>,
}

impl TableLock {
    /// Create an unlocked table lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the writer lock.
    pub fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            _guard: self.inner.lock(),
        }
    }
}

/// Proof that the caller holds a table's writer lock.
///
/// Mutating methods on [`CowList`] take a reference to this token.
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WriteGuard")
    }
}

/// Copy-on-write list of shared elements with lock-free reads.
pub struct CowList<T> {
    items: ArcSwap<Vec<Arc<T>>>,
}

impl<T> CowList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Load the current snapshot (lock-free).
    ///
    /// Elements reachable from the snapshot stay allocated until the guard
    /// is dropped, even if a writer unlinks them meanwhile.
    pub fn load(&self) -> Guard<Arc<Vec<Arc<T>>>> {
        self.items.load()
    }

    /// Number of elements in the current snapshot.
    pub fn len(&self) -> usize {
        self.items.load().len()
    }

    /// Check whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.items.load().is_empty()
    }

    /// Insert `item` at `index` (clamped to the list length).
    pub fn insert(&self, _guard: &WriteGuard<'_>, index: usize, item: Arc<T>) {
        self.update(|items| {
            let index = index.min(items.len());
            items.insert(index, item);
        });
    }

    /// Append `item` to the end of the list.
    pub fn push(&self, _guard: &WriteGuard<'_>, item: Arc<T>) {
        self.update(|items| items.push(item));
    }

    /// Unlink the first element matching `pred` and return it.
    pub fn remove_first<F>(&self, _guard: &WriteGuard<'_>, mut pred: F) -> Option<Arc<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let position = self.items.load().iter().position(|item| pred(item))?;
        let mut removed = None;
        self.update(|items| removed = Some(items.remove(position)));
        removed
    }

    /// Unlink every element and return them.
    pub fn take_all(&self, _guard: &WriteGuard<'_>) -> Vec<Arc<T>> {
        let old = self.items.swap(Arc::new(Vec::new()));
        old.iter().cloned().collect()
    }

    /// Exclusive-access insert used while a structure is still unpublished.
    pub(crate) fn insert_mut(&mut self, index: usize, item: Arc<T>) {
        self.update(|items| {
            let index = index.min(items.len());
            items.insert(index, item);
        });
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Vec<Arc<T>>),
    {
        let mut next: Vec<Arc<T>> = self.items.load().iter().cloned().collect();
        f(&mut next);
        self.items.store(Arc::new(next));
    }
}

impl<T> Default for CowList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for CowList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.load().iter()).finish()
    }
}
