//! Ordered address range list
//!
//! Entries are kept most-specific first: an entry is inserted in front of
//! the first entry with a shorter mask, after all entries with an equal or
//! longer one. `lookup` returns the first containing entry, so the most
//! specific range wins and ties go to the earlier insertion.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::PrefixAddr;
use crate::error::NetlabelError;
use crate::rcu::{CowList, WriteGuard};

/// One address range and the policy attached to it.
pub struct AddressEntry<A, T> {
    addr: A,
    mask: A,
    valid: AtomicBool,
    policy: T,
}

impl<A: PrefixAddr, T> AddressEntry<A, T> {
    /// Create an entry; the address is masked here.
    pub fn new(addr: A, mask: A, policy: T) -> Self {
        Self {
            addr: addr.apply_mask(mask),
            mask,
            valid: AtomicBool::new(false),
            policy,
        }
    }

    /// Masked network address.
    pub fn addr(&self) -> A {
        self.addr
    }

    /// Network mask.
    pub fn mask(&self) -> A {
        self.mask
    }

    /// Policy attached to the range.
    pub fn policy(&self) -> &T {
        &self.policy
    }

    /// Whether the entry is currently linked into a list.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Check whether `candidate` falls inside the range.
    pub fn contains(&self, candidate: A) -> bool {
        candidate.apply_mask(self.mask) == self.addr
    }

    fn matches_exact(&self, addr: A, mask: A) -> bool {
        self.addr == addr && self.mask == mask
    }
}

impl<A: PrefixAddr, T: fmt::Debug> fmt::Debug for AddressEntry<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressEntry")
            .field("addr", &self.addr)
            .field("prefix", &A::mask_bits(self.mask))
            .field("valid", &self.is_valid())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Ordered list of `(prefix, mask) -> policy` entries for one family.
pub struct AddressRangeList<A, T> {
    entries: CowList<AddressEntry<A, T>>,
}

impl<A: PrefixAddr, T> AddressRangeList<A, T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: CowList::new(),
        }
    }

    /// Add a range.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if an entry with the identical masked address
    /// and mask is already present.
    pub fn add(
        &self,
        guard: &WriteGuard<'_>,
        addr: A,
        mask: A,
        policy: T,
    ) -> Result<(), NetlabelError> {
        self.add_entry(guard, Arc::new(AddressEntry::new(addr, mask, policy)))
    }

    /// Link an already constructed entry (used when merging lists).
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` on a duplicate range.
    pub fn add_entry(
        &self,
        guard: &WriteGuard<'_>,
        entry: Arc<AddressEntry<A, T>>,
    ) -> Result<(), NetlabelError> {
        if self.contains_exact(entry.addr, entry.mask) {
            return Err(NetlabelError::AlreadyExists);
        }
        let index = self.insert_position(entry.mask);
        entry.valid.store(true, Ordering::Release);
        self.entries.insert(guard, index, entry);
        Ok(())
    }

    /// Add a range to a list that is not yet reachable by readers.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` on a duplicate range.
    pub fn add_unpublished(&mut self, addr: A, mask: A, policy: T) -> Result<(), NetlabelError> {
        let entry = Arc::new(AddressEntry::new(addr, mask, policy));
        if self.contains_exact(entry.addr, entry.mask) {
            return Err(NetlabelError::AlreadyExists);
        }
        let index = self.insert_position(entry.mask);
        entry.valid.store(true, Ordering::Release);
        self.entries.insert_mut(index, entry);
        Ok(())
    }

    /// Remove the entry whose stored range matches exactly.
    ///
    /// `addr` is masked before comparing. The returned entry is already
    /// unlinked and marked invalid.
    pub fn remove_exact(
        &self,
        guard: &WriteGuard<'_>,
        addr: A,
        mask: A,
    ) -> Option<Arc<AddressEntry<A, T>>> {
        let addr = addr.apply_mask(mask);
        let removed = self
            .entries
            .remove_first(guard, |e| e.is_valid() && e.matches_exact(addr, mask))?;
        removed.valid.store(false, Ordering::Release);
        Some(removed)
    }

    /// Check for an entry with exactly this range.
    pub fn contains_exact(&self, addr: A, mask: A) -> bool {
        let addr = addr.apply_mask(mask);
        self.entries
            .load()
            .iter()
            .any(|e| e.is_valid() && e.matches_exact(addr, mask))
    }

    /// Find the first entry containing `candidate` (lock-free).
    pub fn lookup(&self, candidate: A) -> Option<Arc<AddressEntry<A, T>>> {
        self.entries
            .load()
            .iter()
            .find(|e| e.is_valid() && e.contains(candidate))
            .cloned()
    }

    /// Snapshot of the valid entries in list order.
    pub fn entries(&self) -> Vec<Arc<AddressEntry<A, T>>> {
        self.entries
            .load()
            .iter()
            .filter(|e| e.is_valid())
            .cloned()
            .collect()
    }

    /// Unlink and invalidate every entry.
    pub fn drain(&self, guard: &WriteGuard<'_>) -> Vec<Arc<AddressEntry<A, T>>> {
        let drained = self.entries.take_all(guard);
        for entry in &drained {
            entry.valid.store(false, Ordering::Release);
        }
        drained
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_position(&self, mask: A) -> usize {
        let bits = A::mask_bits(mask);
        let snapshot = self.entries.load();
        snapshot
            .iter()
            .position(|e| A::mask_bits(e.mask) < bits)
            .unwrap_or(snapshot.len())
    }
}

impl<A: PrefixAddr, T> Default for AddressRangeList<A, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PrefixAddr, T: fmt::Debug> fmt::Debug for AddressRangeList<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries().iter()).finish()
    }
}
