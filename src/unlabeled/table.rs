//! Interface hash table
//!
//! Interfaces hash by `ifindex & (size - 1)`; the default interface has a
//! dedicated slot. A non-default interface policy exists only while it has at
//! least one mapping.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use super::types::{IfIndex, InterfacePolicy};
use crate::addr::AddrMask;
use crate::audit::{AuditEvent, AuditInfo, AuditKind, AuditSink};
use crate::error::NetlabelError;
use crate::rcu::{CowList, TableLock, WriteGuard};
use crate::secid::{SecId, SecidRegistry};

/// Default number of interface buckets (7 hash bits).
pub const DEFAULT_INTERFACE_BUCKETS: usize = 1 << 7;

/// Inbound fallback table keyed by receiving interface.
pub struct InterfaceTable {
    buckets: Box<[CowList<InterfacePolicy>]>,
    default: ArcSwapOption<InterfacePolicy>,
    lock: TableLock,
    audit: Arc<dyn AuditSink>,
    secids: Arc<dyn SecidRegistry>,
}

impl InterfaceTable {
    /// Create a table with `size` buckets.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` unless `size` is a non-zero power of two.
    pub fn new(
        size: usize,
        audit: Arc<dyn AuditSink>,
        secids: Arc<dyn SecidRegistry>,
    ) -> Result<Self, NetlabelError> {
        if !size.is_power_of_two() {
            return Err(NetlabelError::invalid(format!(
                "interface table size {size} is not a power of two"
            )));
        }
        Ok(Self {
            buckets: (0..size).map(|_| CowList::new()).collect(),
            default: ArcSwapOption::empty(),
            lock: TableLock::new(),
            audit,
            secids,
        })
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index of an interface.
    pub fn hash(&self, ifindex: u32) -> usize {
        (ifindex as usize) & (self.buckets.len() - 1)
    }

    /// Policy of the receiving interface, falling back to the default
    /// interface when it has no valid policy of its own.
    pub fn get(&self, ifindex: u32) -> Option<Arc<InterfacePolicy>> {
        self.get_exact(IfIndex::Index(ifindex))
            .or_else(|| self.get_exact(IfIndex::Default))
    }

    /// Policy bound to exactly `ifindex`.
    pub fn get_exact(&self, ifindex: IfIndex) -> Option<Arc<InterfacePolicy>> {
        match ifindex {
            IfIndex::Index(index) => self.buckets[self.hash(index)]
                .load()
                .iter()
                .find(|p| p.is_valid() && p.ifindex() == ifindex)
                .cloned(),
            IfIndex::Default => self.default.load_full().filter(|p| p.is_valid()),
        }
    }

    /// Add a static mapping, creating the interface policy when needed.
    ///
    /// # Errors
    ///
    /// - `Invalid` for interface index 0
    /// - `AlreadyExists` if the interface already maps this exact range
    pub fn add(
        &self,
        ifindex: IfIndex,
        range: AddrMask,
        secid: SecId,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        let result = self.add_locked(&guard, ifindex, range, secid);

        self.audit.log(
            AuditEvent::new(AuditKind::StaticAdd, *subject)
                .netif(ifindex)
                .address(range)
                .secctx(self.secids.secid_to_secctx(secid))
                .result(result.is_ok()),
        );
        match &result {
            Ok(()) => info!(netif = %ifindex, range = %range, %secid, "Added static mapping"),
            Err(e) => {
                warn!(netif = %ifindex, range = %range, error = %e, "Rejected static mapping");
            }
        }
        result
    }

    /// Remove a static mapping.
    ///
    /// A non-default interface policy left without mappings is removed too.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the interface or the exact range is unknown.
    pub fn remove(
        &self,
        ifindex: IfIndex,
        range: AddrMask,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        let base = AuditEvent::new(AuditKind::StaticDel, *subject)
            .netif(ifindex)
            .address(range);

        let removed = self
            .get_exact(ifindex)
            .and_then(|iface| iface.remove(&guard, range).map(|secid| (iface, secid)));
        let Some((iface, secid)) = removed else {
            self.audit.log(base.result(false));
            return Err(NetlabelError::NotFound);
        };
        self.audit.log(base.secctx(self.secids.secid_to_secctx(secid)));
        info!(netif = %ifindex, range = %range, "Removed static mapping");

        if !ifindex.is_default() && iface.is_empty() {
            debug!(netif = %ifindex, "Interface has no mappings left, removing");
            self.unlink(&guard, ifindex);
        }
        Ok(())
    }

    /// Remove the default interface policy with all its mappings.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no default interface policy.
    pub fn remove_default(&self, subject: &AuditInfo) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        let removed = self.unlink(&guard, IfIndex::Default);
        self.audit.log(
            AuditEvent::new(AuditKind::StaticDel, *subject)
                .netif(IfIndex::Default)
                .result(removed.is_some()),
        );
        match removed {
            Some(policy) => {
                info!(mappings = policy.len(), "Removed default static mappings");
                Ok(())
            }
            None => Err(NetlabelError::NotFound),
        }
    }

    /// Forget the policy of an interface that went away.
    ///
    /// Returns whether a policy was bound to it.
    pub fn netdev_down(&self, ifindex: u32) -> bool {
        let guard = self.lock.lock();
        let removed = self.unlink(&guard, IfIndex::Index(ifindex));
        if let Some(policy) = &removed {
            info!(
                ifindex,
                mappings = policy.len(),
                "Interface down, dropped static mappings"
            );
        }
        removed.is_some()
    }

    /// Snapshot of every live policy; the default interface comes last.
    pub fn list(&self) -> Vec<Arc<InterfacePolicy>> {
        let mut policies: Vec<Arc<InterfacePolicy>> = self
            .buckets
            .iter()
            .flat_map(|bucket| {
                bucket
                    .load()
                    .iter()
                    .filter(|p| p.is_valid())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        policies.extend(self.get_exact(IfIndex::Default));
        policies
    }

    /// Number of static mappings across all interfaces.
    pub fn static_count(&self) -> usize {
        self.list().iter().map(|p| p.len()).sum()
    }

    /// Unlink every policy, returning how many were removed.
    pub fn clear(&self) -> usize {
        let guard = self.lock.lock();
        let mut removed = 0;
        for bucket in self.buckets.iter() {
            for policy in bucket.take_all(&guard) {
                policy.set_valid(false);
                removed += 1;
            }
        }
        if let Some(policy) = self.default.swap(None) {
            policy.set_valid(false);
            removed += 1;
        }
        removed
    }

    fn add_locked(
        &self,
        guard: &WriteGuard<'_>,
        ifindex: IfIndex,
        range: AddrMask,
        secid: SecId,
    ) -> Result<(), NetlabelError> {
        if ifindex == IfIndex::Index(0) {
            return Err(NetlabelError::invalid("interface index 0"));
        }
        if let Some(iface) = self.get_exact(ifindex) {
            return iface.add(guard, range, secid);
        }

        // Fully populate the new policy before readers can reach it.
        let mut iface = InterfacePolicy::new(ifindex);
        iface.add_unpublished(range, secid)?;
        iface.set_valid(true);
        let iface = Arc::new(iface);
        match ifindex {
            IfIndex::Index(index) => self.buckets[self.hash(index)].push(guard, iface),
            IfIndex::Default => self.default.store(Some(iface)),
        }
        Ok(())
    }

    fn unlink(&self, guard: &WriteGuard<'_>, ifindex: IfIndex) -> Option<Arc<InterfacePolicy>> {
        let removed = match ifindex {
            IfIndex::Index(index) => self.buckets[self.hash(index)]
                .remove_first(guard, |p| p.is_valid() && p.ifindex() == ifindex),
            IfIndex::Default => match self.default.load_full() {
                Some(current) if current.is_valid() => self.default.swap(None),
                _ => None,
            },
        }?;
        removed.set_valid(false);
        Some(removed)
    }
}

impl fmt::Debug for InterfaceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceTable")
            .field("size", &self.buckets.len())
            .field("interfaces", &self.list().len())
            .finish()
    }
}
