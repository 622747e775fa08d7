//! Outbound labeling policy types

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::addr::{AddrMask, AddressRangeList};
use crate::cipso::DoiRef;
use crate::error::NetlabelError;
use crate::label::LabelType;
use crate::rcu::WriteGuard;

/// Labeling applied to traffic matching one address range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafKind {
    /// Send without a wire label
    Unlabeled,
    /// Label with CIPSO in this DOI
    Cipso(DoiRef),
}

impl LeafKind {
    /// Protocol name of the leaf.
    #[must_use]
    pub const fn label_type(&self) -> LabelType {
        match self {
            Self::Unlabeled => LabelType::Unlabeled,
            Self::Cipso(_) => LabelType::Cipso,
        }
    }

    /// DOI of a CIPSO leaf.
    #[must_use]
    pub fn doi(&self) -> Option<u32> {
        match self {
            Self::Unlabeled => None,
            Self::Cipso(doi) => Some(doi.doi()),
        }
    }
}

/// Per-peer-address policy selection for one domain.
#[derive(Debug, Default)]
pub struct AddressSelect {
    v4: AddressRangeList<Ipv4Addr, LeafKind>,
    v6: AddressRangeList<Ipv6Addr, LeafKind>,
}

impl AddressSelect {
    /// Create an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a range before the selection is linked into a table.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the range is already present.
    pub fn add(&mut self, range: AddrMask, leaf: LeafKind) -> Result<(), NetlabelError> {
        match range {
            AddrMask::V4 { addr, mask } => self.v4.add_unpublished(addr, mask, leaf),
            AddrMask::V6 { addr, mask } => self.v6.add_unpublished(addr, mask, leaf),
        }
    }

    /// Builder form of [`AddressSelect::add`].
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the range is already present.
    pub fn with(mut self, range: AddrMask, leaf: LeafKind) -> Result<Self, NetlabelError> {
        self.add(range, leaf)?;
        Ok(self)
    }

    /// Leaf of the first range containing `peer`.
    #[must_use]
    pub fn lookup(&self, peer: IpAddr) -> Option<LeafKind> {
        match peer {
            IpAddr::V4(ip) => self.v4.lookup(ip).map(|e| e.policy().clone()),
            IpAddr::V6(ip) => self.v6.lookup(ip).map(|e| e.policy().clone()),
        }
    }

    /// Snapshot of every range, IPv4 first, each family in lookup order.
    #[must_use]
    pub fn entries(&self) -> Vec<(AddrMask, LeafKind)> {
        let v4 = self.v4.entries().into_iter().map(|e| {
            let range = AddrMask::V4 {
                addr: e.addr(),
                mask: e.mask(),
            };
            (range, e.policy().clone())
        });
        let v6 = self.v6.entries().into_iter().map(|e| {
            let range = AddrMask::V6 {
                addr: e.addr(),
                mask: e.mask(),
            };
            (range, e.policy().clone())
        });
        v4.chain(v6).collect()
    }

    /// Number of ranges in both families.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Whether both families are empty.
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Whether any range of `incoming` is already present here.
    pub(crate) fn overlaps(&self, incoming: &Self) -> bool {
        incoming
            .v4
            .entries()
            .iter()
            .any(|e| self.v4.contains_exact(e.addr(), e.mask()))
            || incoming
                .v6
                .entries()
                .iter()
                .any(|e| self.v6.contains_exact(e.addr(), e.mask()))
    }

    /// Move every range of `incoming` into this linked selection.
    ///
    /// Callers check [`AddressSelect::overlaps`] first under the same guard.
    pub(crate) fn absorb(
        &self,
        guard: &WriteGuard<'_>,
        incoming: &Self,
    ) -> Result<(), NetlabelError> {
        for entry in incoming.v4.entries() {
            self.v4.add_entry(guard, entry)?;
        }
        for entry in incoming.v6.entries() {
            self.v6.add_entry(guard, entry)?;
        }
        Ok(())
    }

    /// Remove one range from this linked selection.
    pub(crate) fn remove(&self, guard: &WriteGuard<'_>, range: AddrMask) -> Option<LeafKind> {
        match range {
            AddrMask::V4 { addr, mask } => self
                .v4
                .remove_exact(guard, addr, mask)
                .map(|e| e.policy().clone()),
            AddrMask::V6 { addr, mask } => self
                .v6
                .remove_exact(guard, addr, mask)
                .map(|e| e.policy().clone()),
        }
    }
}

/// Policy kind of a domain.
#[derive(Debug)]
pub enum PolicyKind {
    /// Send everything unlabeled
    Unlabeled,
    /// Label everything with CIPSO in this DOI
    Cipso(DoiRef),
    /// Choose by peer address
    AddressSelect(AddressSelect),
}

impl PolicyKind {
    /// Protocol of a direct policy; `None` for address selection.
    #[must_use]
    pub const fn label_type(&self) -> Option<LabelType> {
        match self {
            Self::Unlabeled => Some(LabelType::Unlabeled),
            Self::Cipso(_) => Some(LabelType::Cipso),
            Self::AddressSelect(_) => None,
        }
    }

    /// Number of CIPSO leaves reachable through this policy.
    #[must_use]
    pub fn cipso_leaves(&self) -> usize {
        match self {
            Self::Unlabeled => 0,
            Self::Cipso(_) => 1,
            Self::AddressSelect(select) => select
                .entries()
                .iter()
                .filter(|(_, leaf)| matches!(leaf, LeafKind::Cipso(_)))
                .count(),
        }
    }
}

/// Labeling policy for traffic sent as one domain.
pub struct DomainPolicy {
    domain: Option<String>,
    kind: PolicyKind,
    valid: AtomicBool,
}

impl DomainPolicy {
    /// Create a policy; `None` is the default domain.
    #[must_use]
    pub fn new(domain: Option<String>, kind: PolicyKind) -> Self {
        Self {
            domain,
            kind,
            valid: AtomicBool::new(false),
        }
    }

    /// Unlabeled policy.
    #[must_use]
    pub fn unlabeled(domain: Option<&str>) -> Self {
        Self::new(domain.map(str::to_string), PolicyKind::Unlabeled)
    }

    /// CIPSO policy.
    #[must_use]
    pub fn cipso(domain: Option<&str>, doi: DoiRef) -> Self {
        Self::new(domain.map(str::to_string), PolicyKind::Cipso(doi))
    }

    /// Address-selective policy.
    #[must_use]
    pub fn address_select(domain: Option<&str>, select: AddressSelect) -> Self {
        let kind = PolicyKind::AddressSelect(select);
        Self::new(domain.map(str::to_string), kind)
    }

    /// Domain name, `None` for the default policy.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Whether this is the default policy.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.domain.is_none()
    }

    /// Policy kind.
    #[must_use]
    pub fn kind(&self) -> &PolicyKind {
        &self.kind
    }

    /// Whether the policy is linked into a table.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Effective leaf for a peer.
    ///
    /// Direct policies ignore the peer. Address-selective policies need one.
    ///
    /// # Errors
    ///
    /// Returns `DestinationAddressRequired` for an address-selective policy
    /// without a peer, and `NoEntry` when no range contains the peer.
    pub fn leaf_for(&self, peer: Option<IpAddr>) -> Result<LeafKind, NetlabelError> {
        match &self.kind {
            PolicyKind::Unlabeled => Ok(LeafKind::Unlabeled),
            PolicyKind::Cipso(doi) => Ok(LeafKind::Cipso(doi.clone())),
            PolicyKind::AddressSelect(select) => {
                let peer = peer.ok_or(NetlabelError::DestinationAddressRequired)?;
                select.lookup(peer).ok_or(NetlabelError::NoEntry)
            }
        }
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

impl fmt::Debug for DomainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainPolicy")
            .field("domain", &self.domain)
            .field("kind", &self.kind)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcu::TableLock;

    fn range(s: &str) -> AddrMask {
        s.parse().unwrap()
    }

    #[test]
    fn test_address_select_lookup_by_family() {
        let select = AddressSelect::new()
            .with(range("10.0.0.0/8"), LeafKind::Unlabeled)
            .unwrap()
            .with(range("fd00::/8"), LeafKind::Unlabeled)
            .unwrap();
        assert_eq!(select.len(), 2);
        assert_eq!(
            select.lookup("10.2.3.4".parse().unwrap()),
            Some(LeafKind::Unlabeled)
        );
        assert!(select.lookup("11.0.0.1".parse().unwrap()).is_none());
        assert!(select.lookup("fd12::1".parse().unwrap()).is_some());
    }

    #[test]
    fn test_address_select_duplicate() {
        let mut select = AddressSelect::new();
        select.add(range("10.0.0.0/24"), LeafKind::Unlabeled).unwrap();
        assert_eq!(
            select.add(range("10.0.0.1/24"), LeafKind::Unlabeled),
            Err(NetlabelError::AlreadyExists)
        );
    }

    #[test]
    fn test_overlaps_and_absorb() {
        let lock = TableLock::new();
        let existing = AddressSelect::new()
            .with(range("10.0.0.0/24"), LeafKind::Unlabeled)
            .unwrap();
        let clash = AddressSelect::new()
            .with(range("192.168.0.0/16"), LeafKind::Unlabeled)
            .unwrap()
            .with(range("10.0.0.0/24"), LeafKind::Unlabeled)
            .unwrap();
        let fresh = AddressSelect::new()
            .with(range("192.168.0.0/16"), LeafKind::Unlabeled)
            .unwrap();

        assert!(existing.overlaps(&clash));
        assert!(!existing.overlaps(&fresh));

        let guard = lock.lock();
        existing.absorb(&guard, &fresh).unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.remove(&guard, range("192.168.0.0/16")).is_some());
        assert!(existing.remove(&guard, range("192.168.0.0/16")).is_none());
    }

    #[test]
    fn test_leaf_for() {
        let direct = DomainPolicy::unlabeled(Some("alice"));
        assert_eq!(direct.leaf_for(None), Ok(LeafKind::Unlabeled));

        let select = AddressSelect::new()
            .with(range("10.0.0.0/24"), LeafKind::Unlabeled)
            .unwrap();
        let policy = DomainPolicy::address_select(Some("bob"), select);
        assert_eq!(
            policy.leaf_for(None),
            Err(NetlabelError::DestinationAddressRequired)
        );
        assert_eq!(
            policy.leaf_for(Some("192.168.1.1".parse().unwrap())),
            Err(NetlabelError::NoEntry)
        );
        assert_eq!(
            policy.leaf_for(Some("10.0.0.5".parse().unwrap())),
            Ok(LeafKind::Unlabeled)
        );
    }
}
