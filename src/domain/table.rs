//! Domain hash table
//!
//! Named domains live in a fixed array of bucket chains; the default domain
//! has its own slot. Reads are lock-free snapshot loads; every mutation runs
//! under the table's writer lock.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use super::types::{DomainPolicy, LeafKind, PolicyKind};
use crate::addr::AddrMask;
use crate::audit::{AuditEvent, AuditInfo, AuditKind, AuditSink};
use crate::error::NetlabelError;
use crate::label::LabelType;
use crate::rcu::{CowList, TableLock, WriteGuard};

/// Default number of domain buckets (7 hash bits).
pub const DEFAULT_DOMAIN_BUCKETS: usize = 1 << 7;

/// Fold a domain name into 32 bits.
///
/// Each byte is mixed in as `val = (val << 4 | val >> 28) ^ byte`.
#[must_use]
pub fn domain_hash(domain: &str) -> u32 {
    domain
        .bytes()
        .fold(0u32, |val, byte| val.rotate_left(4) ^ u32::from(byte))
}

fn display_domain(domain: Option<&str>) -> &str {
    domain.unwrap_or("<default>")
}

/// Outbound policy table keyed by domain name.
pub struct DomainTable {
    buckets: Box<[CowList<DomainPolicy>]>,
    default: ArcSwapOption<DomainPolicy>,
    lock: TableLock,
    audit: Arc<dyn AuditSink>,
}

impl DomainTable {
    /// Create a table with `size` buckets.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` unless `size` is a non-zero power of two.
    pub fn new(size: usize, audit: Arc<dyn AuditSink>) -> Result<Self, NetlabelError> {
        if !size.is_power_of_two() {
            return Err(NetlabelError::invalid(format!(
                "domain table size {size} is not a power of two"
            )));
        }
        let buckets = (0..size).map(|_| CowList::new()).collect();
        Ok(Self {
            buckets,
            default: ArcSwapOption::empty(),
            lock: TableLock::new(),
            audit,
        })
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index of a domain, always below [`DomainTable::size`].
    pub fn hash(&self, domain: &str) -> usize {
        (domain_hash(domain) as usize) & (self.buckets.len() - 1)
    }

    /// Policy for `domain`, falling back to the default policy.
    pub fn get(&self, domain: Option<&str>) -> Option<Arc<DomainPolicy>> {
        domain
            .and_then(|name| self.find(name))
            .or_else(|| self.get_exact(None))
    }

    /// Policy for exactly `domain`; `None` names the default policy.
    pub fn get_exact(&self, domain: Option<&str>) -> Option<Arc<DomainPolicy>> {
        match domain {
            Some(name) => self.find(name),
            None => self.default.load_full().filter(|p| p.is_valid()),
        }
    }

    /// Effective leaf for traffic sent as `domain` to `peer`.
    ///
    /// # Errors
    ///
    /// Returns `NoEntry` when nothing resolves and
    /// `DestinationAddressRequired` for an address-selective domain without a
    /// peer.
    pub fn get_leaf(
        &self,
        domain: Option<&str>,
        peer: Option<IpAddr>,
    ) -> Result<LeafKind, NetlabelError> {
        let Some(policy) = self.get(domain) else {
            debug!(domain = display_domain(domain), "No domain policy");
            return Err(NetlabelError::NoEntry);
        };
        policy.leaf_for(peer)
    }

    /// Add a policy, merging address ranges into an existing
    /// address-selective policy of the same domain.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if any incoming range is already present (nothing
    ///   is merged in that case)
    /// - `Invalid` for any other existing policy, including a direct policy
    ///   of the same kind
    pub fn add(&self, policy: DomainPolicy, subject: &AuditInfo) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        let existing = self.get_exact(policy.domain());
        let result = match &existing {
            None => Ok(()),
            Some(existing) => Self::merge(&guard, existing, &policy),
        };
        self.audit_add(&policy, subject, result.is_ok());

        if let Err(e) = result {
            warn!(
                domain = display_domain(policy.domain()),
                error = %e,
                "Rejected domain mapping"
            );
            return Err(e);
        }
        info!(
            domain = display_domain(policy.domain()),
            merged = existing.is_some(),
            "Added domain mapping"
        );
        if existing.is_none() {
            self.link(&guard, policy);
        }
        Ok(())
    }

    /// Remove a domain's whole policy.
    ///
    /// The policy is unlinked at once; it is reclaimed, releasing its DOI
    /// references, when the last reader holding it lets go.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the domain has no policy.
    pub fn remove(&self, domain: Option<&str>, subject: &AuditInfo) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        self.remove_locked(&guard, domain, subject)
    }

    /// Remove one address range of an address-selective domain.
    ///
    /// The whole domain goes away once its last range is removed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the domain is missing, not address-selective, or
    /// lacks this exact range.
    pub fn remove_address(
        &self,
        domain: Option<&str>,
        range: AddrMask,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let guard = self.lock.lock();
        let base = AuditEvent::new(AuditKind::MapDel, *subject)
            .domain(domain)
            .address(range);

        let existing = self.get_exact(domain);
        let select = match existing.as_deref().map(DomainPolicy::kind) {
            Some(PolicyKind::AddressSelect(select)) => select,
            _ => {
                self.audit.log(base.result(false));
                return Err(NetlabelError::NotFound);
            }
        };
        let Some(leaf) = select.remove(&guard, range) else {
            self.audit.log(base.result(false));
            return Err(NetlabelError::NotFound);
        };
        self.audit.log(base.protocol(&leaf.label_type().to_string(), leaf.doi()));
        info!(
            domain = display_domain(domain),
            range = %range,
            "Removed domain address mapping"
        );

        if select.is_empty() {
            debug!(
                domain = display_domain(domain),
                "Last address range removed, dropping domain"
            );
            self.remove_locked(&guard, domain, subject)?;
        }
        Ok(())
    }

    /// Snapshot of every live policy; the default policy comes last.
    pub fn list(&self) -> Vec<Arc<DomainPolicy>> {
        let mut policies: Vec<Arc<DomainPolicy>> = self
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
        policies.extend(self.get_exact(None));
        policies
    }

    /// Number of live policies.
    pub fn len(&self) -> usize {
        self.list().len()
    }

    /// Whether the table holds no live policy.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of CIPSO leaves reachable from the table.
    pub fn labeled_count(&self) -> usize {
        self.list().iter().map(|p| p.kind().cipso_leaves()).sum()
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

    fn merge(
        guard: &WriteGuard<'_>,
        existing: &DomainPolicy,
        incoming: &DomainPolicy,
    ) -> Result<(), NetlabelError> {
        match (existing.kind(), incoming.kind()) {
            (PolicyKind::AddressSelect(current), PolicyKind::AddressSelect(new)) => {
                if current.overlaps(new) {
                    return Err(NetlabelError::AlreadyExists);
                }
                current.absorb(guard, new)
            }
            (PolicyKind::AddressSelect(_), _) | (_, PolicyKind::AddressSelect(_)) => Err(
                NetlabelError::invalid("cannot merge address selection with a direct policy"),
            ),
            _ => Err(NetlabelError::invalid("domain already has a direct policy")),
        }
    }

    fn link(&self, guard: &WriteGuard<'_>, policy: DomainPolicy) {
        policy.set_valid(true);
        let policy = Arc::new(policy);
        match policy.domain() {
            Some(name) => {
                let index = self.hash(name);
                self.buckets[index].push(guard, policy);
            }
            None => self.default.store(Some(policy)),
        }
    }

    fn remove_locked(
        &self,
        guard: &WriteGuard<'_>,
        domain: Option<&str>,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let removed = match domain {
            Some(name) => {
                let index = self.hash(name);
                self.buckets[index]
                    .remove_first(guard, |p| p.is_valid() && p.domain() == Some(name))
            }
            None => match self.default.load_full() {
                Some(current) if current.is_valid() => self.default.swap(None),
                _ => None,
            },
        };

        let base = AuditEvent::new(AuditKind::MapDel, *subject).domain(domain);
        let Some(policy) = removed else {
            self.audit.log(base.result(false));
            return Err(NetlabelError::NotFound);
        };
        policy.set_valid(false);

        let event = match policy.kind() {
            PolicyKind::Unlabeled => base.protocol(&LabelType::Unlabeled.to_string(), None),
            PolicyKind::Cipso(doi) => base.protocol(&LabelType::Cipso.to_string(), Some(doi.doi())),
            PolicyKind::AddressSelect(_) => base,
        };
        self.audit.log(event);
        info!(domain = display_domain(domain), "Removed domain mapping");
        Ok(())
    }

    fn audit_add(&self, policy: &DomainPolicy, subject: &AuditInfo, success: bool) {
        let base = AuditEvent::new(AuditKind::MapAdd, *subject)
            .domain(policy.domain())
            .result(success);
        match policy.kind() {
            PolicyKind::AddressSelect(select) => {
                for (range, leaf) in select.entries() {
                    self.audit.log(
                        base.clone()
                            .address(range)
                            .protocol(&leaf.label_type().to_string(), leaf.doi()),
                    );
                }
            }
            PolicyKind::Unlabeled => {
                self.audit.log(base.protocol(&LabelType::Unlabeled.to_string(), None));
            }
            PolicyKind::Cipso(doi) => {
                let doi = Some(doi.doi());
                self.audit.log(base.protocol(&LabelType::Cipso.to_string(), doi));
            }
        }
    }

    fn find(&self, name: &str) -> Option<Arc<DomainPolicy>> {
        self.buckets[self.hash(name)]
            .load()
            .iter()
            .find(|p| p.is_valid() && p.domain() == Some(name))
            .cloned()
    }
}

impl fmt::Debug for DomainTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainTable")
            .field("size", &self.buckets.len())
            .field("policies", &self.len())
            .finish()
    }
}
