//! Control-plane operations
//!
//! Each operation maps 1:1 onto a table operation after translating the
//! administrative names (DOI numbers, interface names, security contexts)
//! into the handles the tables store.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use super::Netlabel;
use crate::addr::AddrMask;
use crate::audit::{AuditEvent, AuditInfo, AuditKind};
use crate::cipso::DoiRef;
use crate::config::{AddressMapping, DomainMapping, LeafConfig, PolicyConfig, StaticMapping};
use crate::domain::{AddressSelect, DomainPolicy, LeafKind, PolicyKind};
use crate::error::NetlabelError;
use crate::label::LabelType;
use crate::unlabeled::IfIndex;

impl Netlabel {
    /// Add a domain mapping; address ranges of an address-selective mapping
    /// merge into an existing one.
    ///
    /// # Errors
    ///
    /// - `Invalid` for an unknown DOI, an empty address selection or a
    ///   domain that already has a direct policy
    /// - `AlreadyExists` for a duplicate address range
    pub fn add_domain(
        &self,
        mapping: &DomainMapping,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        match self.policy_from(&mapping.policy) {
            Ok(kind) => self
                .domains
                .add(DomainPolicy::new(mapping.domain.clone(), kind), subject),
            Err(e) => {
                self.audit_rejected_mapping(mapping, subject);
                warn!(
                    domain = mapping.display_name(),
                    error = %e,
                    "Rejected domain mapping"
                );
                Err(e)
            }
        }
    }

    /// Add one address range to a domain, creating an address-selective
    /// mapping if the domain has none.
    ///
    /// # Errors
    ///
    /// As for [`Netlabel::add_domain`].
    pub fn add_domain_address(
        &self,
        domain: Option<&str>,
        range: AddrMask,
        leaf: &LeafConfig,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let mapping = DomainMapping::address_select(
            domain,
            vec![AddressMapping {
                address: range,
                leaf: leaf.clone(),
            }],
        );
        self.add_domain(&mapping, subject)
    }

    /// Remove a domain mapping entirely.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the domain has no mapping.
    pub fn remove_domain(
        &self,
        domain: Option<&str>,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        self.domains.remove(domain, subject)
    }

    /// Remove one address range from an address-selective domain.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the range is not mapped for the domain.
    pub fn remove_domain_address(
        &self,
        domain: Option<&str>,
        range: AddrMask,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        self.domains.remove_address(domain, range, subject)
    }

    /// Every domain mapping, default last.
    pub fn list_domains(&self) -> Vec<DomainMapping> {
        self.domains
            .list()
            .iter()
            .map(|policy| {
                let policy_config = match policy.kind() {
                    PolicyKind::Unlabeled => PolicyConfig::Unlabeled,
                    PolicyKind::Cipso(doi) => PolicyConfig::Cipso { doi: doi.doi() },
                    PolicyKind::AddressSelect(select) => PolicyConfig::AddressSelect {
                        addresses: select
                            .entries()
                            .into_iter()
                            .map(|(address, leaf)| AddressMapping {
                                address,
                                leaf: match leaf {
                                    LeafKind::Unlabeled => LeafConfig::Unlabeled,
                                    LeafKind::Cipso(doi) => LeafConfig::Cipso { doi: doi.doi() },
                                },
                            })
                            .collect(),
                    },
                };
                DomainMapping {
                    domain: policy.domain().map(str::to_string),
                    policy: policy_config,
                }
            })
            .collect()
    }

    /// Add a static unlabeled mapping; `None` binds it to the default
    /// interface.
    ///
    /// # Errors
    ///
    /// - `NoDevice` for an unknown interface
    /// - `Invalid` for an unknown security context
    /// - `AlreadyExists` if the interface already maps this range
    pub fn add_static(
        &self,
        interface: Option<&str>,
        range: AddrMask,
        secctx: &str,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        let rejected = AuditEvent::new(AuditKind::StaticAdd, *subject)
            .address(range)
            .secctx(Some(secctx.to_string()))
            .result(false);
        let ifindex = match self.resolve_interface(interface) {
            Ok(ifindex) => ifindex,
            Err(e) => return Err(self.reject_static(rejected, e)),
        };
        let Some(secid) = self.secids.secctx_to_secid(secctx) else {
            let e = NetlabelError::invalid(format!("unknown security context '{secctx}'"));
            return Err(self.reject_static(rejected.netif(ifindex), e));
        };
        self.interfaces.add(ifindex, range, secid, subject)
    }

    /// Remove a static unlabeled mapping.
    ///
    /// # Errors
    ///
    /// Returns `NoDevice` for an unknown interface and `NotFound` if the
    /// mapping does not exist.
    pub fn remove_static(
        &self,
        interface: Option<&str>,
        range: AddrMask,
        subject: &AuditInfo,
    ) -> Result<(), NetlabelError> {
        match self.resolve_interface(interface) {
            Ok(ifindex) => self.interfaces.remove(ifindex, range, subject),
            Err(e) => {
                let rejected = AuditEvent::new(AuditKind::StaticDel, *subject)
                    .address(range)
                    .result(false);
                Err(self.reject_static(rejected, e))
            }
        }
    }

    /// Remove every static mapping of the default interface.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the default interface has no mappings.
    pub fn remove_static_default(&self, subject: &AuditInfo) -> Result<(), NetlabelError> {
        self.interfaces.remove_default(subject)
    }

    /// Every static mapping, default interface last.
    ///
    /// Interfaces the resolver cannot name are reported by index.
    pub fn list_static(&self) -> Vec<StaticMapping> {
        self.interfaces
            .list()
            .iter()
            .flat_map(|iface| {
                let interface = match iface.ifindex() {
                    IfIndex::Default => None,
                    IfIndex::Index(index) => Some(
                        self.devices
                            .name_of(index)
                            .unwrap_or_else(|| index.to_string()),
                    ),
                };
                iface
                    .entries()
                    .into_iter()
                    .map(move |(address, secid)| StaticMapping {
                        interface: interface.clone(),
                        address,
                        secctx: self
                            .secids
                            .secid_to_secctx(secid)
                            .unwrap_or_else(|| secid.to_string()),
                    })
            })
            .collect()
    }

    /// Set the accept-unlabeled flag.
    pub fn set_accept_unlabeled(&self, accept: bool, subject: &AuditInfo) {
        let old = self.accept_unlabeled.swap(accept, Ordering::AcqRel);
        self.audit.log(
            AuditEvent::new(AuditKind::AcceptUnlabeled, *subject).accept(accept, old),
        );
        info!(accept, old, "Accept-unlabeled flag set");
    }

    /// Forget the static mappings of an interface that went away.
    pub fn netdev_down(&self, ifindex: u32) -> bool {
        self.interfaces.netdev_down(ifindex)
    }

    /// Labeling protocols this context can apply.
    #[must_use]
    pub fn protocols(&self) -> Vec<LabelType> {
        vec![LabelType::Unlabeled, LabelType::Cipso]
    }

    fn acquire_doi(&self, doi: u32) -> Result<DoiRef, NetlabelError> {
        DoiRef::acquire(&self.codec, doi)
            .ok_or_else(|| NetlabelError::invalid(format!("unknown DOI {doi}")))
    }

    fn leaf_from(&self, leaf: &LeafConfig) -> Result<LeafKind, NetlabelError> {
        match leaf {
            LeafConfig::Unlabeled => Ok(LeafKind::Unlabeled),
            LeafConfig::Cipso { doi } => Ok(LeafKind::Cipso(self.acquire_doi(*doi)?)),
        }
    }

    fn policy_from(&self, policy: &PolicyConfig) -> Result<PolicyKind, NetlabelError> {
        match policy {
            PolicyConfig::Unlabeled => Ok(PolicyKind::Unlabeled),
            PolicyConfig::Cipso { doi } => Ok(PolicyKind::Cipso(self.acquire_doi(*doi)?)),
            PolicyConfig::AddressSelect { addresses } => {
                if addresses.is_empty() {
                    return Err(NetlabelError::invalid("empty address selection"));
                }
                let mut select = AddressSelect::new();
                for address in addresses {
                    select.add(address.address, self.leaf_from(&address.leaf)?)?;
                }
                Ok(PolicyKind::AddressSelect(select))
            }
        }
    }

    /// One failed `MapAdd` record per requested range, or one for a direct
    /// policy.
    fn audit_rejected_mapping(&self, mapping: &DomainMapping, subject: &AuditInfo) {
        let base = AuditEvent::new(AuditKind::MapAdd, *subject)
            .domain(mapping.domain.as_deref())
            .result(false);
        match &mapping.policy {
            PolicyConfig::Unlabeled => self
                .audit
                .log(base.protocol(&LabelType::Unlabeled.to_string(), None)),
            PolicyConfig::Cipso { doi } => self
                .audit
                .log(base.protocol(&LabelType::Cipso.to_string(), Some(*doi))),
            PolicyConfig::AddressSelect { addresses } if addresses.is_empty() => {
                self.audit.log(base);
            }
            PolicyConfig::AddressSelect { addresses } => {
                for address in addresses {
                    let (label_type, doi) = match address.leaf {
                        LeafConfig::Unlabeled => (LabelType::Unlabeled, None),
                        LeafConfig::Cipso { doi } => (LabelType::Cipso, Some(doi)),
                    };
                    self.audit.log(
                        base.clone()
                            .address(address.address)
                            .protocol(&label_type.to_string(), doi),
                    );
                }
            }
        }
    }

    fn reject_static(&self, event: AuditEvent, error: NetlabelError) -> NetlabelError {
        warn!(
            range = ?event.address,
            error = %error,
            "Rejected static mapping change"
        );
        self.audit.log(event);
        error
    }

    fn resolve_interface(&self, interface: Option<&str>) -> Result<IfIndex, NetlabelError> {
        let Some(name) = interface else {
            return Ok(IfIndex::Default);
        };
        self.devices
            .index_of(name)
            .or_else(|| name.parse().ok())
            .map(IfIndex::Index)
            .ok_or_else(|| NetlabelError::NoDevice(name.to_string()))
    }
}
