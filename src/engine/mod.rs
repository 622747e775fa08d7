//! The labeling context
//!
//! [`Netlabel`] owns both policy tables and the accept-unlabeled flag, and
//! holds the collaborators they depend on. It is constructed explicitly and
//! shared by reference (usually in an `Arc`) with every call site.
//!
//! ```text
//! connect/send  -> Netlabel::sock_setattr / conn_setattr / skbuff_setattr
//!                      -> DomainTable::get_leaf -> CipsoCodec::apply_label
//!
//! receive       -> Netlabel::skbuff_getattr
//!                      -> CipsoCodec::decode_label
//!                      -> InterfaceTable::get -> accept-unlabeled flag
//!
//! control plane -> Netlabel::add_domain / add_static / ...
//! ```
//!
//! # Example
//!
//! ```
//! use netlabel::addr::Family;
//! use netlabel::audit::AuditInfo;
//! use netlabel::config::DomainMapping;
//! use netlabel::engine::{Netlabel, Socket};
//! use netlabel::label::SecAttr;
//!
//! let netlabel = Netlabel::init(128, 128).unwrap();
//! netlabel
//!     .add_domain(&DomainMapping::unlabeled(Some("alice")), &AuditInfo::default())
//!     .unwrap();
//!
//! let mut sock = Socket::new(Family::Inet);
//! netlabel
//!     .sock_setattr(&mut sock, Family::Inet, &SecAttr::for_domain("alice"))
//!     .unwrap();
//! ```

mod inbound;
mod mgmt;
mod outbound;
mod target;

pub use target::{ConnectionRequest, Packet, Socket};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::cipso::{CipsoCodec, MemoryCipso};
use crate::domain::{DomainTable, DEFAULT_DOMAIN_BUCKETS};
use crate::error::NetlabelError;
use crate::netdev::{NetDeviceResolver, SystemNetDevices};
use crate::secid::{MemorySecidRegistry, SecidRegistry};
use crate::unlabeled::{InterfaceTable, DEFAULT_INTERFACE_BUCKETS};

/// Snapshot of the context's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetlabelStatus {
    /// Live domain mappings (default included)
    pub domains: usize,
    /// CIPSO leaves across all domain mappings
    pub labeled_leaves: usize,
    /// Interfaces with static mappings (default included)
    pub interfaces: usize,
    /// Static mappings across all interfaces
    pub static_mappings: usize,
    /// Accept-unlabeled flag
    pub accept_unlabeled: bool,
    /// Registered CIPSO DOIs
    pub dois: Vec<u32>,
    /// Whether labeling is in effect
    pub enabled: bool,
}

/// Process-wide labeling context.
pub struct Netlabel {
    domains: DomainTable,
    interfaces: InterfaceTable,
    accept_unlabeled: AtomicBool,
    codec: Arc<dyn CipsoCodec>,
    secids: Arc<dyn SecidRegistry>,
    devices: Arc<dyn NetDeviceResolver>,
    audit: Arc<dyn AuditSink>,
}

impl Netlabel {
    /// Start building a context.
    #[must_use]
    pub fn builder() -> NetlabelBuilder {
        NetlabelBuilder::new()
    }

    /// Create a context with in-memory collaborators and the given table
    /// sizes.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a size is not a power of two.
    pub fn init(domain_buckets: usize, interface_buckets: usize) -> Result<Self, NetlabelError> {
        Self::builder()
            .domain_buckets(domain_buckets)
            .interface_buckets(interface_buckets)
            .build()
    }

    /// Remove every mapping from both tables.
    ///
    /// Policies still held by in-flight readers are reclaimed once those
    /// readers finish.
    pub fn shutdown(&self) {
        let domains = self.domains.clear();
        let interfaces = self.interfaces.clear();
        info!(domains, interfaces, "Labeling tables cleared");
    }

    /// Outbound domain table.
    pub fn domains(&self) -> &DomainTable {
        &self.domains
    }

    /// Inbound interface table.
    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    /// CIPSO codec and DOI registry.
    pub fn codec(&self) -> &Arc<dyn CipsoCodec> {
        &self.codec
    }

    /// Security identity registry.
    pub fn secids(&self) -> &Arc<dyn SecidRegistry> {
        &self.secids
    }

    /// Interface resolver.
    pub fn devices(&self) -> &Arc<dyn NetDeviceResolver> {
        &self.devices
    }

    /// Current accept-unlabeled flag.
    pub fn accept_unlabeled(&self) -> bool {
        self.accept_unlabeled.load(Ordering::Acquire)
    }

    /// Whether any labeling configuration is in effect.
    pub fn enabled(&self) -> bool {
        self.domains.labeled_count() > 0 || self.interfaces.static_count() > 0
    }

    /// Snapshot of the context's state.
    pub fn status(&self) -> NetlabelStatus {
        let domains = self.domains.list();
        let interfaces = self.interfaces.list();
        NetlabelStatus {
            domains: domains.len(),
            labeled_leaves: domains.iter().map(|p| p.kind().cipso_leaves()).sum(),
            interfaces: interfaces.len(),
            static_mappings: interfaces.iter().map(|p| p.len()).sum(),
            accept_unlabeled: self.accept_unlabeled(),
            dois: self.codec.doi_list().iter().map(|d| d.doi).collect(),
            enabled: self.enabled(),
        }
    }
}

impl fmt::Debug for Netlabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Netlabel")
            .field("domains", &self.domains)
            .field("interfaces", &self.interfaces)
            .field("accept_unlabeled", &self.accept_unlabeled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Netlabel`].
///
/// Collaborators left unset default to [`MemoryCipso`],
/// [`MemorySecidRegistry`], [`SystemNetDevices`] and [`TracingAuditSink`].
pub struct NetlabelBuilder {
    domain_buckets: usize,
    interface_buckets: usize,
    accept_unlabeled: bool,
    codec: Option<Arc<dyn CipsoCodec>>,
    secids: Option<Arc<dyn SecidRegistry>>,
    devices: Option<Arc<dyn NetDeviceResolver>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl NetlabelBuilder {
    /// Builder with default table sizes and the accept flag set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain_buckets: DEFAULT_DOMAIN_BUCKETS,
            interface_buckets: DEFAULT_INTERFACE_BUCKETS,
            accept_unlabeled: true,
            codec: None,
            secids: None,
            devices: None,
            audit: None,
        }
    }

    /// Domain table buckets.
    #[must_use]
    pub const fn domain_buckets(mut self, size: usize) -> Self {
        self.domain_buckets = size;
        self
    }

    /// Interface table buckets.
    #[must_use]
    pub const fn interface_buckets(mut self, size: usize) -> Self {
        self.interface_buckets = size;
        self
    }

    /// Initial accept-unlabeled flag.
    #[must_use]
    pub const fn accept_unlabeled(mut self, accept: bool) -> Self {
        self.accept_unlabeled = accept;
        self
    }

    /// CIPSO codec.
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn CipsoCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Security identity registry.
    #[must_use]
    pub fn secids(mut self, secids: Arc<dyn SecidRegistry>) -> Self {
        self.secids = Some(secids);
        self
    }

    /// Interface resolver.
    #[must_use]
    pub fn devices(mut self, devices: Arc<dyn NetDeviceResolver>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Audit sink.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the context.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a table size is not a power of two.
    pub fn build(self) -> Result<Netlabel, NetlabelError> {
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>);
        let secids = self
            .secids
            .unwrap_or_else(|| Arc::new(MemorySecidRegistry::new()) as Arc<dyn SecidRegistry>);
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(MemoryCipso::new()) as Arc<dyn CipsoCodec>);
        let devices = self
            .devices
            .unwrap_or_else(|| Arc::new(SystemNetDevices) as Arc<dyn NetDeviceResolver>);

        let domains = DomainTable::new(self.domain_buckets, Arc::clone(&audit))?;
        let interfaces = InterfaceTable::new(
            self.interface_buckets,
            Arc::clone(&audit),
            Arc::clone(&secids),
        )?;

        info!(
            domain_buckets = self.domain_buckets,
            interface_buckets = self.interface_buckets,
            accept_unlabeled = self.accept_unlabeled,
            "Labeling context initialized"
        );

        Ok(Netlabel {
            domains,
            interfaces,
            accept_unlabeled: AtomicBool::new(self.accept_unlabeled),
            codec,
            secids,
            devices,
            audit,
        })
    }
}

impl Default for NetlabelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
