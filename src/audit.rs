//! Audit records for policy changes
//!
//! Every add or remove on either table emits an [`AuditEvent`], whether it
//! succeeded or not, so that policy changes are observable regardless of how
//! the caller handles the result.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::addr::AddrMask;
use crate::unlabeled::IfIndex;

/// Identity of the party requesting a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// User id of the requester
    pub uid: Option<u32>,
    /// Process id of the requester
    pub pid: Option<i32>,
}

impl AuditInfo {
    /// Requester identified by user and process id.
    #[must_use]
    pub const fn new(uid: Option<u32>, pid: Option<i32>) -> Self {
        Self { uid, pid }
    }
}

/// Kind of audited change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Domain mapping added
    MapAdd,
    /// Domain mapping removed
    MapDel,
    /// Static unlabeled mapping added
    StaticAdd,
    /// Static unlabeled mapping removed
    StaticDel,
    /// Accept-unlabeled flag changed
    AcceptUnlabeled,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MapAdd => "MAC_MAP_ADD",
            Self::MapDel => "MAC_MAP_DEL",
            Self::StaticAdd => "MAC_UNLBL_STCADD",
            Self::StaticDel => "MAC_UNLBL_STCDEL",
            Self::AcceptUnlabeled => "MAC_UNLBL_ALLOW",
        };
        f.write_str(name)
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What changed
    pub kind: AuditKind,
    /// Who asked
    pub subject: AuditInfo,
    /// Domain of a mapping event (`None` is the default mapping)
    pub domain: Option<String>,
    /// Interface of a static mapping event
    pub netif: Option<IfIndex>,
    /// Address range involved
    pub address: Option<AddrMask>,
    /// Labeling protocol of the mapping (`unlbl` or `cipsov4`)
    pub protocol: Option<String>,
    /// CIPSO DOI of the mapping
    pub doi: Option<u32>,
    /// Security context of a static mapping
    pub secctx: Option<String>,
    /// New and old value of the accept-unlabeled flag
    pub accept: Option<(bool, bool)>,
    /// Whether the change was applied
    pub success: bool,
}

impl AuditEvent {
    /// Start a record of `kind` for `subject`.
    #[must_use]
    pub const fn new(kind: AuditKind, subject: AuditInfo) -> Self {
        Self {
            kind,
            subject,
            domain: None,
            netif: None,
            address: None,
            protocol: None,
            doi: None,
            secctx: None,
            accept: None,
            success: true,
        }
    }

    /// Set the domain.
    #[must_use]
    pub fn domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(str::to_string);
        self
    }

    /// Set the interface.
    #[must_use]
    pub const fn netif(mut self, netif: IfIndex) -> Self {
        self.netif = Some(netif);
        self
    }

    /// Set the address range.
    #[must_use]
    pub const fn address(mut self, address: AddrMask) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the protocol and DOI.
    #[must_use]
    pub fn protocol(mut self, protocol: &str, doi: Option<u32>) -> Self {
        self.protocol = Some(protocol.to_string());
        self.doi = doi;
        self
    }

    /// Set the security context.
    #[must_use]
    pub fn secctx(mut self, secctx: Option<String>) -> Self {
        self.secctx = secctx;
        self
    }

    /// Set the accept flag transition.
    #[must_use]
    pub const fn accept(mut self, new: bool, old: bool) -> Self {
        self.accept = Some((new, old));
        self
    }

    /// Set the result.
    #[must_use]
    pub const fn result(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(uid) = self.subject.uid {
            write!(f, " auid={uid}")?;
        }
        if let Some(pid) = self.subject.pid {
            write!(f, " pid={pid}")?;
        }
        if matches!(self.kind, AuditKind::MapAdd | AuditKind::MapDel) {
            write!(f, " nlbl_domain={}", self.domain.as_deref().unwrap_or("_"))?;
        }
        if let Some(netif) = self.netif {
            write!(f, " netif={netif}")?;
        }
        if let Some(address) = self.address {
            write!(
                f,
                " src={} src_prefixlen={}",
                address.addr(),
                address.prefix_len()
            )?;
        }
        if let Some(protocol) = &self.protocol {
            write!(f, " nlbl_protocol={protocol}")?;
        }
        if let Some(doi) = self.doi {
            write!(f, " cipso_doi={doi}")?;
        }
        if let Some(secctx) = &self.secctx {
            write!(f, " sec_obj={secctx}")?;
        }
        if let Some((new, old)) = self.accept {
            write!(f, " unlbl_accept={} old={}", u8::from(new), u8::from(old))?;
        }
        write!(f, " res={}", u8::from(self.success))
    }
}

/// Destination of audit records.
pub trait AuditSink: Send + Sync {
    /// Record one event.
    fn log(&self, event: AuditEvent);
}

/// Sink emitting structured `tracing` events with target `netlabel::audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, event: AuditEvent) {
        info!(
            target: "netlabel::audit",
            kind = %event.kind,
            success = event.success,
            "{}",
            event
        );
    }
}

/// Sink keeping every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Remove and return the recorded events.
    pub fn take(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl AuditSink for RecordingAuditSink {
    fn log(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
