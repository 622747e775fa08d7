//! Inbound fallback policy types

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::addr::{AddrMask, AddressRangeList};
use crate::error::NetlabelError;
use crate::rcu::WriteGuard;
use crate::secid::SecId;

/// Interface a static mapping is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IfIndex {
    /// Applies to any interface without its own mapping
    Default,
    /// A specific interface index
    Index(u32),
}

impl IfIndex {
    /// Whether this is the default sentinel.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for IfIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl Serialize for IfIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Default => serializer.serialize_str("default"),
            Self::Index(index) => serializer.serialize_u32(*index),
        }
    }
}

impl<'de> Deserialize<'de> for IfIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(u32),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Index(index) => Ok(Self::Index(index)),
            Raw::Name(name) if name == "default" => Ok(Self::Default),
            Raw::Name(name) => Err(de::Error::custom(format!(
                "expected interface index or \"default\", got \"{name}\""
            ))),
        }
    }
}

/// Static unlabeled mappings of one interface.
pub struct InterfacePolicy {
    ifindex: IfIndex,
    v4: AddressRangeList<Ipv4Addr, SecId>,
    v6: AddressRangeList<Ipv6Addr, SecId>,
    valid: AtomicBool,
}

impl InterfacePolicy {
    /// Create an empty, unlinked policy.
    #[must_use]
    pub fn new(ifindex: IfIndex) -> Self {
        Self {
            ifindex,
            v4: AddressRangeList::new(),
            v6: AddressRangeList::new(),
            valid: AtomicBool::new(false),
        }
    }

    /// Interface this policy is bound to.
    #[must_use]
    pub const fn ifindex(&self) -> IfIndex {
        self.ifindex
    }

    /// Whether the policy is linked into a table.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Security identity for a source address.
    #[must_use]
    pub fn lookup(&self, source: IpAddr) -> Option<SecId> {
        match source {
            IpAddr::V4(ip) => self.v4.lookup(ip).map(|e| *e.policy()),
            IpAddr::V6(ip) => self.v6.lookup(ip).map(|e| *e.policy()),
        }
    }

    /// Snapshot of every mapping, IPv4 first.
    #[must_use]
    pub fn entries(&self) -> Vec<(AddrMask, SecId)> {
        let v4 = self.v4.entries().into_iter().map(|e| {
            let range = AddrMask::V4 {
                addr: e.addr(),
                mask: e.mask(),
            };
            (range, *e.policy())
        });
        let v6 = self.v6.entries().into_iter().map(|e| {
            let range = AddrMask::V6 {
                addr: e.addr(),
                mask: e.mask(),
            };
            (range, *e.policy())
        });
        v4.chain(v6).collect()
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Whether both address lists are empty.
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub(crate) fn add_unpublished(
        &mut self,
        range: AddrMask,
        secid: SecId,
    ) -> Result<(), NetlabelError> {
        match range {
            AddrMask::V4 { addr, mask } => self.v4.add_unpublished(addr, mask, secid),
            AddrMask::V6 { addr, mask } => self.v6.add_unpublished(addr, mask, secid),
        }
    }

    pub(crate) fn add(
        &self,
        guard: &WriteGuard<'_>,
        range: AddrMask,
        secid: SecId,
    ) -> Result<(), NetlabelError> {
        match range {
            AddrMask::V4 { addr, mask } => self.v4.add(guard, addr, mask, secid),
            AddrMask::V6 { addr, mask } => self.v6.add(guard, addr, mask, secid),
        }
    }

    pub(crate) fn remove(&self, guard: &WriteGuard<'_>, range: AddrMask) -> Option<SecId> {
        match range {
            AddrMask::V4 { addr, mask } => {
                self.v4.remove_exact(guard, addr, mask).map(|e| *e.policy())
            }
            AddrMask::V6 { addr, mask } => {
                self.v6.remove_exact(guard, addr, mask).map(|e| *e.policy())
            }
        }
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

impl fmt::Debug for InterfacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfacePolicy")
            .field("ifindex", &self.ifindex)
            .field("v4", &self.v4)
            .field("v6", &self.v6)
            .field("valid", &self.is_valid())
            .finish()
    }
}
