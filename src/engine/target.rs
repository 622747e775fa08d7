//! Label carriers used by the dispatch entry points
//!
//! These hold nothing but the addressing the engine needs and the raw label
//! option the codec reads and writes.

use std::net::IpAddr;

use crate::addr::Family;
use crate::cipso::{ConnRequest, LabelTarget, PacketView, TargetKind};

/// A socket as seen by the labeling layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    family: Family,
    label: Option<Vec<u8>>,
}

impl Socket {
    /// Unlabeled socket of `family`.
    #[must_use]
    pub const fn new(family: Family) -> Self {
        Self {
            family,
            label: None,
        }
    }

    /// Protocol family of the socket.
    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }
}

impl LabelTarget for Socket {
    fn target_kind(&self) -> TargetKind {
        TargetKind::Socket
    }

    fn label_option(&self) -> Option<&[u8]> {
        self.label.as_deref()
    }

    fn set_label_option(&mut self, option: Option<Vec<u8>>) {
        self.label = option;
    }
}

/// An incoming connection request awaiting acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    peer: IpAddr,
    label: Option<Vec<u8>>,
}

impl ConnectionRequest {
    /// Request from `peer`.
    #[must_use]
    pub const fn new(peer: IpAddr) -> Self {
        Self { peer, label: None }
    }
}

impl LabelTarget for ConnectionRequest {
    fn target_kind(&self) -> TargetKind {
        TargetKind::Request
    }

    fn label_option(&self) -> Option<&[u8]> {
        self.label.as_deref()
    }

    fn set_label_option(&mut self, option: Option<Vec<u8>>) {
        self.label = option;
    }
}

impl ConnRequest for ConnectionRequest {
    fn peer_addr(&self) -> IpAddr {
        self.peer
    }
}

/// A single packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    ifindex: u32,
    source: IpAddr,
    destination: IpAddr,
    label: Option<Vec<u8>>,
}

impl Packet {
    /// Unlabeled packet received on `ifindex` (0 when locally generated).
    #[must_use]
    pub const fn new(ifindex: u32, source: IpAddr, destination: IpAddr) -> Self {
        Self {
            ifindex,
            source,
            destination,
            label: None,
        }
    }

    /// Attach a raw label option.
    #[must_use]
    pub fn with_label(mut self, option: Vec<u8>) -> Self {
        self.label = Some(option);
        self
    }

    /// Protocol family of the packet.
    #[must_use]
    pub const fn family(&self) -> Family {
        Family::of(&self.source)
    }
}

impl LabelTarget for Packet {
    fn target_kind(&self) -> TargetKind {
        TargetKind::Packet
    }

    fn label_option(&self) -> Option<&[u8]> {
        self.label.as_deref()
    }

    fn set_label_option(&mut self, option: Option<Vec<u8>>) {
        self.label = option;
    }
}

impl PacketView for Packet {
    fn ifindex(&self) -> u32 {
        self.ifindex
    }

    fn source(&self) -> IpAddr {
        self.source
    }

    fn destination(&self) -> IpAddr {
        self.destination
    }
}
