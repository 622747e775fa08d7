//! Outbound labeling
//!
//! Every entry point resolves the domain's policy (and, for address-selective
//! domains, the peer's leaf) and then either strips the target's label or has
//! the codec apply a CIPSO label. Only IPv4 is labeled; IPv6 targets are
//! accepted unchanged.

use std::net::IpAddr;

use tracing::{debug, trace};

use super::Netlabel;
use crate::addr::Family;
use crate::cipso::{ConnRequest, LabelTarget, PacketView};
use crate::domain::LeafKind;
use crate::error::NetlabelError;
use crate::label::SecAttr;

impl Netlabel {
    /// Resolve the leaf applying to traffic sent as `secattr.domain` to
    /// `peer`.
    ///
    /// # Errors
    ///
    /// Returns `NoEntry` when no policy or range resolves and
    /// `DestinationAddressRequired` for an address-selective domain without a
    /// peer.
    pub fn resolve_outbound(
        &self,
        secattr: &SecAttr,
        peer: Option<IpAddr>,
    ) -> Result<LeafKind, NetlabelError> {
        self.domains.get_leaf(secattr.domain.as_deref(), peer)
    }

    /// Resolve the policy for `peer` and apply it to `target`.
    ///
    /// # Errors
    ///
    /// Resolution errors as for [`Netlabel::resolve_outbound`]; codec errors
    /// are returned unchanged as `NetlabelError::Codec`.
    pub fn label_outbound(
        &self,
        target: &mut dyn LabelTarget,
        peer: Option<IpAddr>,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        let leaf = self.resolve_outbound(secattr, peer)?;
        self.apply_leaf(target, &leaf, secattr)
    }

    /// Label a socket before its peer is known.
    ///
    /// # Errors
    ///
    /// - `NoEntry` if the domain resolves to no policy
    /// - `DestinationAddressRequired` for an address-selective domain
    /// - `AddressFamilyUnsupported` for families other than IPv4/IPv6
    /// - codec errors
    pub fn sock_setattr(
        &self,
        sock: &mut dyn LabelTarget,
        family: Family,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        let policy = self.domains.get(secattr.domain.as_deref()).ok_or_else(|| {
            debug!(domain = ?secattr.domain, "No policy for socket domain");
            NetlabelError::NoEntry
        })?;
        match family {
            Family::Inet => {
                let leaf = policy.leaf_for(None)?;
                self.apply_leaf(sock, &leaf, secattr)
            }
            Family::Inet6 => {
                trace!("IPv6 socket left unlabeled");
                Ok(())
            }
            Family::Other(_) => Err(NetlabelError::AddressFamilyUnsupported),
        }
    }

    /// Label a socket connecting to `peer`.
    ///
    /// # Errors
    ///
    /// As for [`Netlabel::label_outbound`].
    pub fn conn_setattr(
        &self,
        sock: &mut dyn LabelTarget,
        peer: IpAddr,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        match Family::of(&peer) {
            Family::Inet => self.label_outbound(sock, Some(peer), secattr),
            _ => Ok(()),
        }
    }

    /// Label a connection request by its peer.
    ///
    /// # Errors
    ///
    /// As for [`Netlabel::label_outbound`].
    pub fn req_setattr<R: ConnRequest>(
        &self,
        req: &mut R,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        let peer = req.peer_addr();
        match Family::of(&peer) {
            Family::Inet => self.label_outbound(req, Some(peer), secattr),
            _ => Ok(()),
        }
    }

    /// Label an outgoing packet by its destination.
    ///
    /// # Errors
    ///
    /// As for [`Netlabel::label_outbound`], plus `AddressFamilyUnsupported`
    /// for families other than IPv4/IPv6.
    pub fn skbuff_setattr<P: PacketView>(
        &self,
        packet: &mut P,
        family: Family,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        match family {
            Family::Inet => {
                let peer = packet.destination();
                self.label_outbound(packet, Some(peer), secattr)
            }
            Family::Inet6 => Ok(()),
            Family::Other(_) => Err(NetlabelError::AddressFamilyUnsupported),
        }
    }

    /// Remove any label from a socket.
    pub fn sock_delattr(&self, sock: &mut dyn LabelTarget) {
        self.codec.strip_label(sock);
    }

    fn apply_leaf(
        &self,
        target: &mut dyn LabelTarget,
        leaf: &LeafKind,
        secattr: &SecAttr,
    ) -> Result<(), NetlabelError> {
        match leaf {
            LeafKind::Unlabeled => {
                self.codec.strip_label(target);
                Ok(())
            }
            LeafKind::Cipso(doi) => {
                trace!(doi = doi.doi(), kind = ?target.target_kind(), "Applying CIPSO label");
                self.codec
                    .apply_label(target, doi.handle(), secattr)
                    .map_err(NetlabelError::from)
            }
        }
    }
}
