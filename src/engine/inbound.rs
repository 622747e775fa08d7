//! Inbound attribute resolution
//!
//! A decoded IPv4 wire label always wins. Without one, the receiving
//! interface and source address select a static security identity; failing
//! that, the accept-unlabeled flag decides.

use std::net::IpAddr;

use tracing::debug;

use super::Netlabel;
use crate::addr::Family;
use crate::cipso::PacketView;
use crate::error::NetlabelError;
use crate::label::SecAttr;

impl Netlabel {
    /// Security attributes of a received packet.
    ///
    /// # Errors
    ///
    /// - `NoLabel` if nothing matches and unlabeled traffic is refused
    /// - `AddressFamilyUnsupported` for families other than IPv4/IPv6
    pub fn skbuff_getattr<P: PacketView>(
        &self,
        packet: &P,
        family: Family,
    ) -> Result<SecAttr, NetlabelError> {
        match family {
            Family::Inet => {
                if let Some(secattr) = self.codec.decode_label(packet) {
                    return Ok(secattr);
                }
                self.unlabel_getattr(packet.ifindex(), packet.source())
            }
            Family::Inet6 => self.unlabel_getattr(packet.ifindex(), packet.source()),
            Family::Other(_) => Err(NetlabelError::AddressFamilyUnsupported),
        }
    }

    /// Security attributes for unlabeled traffic from `source` received on
    /// `ifindex`.
    ///
    /// # Errors
    ///
    /// Returns `NoLabel` if no static mapping matches and unlabeled traffic
    /// is refused.
    pub fn unlabel_getattr(&self, ifindex: u32, source: IpAddr) -> Result<SecAttr, NetlabelError> {
        let secid = self
            .interfaces
            .get(ifindex)
            .and_then(|iface| iface.lookup(source));
        match secid {
            Some(secid) => Ok(SecAttr::unlabeled(Some(secid))),
            None if self.accept_unlabeled() => Ok(SecAttr::unlabeled(None)),
            None => {
                debug!(ifindex, %source, "Refusing unlabeled traffic");
                Err(NetlabelError::NoLabel)
            }
        }
    }

    /// Remember the attributes resolved for a packet's wire label.
    pub fn cache_add<P: PacketView>(&self, packet: &P, family: Family, secattr: &SecAttr) {
        if family == Family::Inet {
            self.codec.cache_add(packet, secattr);
        }
    }
}
