//! Address handling for the policy tables
//!
//! This module provides:
//! - [`PrefixAddr`]: the per-family masking arithmetic (IPv4 and IPv6)
//! - [`AddrMask`]: a validated, already-masked `(address, mask)` pair
//! - [`AddressRangeList`]: an ordered list of address ranges with lock-free
//!   "first containing range" lookup
//!
//! # Example
//!
//! ```
//! use netlabel::addr::AddrMask;
//!
//! let range: AddrMask = "10.1.2.3/24".parse().unwrap();
//! assert_eq!(range.to_string(), "10.1.2.0/24");
//! assert!(range.contains("10.1.2.200".parse().unwrap()));
//! assert!(!range.contains("10.1.3.1".parse().unwrap()));
//! ```

mod list;

pub use list::{AddressEntry, AddressRangeList};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::NetlabelError;

/// Address family of a target or packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
    /// Any other protocol family (raw family number)
    Other(u16),
}

impl Family {
    /// Family of an IP address.
    #[must_use]
    pub const fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("inet"),
            Self::Inet6 => f.write_str("inet6"),
            Self::Other(n) => write!(f, "af{n}"),
        }
    }
}

/// Per-family masking arithmetic used by [`AddressRangeList`].
pub trait PrefixAddr: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Address length in bytes.
    const LEN: usize;

    /// Bitwise AND of the address with `mask`.
    #[must_use]
    fn apply_mask(self, mask: Self) -> Self;

    /// Number of set bits in `mask` (its prefix length when contiguous).
    fn mask_bits(mask: Self) -> u32;
}

impl PrefixAddr for Ipv4Addr {
    const LEN: usize = 4;

    fn apply_mask(self, mask: Self) -> Self {
        Self::from(u32::from(self) & u32::from(mask))
    }

    fn mask_bits(mask: Self) -> u32 {
        u32::from(mask).count_ones()
    }
}

impl PrefixAddr for Ipv6Addr {
    const LEN: usize = 16;

    fn apply_mask(self, mask: Self) -> Self {
        Self::from(u128::from(self) & u128::from(mask))
    }

    fn mask_bits(mask: Self) -> u32 {
        u128::from(mask).count_ones()
    }
}

/// A validated address range: the address is already masked and the mask is
/// a contiguous prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMask {
    /// IPv4 range
    V4 {
        /// Masked network address
        addr: Ipv4Addr,
        /// Network mask
        mask: Ipv4Addr,
    },
    /// IPv6 range
    V6 {
        /// Masked network address
        addr: Ipv6Addr,
        /// Network mask
        mask: Ipv6Addr,
    },
}

impl AddrMask {
    /// Build a range from raw address and mask bytes.
    ///
    /// This is the entry point for byte-level callers; the serde form
    /// `{"addr": [..], "mask": [..]}` used by the config file and the
    /// control socket goes through it.
    ///
    /// # Errors
    ///
    /// Returns `AddressFamilyUnsupported` for lengths other than 4 or 16
    /// bytes, and `Invalid` when the lengths differ or the mask is not a
    /// contiguous prefix.
    pub fn from_bytes(addr: &[u8], mask: &[u8]) -> Result<Self, NetlabelError> {
        if addr.len() != mask.len() {
            return Err(NetlabelError::invalid(format!(
                "address length {} does not match mask length {}",
                addr.len(),
                mask.len()
            )));
        }
        match addr.len() {
            4 => {
                let mut a = [0u8; 4];
                let mut m = [0u8; 4];
                a.copy_from_slice(addr);
                m.copy_from_slice(mask);
                Self::v4(Ipv4Addr::from(a), Ipv4Addr::from(m))
            }
            16 => {
                let mut a = [0u8; 16];
                let mut m = [0u8; 16];
                a.copy_from_slice(addr);
                m.copy_from_slice(mask);
                Self::v6(Ipv6Addr::from(a), Ipv6Addr::from(m))
            }
            _ => Err(NetlabelError::AddressFamilyUnsupported),
        }
    }

    /// Build an IPv4 range, masking the address.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the mask is not a contiguous prefix.
    pub fn v4(addr: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, NetlabelError> {
        let bits = u32::from(mask);
        if bits.leading_ones() != bits.count_ones() {
            return Err(NetlabelError::invalid(format!(
                "non-contiguous mask {mask}"
            )));
        }
        Ok(Self::V4 {
            addr: addr.apply_mask(mask),
            mask,
        })
    }

    /// Build an IPv6 range, masking the address.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the mask is not a contiguous prefix.
    pub fn v6(addr: Ipv6Addr, mask: Ipv6Addr) -> Result<Self, NetlabelError> {
        let bits = u128::from(mask);
        if bits.leading_ones() != bits.count_ones() {
            return Err(NetlabelError::invalid(format!(
                "non-contiguous mask {mask}"
            )));
        }
        Ok(Self::V6 {
            addr: addr.apply_mask(mask),
            mask,
        })
    }

    /// Range covering exactly one host.
    #[must_use]
    pub fn host(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(addr) => Self::V4 {
                addr,
                mask: Ipv4Addr::BROADCAST,
            },
            IpAddr::V6(addr) => Self::V6 {
                addr,
                mask: Ipv6Addr::from(u128::MAX),
            },
        }
    }

    /// Address family of the range.
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::V4 { .. } => Family::Inet,
            Self::V6 { .. } => Family::Inet6,
        }
    }

    /// Masked network address.
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        match *self {
            Self::V4 { addr, .. } => IpAddr::V4(addr),
            Self::V6 { addr, .. } => IpAddr::V6(addr),
        }
    }

    /// Prefix length of the mask.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        let bits = match *self {
            Self::V4 { mask, .. } => Ipv4Addr::mask_bits(mask),
            Self::V6 { mask, .. } => Ipv6Addr::mask_bits(mask),
        };
        // At most 128.
        u8::try_from(bits).unwrap_or(u8::MAX)
    }

    /// Check whether `ip` falls inside the range.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (*self, ip) {
            (Self::V4 { addr, mask }, IpAddr::V4(candidate)) => candidate.apply_mask(mask) == addr,
            (Self::V6 { addr, mask }, IpAddr::V6(candidate)) => candidate.apply_mask(mask) == addr,
            _ => false,
        }
    }

    /// Convert to an `ipnet` network.
    #[must_use]
    pub fn to_ipnet(&self) -> IpNet {
        let prefix = self.prefix_len();
        match *self {
            Self::V4 { addr, .. } => Ipv4Net::new(addr, prefix)
                .map_or_else(|_| IpNet::V4(Ipv4Net::from(addr)), IpNet::V4),
            Self::V6 { addr, .. } => Ipv6Net::new(addr, prefix)
                .map_or_else(|_| IpNet::V6(Ipv6Net::from(addr)), IpNet::V6),
        }
    }
}

impl From<IpNet> for AddrMask {
    fn from(net: IpNet) -> Self {
        match net {
            IpNet::V4(net) => Self::V4 {
                addr: net.network(),
                mask: net.netmask(),
            },
            IpNet::V6(net) => Self::V6 {
                addr: net.network(),
                mask: net.netmask(),
            },
        }
    }
}

impl FromStr for AddrMask {
    type Err = NetlabelError;

    /// Parse CIDR notation; a bare address is a host range.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(net) = s.parse::<IpNet>() {
            return Ok(Self::from(net));
        }
        s.parse::<IpAddr>()
            .map(Self::host)
            .map_err(|_| NetlabelError::invalid(format!("invalid address range '{s}'")))
    }
}

impl fmt::Display for AddrMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix_len())
    }
}

impl Serialize for AddrMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepted input forms: CIDR text, or raw address and mask bytes.
#[derive(Deserialize)]
#[serde(untagged)]
enum AddrMaskRepr {
    Cidr(String),
    Raw { addr: Vec<u8>, mask: Vec<u8> },
}

impl<'de> Deserialize<'de> for AddrMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AddrMaskRepr::deserialize(deserializer)? {
            AddrMaskRepr::Cidr(s) => s.parse().map_err(de::Error::custom),
            AddrMaskRepr::Raw { addr, mask } => {
                Self::from_bytes(&addr, &mask).map_err(de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_masks_address() {
        let range: AddrMask = "192.168.10.77/16".parse().unwrap();
        assert_eq!(range.addr(), "192.168.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(range.prefix_len(), 16);
        assert_eq!(range.family(), Family::Inet);
    }

    #[test]
    fn test_parse_bare_address_is_host() {
        let range: AddrMask = "2001:db8::1".parse().unwrap();
        assert_eq!(range.prefix_len(), 128);
        assert!(range.contains("2001:db8::1".parse().unwrap()));
        assert!(!range.contains("2001:db8::2".parse().unwrap()));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "not-an-address".parse::<AddrMask>(),
            Err(NetlabelError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_bytes_families() {
        let v4 = AddrMask::from_bytes(&[10, 0, 0, 9], &[255, 255, 255, 0]).unwrap();
        assert_eq!(v4.to_string(), "10.0.0.0/24");

        let mut mask = [0u8; 16];
        mask[..8].copy_from_slice(&[0xff; 8]);
        let mut addr = [0u8; 16];
        addr[0] = 0x20;
        addr[1] = 0x01;
        addr[15] = 0x42;
        let v6 = AddrMask::from_bytes(&addr, &mask).unwrap();
        assert_eq!(v6.prefix_len(), 64);
        assert_eq!(v6.family(), Family::Inet6);
    }

    #[test]
    fn test_from_bytes_rejects_other_lengths() {
        assert_eq!(
            AddrMask::from_bytes(&[1, 2, 3, 4, 5, 6], &[0xff; 6]),
            Err(NetlabelError::AddressFamilyUnsupported)
        );
        assert!(matches!(
            AddrMask::from_bytes(&[1, 2, 3, 4], &[0xff; 16]),
            Err(NetlabelError::Invalid(_))
        ));
    }

    #[test]
    fn test_deserialize_raw_bytes() {
        let range: AddrMask =
            serde_json::from_str(r#"{"addr": [10, 1, 2, 3], "mask": [255, 255, 0, 0]}"#).unwrap();
        assert_eq!(range, "10.1.0.0/16".parse().unwrap());

        let six = r#"{"addr": [1, 2, 3, 4, 5, 6], "mask": [255, 255, 255, 255, 255, 255]}"#;
        let err = serde_json::from_str::<AddrMask>(six).unwrap_err().to_string();
        let unsupported = NetlabelError::AddressFamilyUnsupported.to_string();
        assert!(err.contains(&unsupported));

        let text: AddrMask = serde_json::from_str(r#""fd00::/8""#).unwrap();
        assert_eq!(text.family(), Family::Inet6);
    }

    #[test]
    fn test_non_contiguous_mask_rejected() {
        let result = AddrMask::v4(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 255, 0));
        assert!(matches!(result, Err(NetlabelError::Invalid(_))));
    }

    #[test]
    fn test_cross_family_never_contains() {
        let range: AddrMask = "0.0.0.0/0".parse().unwrap();
        assert!(range.contains("8.8.8.8".parse().unwrap()));
        assert!(!range.contains("::1".parse().unwrap()));
    }

    #[test]
    fn test_ipnet_conversion() {
        let net: IpNet = "fd00::/8".parse().unwrap();
        let range = AddrMask::from(net);
        assert_eq!(range.to_ipnet(), net);
    }
}
