//! Network interface name/index resolution
//!
//! Static mappings are configured by interface name but stored by index.
//! [`SystemNetDevices`] asks the host; [`StaticNetDevices`] is a fixed table
//! for configurations that describe interfaces which do not exist locally.

use std::collections::HashMap;
use std::ffi::{CStr, CString};

/// Translation between interface names and indices.
pub trait NetDeviceResolver: Send + Sync {
    /// Index of the named interface.
    fn index_of(&self, name: &str) -> Option<u32>;

    /// Name of the interface with this index.
    fn name_of(&self, ifindex: u32) -> Option<String>;
}

/// Resolver backed by `if_nametoindex(3)` and `if_indextoname(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetDevices;

impl NetDeviceResolver for SystemNetDevices {
    fn index_of(&self, name: &str) -> Option<u32> {
        let name = CString::new(name).ok()?;
        // SAFETY: `name` is a valid NUL-terminated string for the call.
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        (index != 0).then_some(index)
    }

    fn name_of(&self, ifindex: u32) -> Option<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        // SAFETY: `buf` holds IF_NAMESIZE bytes as the call requires.
        let ret = unsafe { libc::if_indextoname(ifindex, buf.as_mut_ptr()) };
        if ret.is_null() {
            return None;
        }
        // SAFETY: on success the buffer holds a NUL-terminated name.
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        name.to_str().ok().map(str::to_string)
    }
}

/// Resolver over a fixed name to index map.
#[derive(Debug, Default, Clone)]
pub struct StaticNetDevices {
    by_name: HashMap<String, u32>,
}

impl StaticNetDevices {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface.
    #[must_use]
    pub fn with_device(mut self, name: impl Into<String>, ifindex: u32) -> Self {
        self.by_name.insert(name.into(), ifindex);
        self
    }

    /// Number of known interfaces.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no interface is known.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FromIterator<(String, u32)> for StaticNetDevices {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            by_name: iter.into_iter().collect(),
        }
    }
}

impl NetDeviceResolver for StaticNetDevices {
    fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    fn name_of(&self, ifindex: u32) -> Option<String> {
        self.by_name
            .iter()
            .find(|(_, index)| **index == ifindex)
            .map(|(name, _)| name.clone())
    }
}
