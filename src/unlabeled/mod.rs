//! Static security identities for unlabeled inbound traffic
//!
//! When a packet arrives without a wire label, the [`InterfaceTable`] maps its
//! receiving interface and source address to a security identity. Interfaces
//! without their own policy fall back to the [`IfIndex::Default`] policy.

mod table;
mod types;

pub use table::{InterfaceTable, DEFAULT_INTERFACE_BUCKETS};
pub use types::{IfIndex, InterfacePolicy};
