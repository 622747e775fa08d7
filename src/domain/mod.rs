//! Outbound labeling policy by domain
//!
//! A [`DomainTable`] answers "how should traffic sent as this domain be
//! labeled". Each [`DomainPolicy`] is either a direct policy (unlabeled or
//! CIPSO) or an [`AddressSelect`] choosing a leaf by peer address.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use netlabel::audit::{AuditInfo, TracingAuditSink};
//! use netlabel::domain::{AddressSelect, DomainPolicy, DomainTable, LeafKind};
//!
//! let table = DomainTable::new(128, Arc::new(TracingAuditSink)).unwrap();
//! let select = AddressSelect::new()
//!     .with("10.0.0.0/24".parse().unwrap(), LeafKind::Unlabeled)
//!     .unwrap();
//! table
//!     .add(DomainPolicy::address_select(Some("bob"), select), &AuditInfo::default())
//!     .unwrap();
//!
//! let leaf = table.get_leaf(Some("bob"), Some("10.0.0.5".parse().unwrap()));
//! assert_eq!(leaf, Ok(LeafKind::Unlabeled));
//! ```

mod table;
mod types;

pub use table::{domain_hash, DomainTable, DEFAULT_DOMAIN_BUCKETS};
pub use types::{AddressSelect, DomainPolicy, LeafKind, PolicyKind};
