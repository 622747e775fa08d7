//! netlabel: Network traffic labeling policy engine
//!
//! This crate decides how network traffic is labeled. Outbound, a security
//! domain (and for address-selective domains, the peer address) selects a
//! labeling policy: no label, or a CIPSO label in a given DOI. Inbound,
//! traffic that arrives without a wire label is given a security identity
//! from static per-interface mappings, or refused, depending on the
//! accept-unlabeled flag.
//!
//! # Features
//!
//! - **Lock-free lookups**: readers load `ArcSwap` snapshots; writers
//!   serialize on a per-table lock and publish by pointer swap
//! - **Address selection**: per-domain IPv4/IPv6 ranges, most specific first
//! - **Audited changes**: every add and remove emits an audit record
//! - **IPC Control**: Unix socket-based runtime administration
//!
//! # Architecture
//!
//! ```text
//! outbound: SecAttr.domain → DomainTable → leaf → CipsoCodec::apply_label
//!                                ↓
//!                        AddressSelect (peer)
//!
//! inbound:  packet → CipsoCodec::decode_label
//!                        ↓ (no label)
//!                  InterfaceTable (ifindex, source) → SecId | accept flag
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use netlabel::config::{build_netlabel, load_config};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/netlabeld/config.json")?;
//! let netlabel = build_netlabel(&config)?;
//! println!("labeling enabled: {}", netlabel.enabled());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`addr`]: Address ranges and the ordered range list
//! - [`audit`]: Audit records and sinks
//! - [`cipso`]: CIPSO codec interface and in-memory DOI registry
//! - [`config`]: Configuration types, loading and table seeding
//! - [`domain`]: Outbound domain mappings
//! - [`engine`]: The labeling context and its dispatch entry points
//! - [`error`]: Error types
//! - [`ipc`]: IPC server and protocol
//! - [`label`]: Security attributes
//! - [`netdev`]: Interface name resolution
//! - [`rcu`]: Snapshot lists and writer locks
//! - [`secid`]: Security identifier registry
//! - [`unlabeled`]: Static inbound mappings

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod addr;
pub mod audit;
pub mod cipso;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod label;
pub mod netdev;
pub mod rcu;
pub mod secid;
pub mod unlabeled;

// Re-export commonly used types at the crate root
pub use addr::{AddrMask, Family};
pub use audit::{AuditEvent, AuditInfo, AuditSink};
pub use cipso::{CipsoCodec, DoiDefinition, MemoryCipso};
pub use config::{Config, DomainMapping, StaticMapping};
pub use engine::{Netlabel, NetlabelBuilder, NetlabelStatus};
pub use error::{CodecError, ConfigError, IpcError, NetlabelError, NetlabeldError};
pub use ipc::{IpcClient, IpcCommand, IpcResponse, IpcServer};
pub use label::{LabelType, MlsAttr, SecAttr};
pub use secid::{MemorySecidRegistry, SecId, SecidRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
