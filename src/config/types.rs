//! Configuration types for netlabeld
//!
//! This module defines all configuration structures used by the daemon.
//! Configuration is loaded from JSON files and validated at startup. The
//! mapping types double as the wire format of the control plane.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::addr::AddrMask;
use crate::cipso::DoiDefinition;
use crate::domain::DEFAULT_DOMAIN_BUCKETS;
use crate::error::ConfigError;
use crate::unlabeled::DEFAULT_INTERFACE_BUCKETS;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Hash table sizing
    #[serde(default)]
    pub tables: TableConfig,

    /// Accept unlabeled inbound traffic that matches no static mapping
    #[serde(default = "default_true")]
    pub accept_unlabeled: bool,

    /// IPC configuration
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// CIPSO DOI definitions registered at startup
    #[serde(default)]
    pub dois: Vec<DoiDefinition>,

    /// Security contexts known to the daemon
    #[serde(default)]
    pub contexts: Vec<String>,

    /// Fixed interface name to index map (empty: ask the system)
    #[serde(default)]
    pub devices: BTreeMap<String, u32>,

    /// Outbound domain mappings
    #[serde(default)]
    pub domains: Vec<DomainMapping>,

    /// Static unlabeled mappings
    #[serde(default)]
    pub static_labels: Vec<StaticMapping>,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tables.validate()?;
        self.ipc.validate()?;
        self.log.validate()?;

        let mut dois = HashSet::new();
        for def in &self.dois {
            if !dois.insert(def.doi) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate DOI definition: {}",
                    def.doi
                )));
            }
        }

        for mapping in &self.domains {
            mapping.validate()?;
            for doi in mapping.policy.dois() {
                if !dois.contains(&doi) {
                    return Err(ConfigError::ValidationError(format!(
                        "Domain '{}' references undefined DOI {doi}",
                        mapping.display_name()
                    )));
                }
            }
        }

        let contexts: HashSet<&str> = self.contexts.iter().map(String::as_str).collect();
        for mapping in &self.static_labels {
            if !contexts.contains(mapping.secctx.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Static mapping {} references unknown context '{}'",
                    mapping.address, mapping.secctx
                )));
            }
            if let Some(interface) = &mapping.interface {
                if interface.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "Static mapping interface name cannot be empty".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Create a minimal default configuration
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            tables: TableConfig::default(),
            accept_unlabeled: true,
            ipc: IpcConfig::default(),
            log: LogConfig::default(),
            dois: Vec::new(),
            contexts: Vec::new(),
            devices: BTreeMap::new(),
            domains: vec![DomainMapping::unlabeled(None)],
            static_labels: Vec::new(),
        }
    }
}

/// Hash table sizing
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TableConfig {
    /// Buckets of the domain table (power of two)
    #[serde(default = "default_domain_buckets")]
    pub domain_buckets: usize,

    /// Buckets of the interface table (power of two)
    #[serde(default = "default_interface_buckets")]
    pub interface_buckets: usize,
}

impl TableConfig {
    /// Validate table sizing
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, size) in [
            ("domain_buckets", self.domain_buckets),
            ("interface_buckets", self.interface_buckets),
        ] {
            if !size.is_power_of_two() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be a power of two, got {size}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            domain_buckets: DEFAULT_DOMAIN_BUCKETS,
            interface_buckets: DEFAULT_INTERFACE_BUCKETS,
        }
    }
}

/// IPC configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    /// Path to Unix socket
    pub socket_path: PathBuf,

    /// Socket file mode (octal, e.g., 0o660)
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Enable IPC server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl IpcConfig {
    /// Validate IPC configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "IPC socket path cannot be empty when IPC is enabled".into(),
            ));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/netlabeld.sock"),
            socket_mode: 0o660,
            enabled: true,
            max_message_size: 1024 * 1024, // 1MB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

impl LogConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.format.as_str(), "json" | "text") {
            return Err(ConfigError::ValidationError(format!(
                "Unknown log format '{}', expected json or text",
                self.format
            )));
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            target: true,
        }
    }
}

/// Labeling of one address range of an address-selective domain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeafConfig {
    /// Send unlabeled
    Unlabeled,
    /// CIPSO in the given DOI
    Cipso {
        /// DOI value
        doi: u32,
    },
}

/// One address range of an address-selective domain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AddressMapping {
    /// Peer address range (CIDR)
    pub address: AddrMask,

    /// Labeling for the range
    #[serde(flatten)]
    pub leaf: LeafConfig,
}

/// Policy of a domain mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Send unlabeled
    Unlabeled,
    /// CIPSO in the given DOI
    Cipso {
        /// DOI value
        doi: u32,
    },
    /// Choose by peer address
    AddressSelect {
        /// Address ranges
        addresses: Vec<AddressMapping>,
    },
}

impl PolicyConfig {
    /// Every DOI referenced by the policy.
    #[must_use]
    pub fn dois(&self) -> Vec<u32> {
        match self {
            Self::Unlabeled => Vec::new(),
            Self::Cipso { doi } => vec![*doi],
            Self::AddressSelect { addresses } => addresses
                .iter()
                .filter_map(|a| match a.leaf {
                    LeafConfig::Cipso { doi } => Some(doi),
                    LeafConfig::Unlabeled => None,
                })
                .collect(),
        }
    }
}

/// Outbound mapping of one domain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DomainMapping {
    /// Domain name; absent for the default mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Policy
    #[serde(flatten)]
    pub policy: PolicyConfig,
}

impl DomainMapping {
    /// Unlabeled mapping.
    #[must_use]
    pub fn unlabeled(domain: Option<&str>) -> Self {
        Self {
            domain: domain.map(str::to_string),
            policy: PolicyConfig::Unlabeled,
        }
    }

    /// CIPSO mapping.
    #[must_use]
    pub fn cipso(domain: Option<&str>, doi: u32) -> Self {
        Self {
            domain: domain.map(str::to_string),
            policy: PolicyConfig::Cipso { doi },
        }
    }

    /// Address-selective mapping.
    #[must_use]
    pub fn address_select(domain: Option<&str>, addresses: Vec<AddressMapping>) -> Self {
        Self {
            domain: domain.map(str::to_string),
            policy: PolicyConfig::AddressSelect { addresses },
        }
    }

    /// Domain name for messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.domain.as_deref().unwrap_or("<default>")
    }

    /// Validate the mapping
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.as_deref() == Some("") {
            return Err(ConfigError::ValidationError(
                "Domain name cannot be empty; omit it for the default mapping".into(),
            ));
        }
        if let PolicyConfig::AddressSelect { addresses } = &self.policy {
            if addresses.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Domain '{}' selects by address but lists no addresses",
                    self.display_name()
                )));
            }
        }
        Ok(())
    }
}

/// Static unlabeled mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticMapping {
    /// Interface name; absent for the default interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Source address range (CIDR)
    pub address: AddrMask,

    /// Security context assigned to matching traffic
    pub secctx: String,
}

const fn default_true() -> bool {
    true
}

const fn default_domain_buckets() -> usize {
    DEFAULT_DOMAIN_BUCKETS
}

const fn default_interface_buckets() -> usize {
    DEFAULT_INTERFACE_BUCKETS
}

const fn default_socket_mode() -> u32 {
    0o660
}

const fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}
