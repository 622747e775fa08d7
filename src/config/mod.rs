//! Configuration module for netlabeld
//!
//! This module provides the daemon's configuration types, loading utilities
//! and the step that seeds a labeling context from a loaded configuration.
//!
//! # Example
//!
//! ```no_run
//! use netlabel::config::{build_netlabel, load_config};
//!
//! let config = load_config("/etc/netlabeld/config.json").unwrap();
//! let netlabel = build_netlabel(&config).unwrap();
//! println!("{} domain mappings", netlabel.domains().len());
//! ```

mod apply;
mod loader;
mod types;

pub use apply::{build_netlabel, build_netlabel_with_audit};
pub use loader::{
    apply_env_overrides, create_default_config, load_config, load_config_str,
    load_config_with_env,
};
pub use types::{
    AddressMapping, Config, DomainMapping, IpcConfig, LeafConfig, LogConfig, PolicyConfig,
    StaticMapping, TableConfig,
};
