//! Seeding a labeling context from configuration

use std::sync::Arc;

use tracing::info;

use super::types::Config;
use crate::audit::{AuditInfo, AuditSink, TracingAuditSink};
use crate::cipso::{CipsoCodec, MemoryCipso};
use crate::engine::Netlabel;
use crate::error::{ConfigError, NetlabeldError};
use crate::netdev::{NetDeviceResolver, StaticNetDevices, SystemNetDevices};
use crate::secid::MemorySecidRegistry;

/// Build a labeling context and load every configured mapping into it.
///
/// # Errors
///
/// Returns `NetlabeldError::Config` naming the first mapping that cannot be
/// applied.
pub fn build_netlabel(config: &Config) -> Result<Netlabel, NetlabeldError> {
    build_netlabel_with_audit(config, Arc::new(TracingAuditSink))
}

/// [`build_netlabel`] with an explicit audit sink.
///
/// # Errors
///
/// As for [`build_netlabel`].
pub fn build_netlabel_with_audit(
    config: &Config,
    audit: Arc<dyn AuditSink>,
) -> Result<Netlabel, NetlabeldError> {
    config.validate()?;

    let cipso = Arc::new(MemoryCipso::new());
    for def in &config.dois {
        cipso.doi_add(def.clone()).map_err(|e| {
            ConfigError::ValidationError(format!("DOI {}: {e}", def.doi))
        })?;
    }

    let secids = Arc::new(MemorySecidRegistry::new());
    for secctx in &config.contexts {
        secids.register(secctx);
    }

    let devices: Arc<dyn NetDeviceResolver> = if config.devices.is_empty() {
        Arc::new(SystemNetDevices)
    } else {
        Arc::new(
            config
                .devices
                .iter()
                .map(|(name, index)| (name.clone(), *index))
                .collect::<StaticNetDevices>(),
        )
    };

    let netlabel = Netlabel::builder()
        .domain_buckets(config.tables.domain_buckets)
        .interface_buckets(config.tables.interface_buckets)
        .accept_unlabeled(config.accept_unlabeled)
        .codec(cipso as Arc<dyn CipsoCodec>)
        .secids(secids)
        .devices(devices)
        .audit(audit)
        .build()?;

    let subject = AuditInfo::new(None, i32::try_from(std::process::id()).ok());
    for mapping in &config.domains {
        netlabel.add_domain(mapping, &subject).map_err(|e| {
            ConfigError::ValidationError(format!(
                "Domain mapping '{}': {e}",
                mapping.display_name()
            ))
        })?;
    }
    for mapping in &config.static_labels {
        netlabel
            .add_static(
                mapping.interface.as_deref(),
                mapping.address,
                &mapping.secctx,
                &subject,
            )
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Static mapping {} on {}: {e}",
                    mapping.address,
                    mapping.interface.as_deref().unwrap_or("default")
                ))
            })?;
    }

    info!(
        domains = config.domains.len(),
        static_labels = config.static_labels.len(),
        "Labeling tables seeded from configuration"
    );
    Ok(netlabel)
}
