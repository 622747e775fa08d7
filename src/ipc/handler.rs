//! IPC command handler
//!
//! This module processes IPC commands and generates responses. Every
//! mutating command runs with the audit identity of the connected peer.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::protocol::{
    ErrorCode, InboundResult, IpcCommand, IpcResponse, OutboundResult, ServerStatus,
};
use crate::addr::AddrMask;
use crate::audit::AuditInfo;
use crate::cipso::DoiDefinition;
use crate::config::{DomainMapping, LeafConfig, StaticMapping};
use crate::engine::Netlabel;
use crate::error::NetlabelError;
use crate::label::SecAttr;

/// IPC command handler
pub struct IpcHandler {
    /// Labeling context
    netlabel: Arc<Netlabel>,

    /// Server start time
    start_time: Instant,

    /// Server version
    version: String,
}

impl IpcHandler {
    /// Create a new IPC handler
    pub fn new(netlabel: Arc<Netlabel>) -> Self {
        Self {
            netlabel,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The labeling context commands operate on
    pub fn netlabel(&self) -> &Arc<Netlabel> {
        &self.netlabel
    }

    /// Handle an IPC command and return a response
    pub fn handle(&self, command: IpcCommand, subject: &AuditInfo) -> IpcResponse {
        debug!("Handling IPC command: {:?}", command);

        match command {
            IpcCommand::Ping => IpcResponse::Pong,

            IpcCommand::Version => IpcResponse::Version {
                version: self.version.clone(),
            },

            IpcCommand::Status => self.handle_status(),

            IpcCommand::Protocols => IpcResponse::Protocols {
                protocols: self.netlabel.protocols(),
            },

            IpcCommand::AddDomain { mapping } => self.handle_add_domain(&mapping, subject),

            IpcCommand::AddDomainAddress {
                domain,
                address,
                leaf,
            } => self.handle_add_domain_address(domain.as_deref(), address, &leaf, subject),

            IpcCommand::RemoveDomain { domain } => {
                self.handle_remove_domain(domain.as_deref(), subject)
            }

            IpcCommand::RemoveDomainAddress { domain, address } => {
                self.handle_remove_domain_address(domain.as_deref(), address, subject)
            }

            IpcCommand::ListDomains => IpcResponse::DomainList {
                domains: self.netlabel.list_domains(),
            },

            IpcCommand::AddStatic { mapping } => self.handle_add_static(&mapping, subject),

            IpcCommand::RemoveStatic { interface, address } => {
                self.handle_remove_static(interface.as_deref(), address, subject)
            }

            IpcCommand::RemoveStaticDefault => {
                match self.netlabel.remove_static_default(subject) {
                    Ok(()) => IpcResponse::success_with_message("Default static mappings removed"),
                    Err(e) => e.into(),
                }
            }

            IpcCommand::ListStatic => IpcResponse::StaticList {
                mappings: self.netlabel.list_static(),
            },

            IpcCommand::GetAcceptUnlabeled => IpcResponse::AcceptUnlabeled {
                accept: self.netlabel.accept_unlabeled(),
            },

            IpcCommand::SetAcceptUnlabeled { accept } => {
                self.netlabel.set_accept_unlabeled(accept, subject);
                IpcResponse::AcceptUnlabeled { accept }
            }

            IpcCommand::NotifyInterfaceDown { ifindex } => self.handle_interface_down(ifindex),

            IpcCommand::AddDoi { definition } => self.handle_add_doi(definition),

            IpcCommand::RemoveDoi { doi } => self.handle_remove_doi(doi),

            IpcCommand::TestOutbound { domain, peer } => self.handle_test_outbound(domain, peer),

            IpcCommand::TestInbound { ifindex, source } => {
                self.handle_test_inbound(ifindex, source)
            }

            IpcCommand::Shutdown => {
                // The server stops accepting once this response is written.
                info!("Shutdown requested over IPC");
                IpcResponse::success_with_message("Shutdown initiated")
            }
        }
    }

    /// Handle status command
    fn handle_status(&self) -> IpcResponse {
        IpcResponse::Status(ServerStatus {
            version: self.version.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            netlabel: self.netlabel.status(),
        })
    }

    fn handle_add_domain(&self, mapping: &DomainMapping, subject: &AuditInfo) -> IpcResponse {
        if let Err(e) = mapping.validate() {
            return IpcResponse::error(ErrorCode::InvalidParameters, e.to_string());
        }
        match self.netlabel.add_domain(mapping, subject) {
            Ok(()) => IpcResponse::success_with_message(format!(
                "Domain mapping '{}' added",
                mapping.display_name()
            )),
            Err(e) => {
                warn!(
                    "Failed to add domain mapping '{}': {}",
                    mapping.display_name(),
                    e
                );
                e.into()
            }
        }
    }

    fn handle_add_domain_address(
        &self,
        domain: Option<&str>,
        address: AddrMask,
        leaf: &LeafConfig,
        subject: &AuditInfo,
    ) -> IpcResponse {
        match self
            .netlabel
            .add_domain_address(domain, address, leaf, subject)
        {
            Ok(()) => IpcResponse::success_with_message(format!(
                "Address {} added to '{}'",
                address,
                domain.unwrap_or("default")
            )),
            Err(e) => e.into(),
        }
    }

    fn handle_remove_domain(&self, domain: Option<&str>, subject: &AuditInfo) -> IpcResponse {
        match self.netlabel.remove_domain(domain, subject) {
            Ok(()) => IpcResponse::success_with_message(format!(
                "Domain mapping '{}' removed",
                domain.unwrap_or("default")
            )),
            Err(e) => e.into(),
        }
    }

    fn handle_remove_domain_address(
        &self,
        domain: Option<&str>,
        address: AddrMask,
        subject: &AuditInfo,
    ) -> IpcResponse {
        match self
            .netlabel
            .remove_domain_address(domain, address, subject)
        {
            Ok(()) => IpcResponse::success_with_message(format!(
                "Address {} removed from '{}'",
                address,
                domain.unwrap_or("default")
            )),
            Err(e) => e.into(),
        }
    }

    fn handle_add_static(&self, mapping: &StaticMapping, subject: &AuditInfo) -> IpcResponse {
        match self.netlabel.add_static(
            mapping.interface.as_deref(),
            mapping.address,
            &mapping.secctx,
            subject,
        ) {
            Ok(()) => IpcResponse::success(),
            Err(e) => {
                warn!(
                    "Failed to add static mapping {} on {}: {}",
                    mapping.address,
                    mapping.interface.as_deref().unwrap_or("default"),
                    e
                );
                e.into()
            }
        }
    }

    fn handle_remove_static(
        &self,
        interface: Option<&str>,
        address: AddrMask,
        subject: &AuditInfo,
    ) -> IpcResponse {
        match self.netlabel.remove_static(interface, address, subject) {
            Ok(()) => IpcResponse::success(),
            Err(e) => e.into(),
        }
    }

    fn handle_interface_down(&self, ifindex: u32) -> IpcResponse {
        if self.netlabel.netdev_down(ifindex) {
            IpcResponse::success_with_message(format!(
                "Static mappings of interface {ifindex} removed"
            ))
        } else {
            IpcResponse::success_with_message(format!(
                "Interface {ifindex} had no static mappings"
            ))
        }
    }

    fn handle_add_doi(&self, definition: DoiDefinition) -> IpcResponse {
        let doi = definition.doi;
        match self.netlabel.codec().doi_add(definition) {
            Ok(()) => {
                info!("Registered DOI {}", doi);
                IpcResponse::success_with_message(format!("DOI {doi} registered"))
            }
            Err(e) => NetlabelError::from(e).into(),
        }
    }

    fn handle_remove_doi(&self, doi: u32) -> IpcResponse {
        match self.netlabel.codec().doi_remove(doi) {
            Ok(()) => {
                info!("Unregistered DOI {}", doi);
                IpcResponse::success_with_message(format!("DOI {doi} unregistered"))
            }
            Err(e) => NetlabelError::from(e).into(),
        }
    }

    /// Resolve the outbound leaf without labeling anything
    fn handle_test_outbound(&self, domain: Option<String>, peer: Option<IpAddr>) -> IpcResponse {
        let secattr = SecAttr {
            domain,
            ..SecAttr::default()
        };
        match self.netlabel.resolve_outbound(&secattr, peer) {
            Ok(leaf) => IpcResponse::OutboundResult(OutboundResult {
                label_type: leaf.label_type(),
                doi: leaf.doi(),
            }),
            Err(e) => e.into(),
        }
    }

    fn handle_test_inbound(&self, ifindex: u32, source: IpAddr) -> IpcResponse {
        match self.netlabel.unlabel_getattr(ifindex, source) {
            Ok(secattr) => {
                let secctx = secattr
                    .secid
                    .and_then(|secid| self.netlabel.secids().secid_to_secctx(secid));
                IpcResponse::InboundResult(InboundResult { secattr, secctx })
            }
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipso::{CipsoCodec, MemoryCipso};
    use crate::config::AddressMapping;
    use crate::label::LabelType;
    use crate::netdev::StaticNetDevices;
    use crate::secid::MemorySecidRegistry;

    fn create_test_handler() -> IpcHandler {
        let cipso = Arc::new(MemoryCipso::new());
        cipso.doi_add(DoiDefinition::pass(7)).unwrap();
        let secids = Arc::new(MemorySecidRegistry::new());
        secids.register("peer_t");
        let netlabel = Netlabel::builder()
            .codec(cipso)
            .secids(secids)
            .devices(Arc::new(StaticNetDevices::new().with_device("eth0", 2)))
            .build()
            .unwrap();
        IpcHandler::new(Arc::new(netlabel))
    }

    fn subject() -> AuditInfo {
        AuditInfo::new(Some(0), Some(4242))
    }

    fn expect_error(response: IpcResponse, code: ErrorCode) {
        match response {
            IpcResponse::Error(err) => assert_eq!(err.code, code, "{}", err.message),
            other => panic!("Expected {code:?} error, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_version_protocols() {
        let handler = create_test_handler();
        assert!(matches!(
            handler.handle(IpcCommand::Ping, &subject()),
            IpcResponse::Pong
        ));
        match handler.handle(IpcCommand::Version, &subject()) {
            IpcResponse::Version { version } => assert_eq!(version, env!("CARGO_PKG_VERSION")),
            other => panic!("Expected Version, got {other:?}"),
        }
        match handler.handle(IpcCommand::Protocols, &subject()) {
            IpcResponse::Protocols { protocols } => {
                assert_eq!(protocols, vec![LabelType::Unlabeled, LabelType::Cipso]);
            }
            other => panic!("Expected Protocols, got {other:?}"),
        }
    }

    #[test]
    fn test_domain_lifecycle() {
        let handler = create_test_handler();
        let mapping = DomainMapping::address_select(
            Some("bob"),
            vec![AddressMapping {
                address: "10.0.0.0/24".parse().unwrap(),
                leaf: LeafConfig::Cipso { doi: 7 },
            }],
        );
        let resp = handler.handle(IpcCommand::AddDomain { mapping }, &subject());
        assert!(!resp.is_error(), "{resp:?}");

        match handler.handle(
            IpcCommand::TestOutbound {
                domain: Some("bob".into()),
                peer: Some("10.0.0.9".parse().unwrap()),
            },
            &subject(),
        ) {
            IpcResponse::OutboundResult(result) => {
                assert_eq!(result.label_type, LabelType::Cipso);
                assert_eq!(result.doi, Some(7));
            }
            other => panic!("Expected OutboundResult, got {other:?}"),
        }

        expect_error(
            handler.handle(
                IpcCommand::TestOutbound {
                    domain: Some("bob".into()),
                    peer: None,
                },
                &subject(),
            ),
            ErrorCode::DestinationAddressRequired,
        );

        let resp = handler.handle(
            IpcCommand::RemoveDomainAddress {
                domain: Some("bob".into()),
                address: "10.0.0.0/24".parse().unwrap(),
            },
            &subject(),
        );
        assert!(!resp.is_error(), "{resp:?}");

        match handler.handle(IpcCommand::ListDomains, &subject()) {
            IpcResponse::DomainList { domains } => assert!(domains.is_empty()),
            other => panic!("Expected DomainList, got {other:?}"),
        }
    }

    #[test]
    fn test_add_domain_errors() {
        let handler = create_test_handler();
        expect_error(
            handler.handle(
                IpcCommand::AddDomain {
                    mapping: DomainMapping::cipso(Some("x"), 99),
                },
                &subject(),
            ),
            ErrorCode::InvalidParameters,
        );

        let mapping = DomainMapping::unlabeled(Some("alice"));
        let first = IpcCommand::AddDomain {
            mapping: mapping.clone(),
        };
        assert!(!handler.handle(first, &subject()).is_error());
        expect_error(
            handler.handle(IpcCommand::AddDomain { mapping }, &subject()),
            ErrorCode::InvalidParameters,
        );
        expect_error(
            handler.handle(
                IpcCommand::RemoveDomain {
                    domain: Some("nobody".into()),
                },
                &subject(),
            ),
            ErrorCode::NotFound,
        );
    }

    #[test]
    fn test_static_and_inbound() {
        let handler = create_test_handler();
        let mapping = StaticMapping {
            interface: Some("eth0".into()),
            address: "192.168.0.0/16".parse().unwrap(),
            secctx: "peer_t".into(),
        };
        assert!(!handler
            .handle(IpcCommand::AddStatic { mapping }, &subject())
            .is_error());

        match handler.handle(
            IpcCommand::TestInbound {
                ifindex: 2,
                source: "192.168.4.4".parse().unwrap(),
            },
            &subject(),
        ) {
            IpcResponse::InboundResult(result) => {
                assert_eq!(result.secctx.as_deref(), Some("peer_t"));
                assert!(result.secattr.is_unlabeled());
            }
            other => panic!("Expected InboundResult, got {other:?}"),
        }

        match handler.handle(IpcCommand::ListStatic, &subject()) {
            IpcResponse::StaticList { mappings } => {
                assert_eq!(mappings.len(), 1);
                assert_eq!(mappings[0].interface.as_deref(), Some("eth0"));
            }
            other => panic!("Expected StaticList, got {other:?}"),
        }

        expect_error(
            handler.handle(
                IpcCommand::AddStatic {
                    mapping: StaticMapping {
                        interface: Some("wlan7".into()),
                        address: "10.0.0.0/8".parse().unwrap(),
                        secctx: "peer_t".into(),
                    },
                },
                &subject(),
            ),
            ErrorCode::NoDevice,
        );

        assert!(!handler
            .handle(IpcCommand::NotifyInterfaceDown { ifindex: 2 }, &subject())
            .is_error());
        assert_eq!(handler.netlabel().interfaces().static_count(), 0);
    }

    #[test]
    fn test_accept_flag_round_trip() {
        let handler = create_test_handler();
        handler.handle(IpcCommand::SetAcceptUnlabeled { accept: false }, &subject());
        match handler.handle(IpcCommand::GetAcceptUnlabeled, &subject()) {
            IpcResponse::AcceptUnlabeled { accept } => assert!(!accept),
            other => panic!("Expected AcceptUnlabeled, got {other:?}"),
        }
        expect_error(
            handler.handle(
                IpcCommand::TestInbound {
                    ifindex: 9,
                    source: "10.9.9.9".parse().unwrap(),
                },
                &subject(),
            ),
            ErrorCode::NoLabel,
        );
    }

    #[test]
    fn test_doi_commands() {
        let handler = create_test_handler();
        expect_error(
            handler.handle(
                IpcCommand::AddDoi {
                    definition: DoiDefinition::pass(7),
                },
                &subject(),
            ),
            ErrorCode::AlreadyExists,
        );
        assert!(!handler
            .handle(
                IpcCommand::AddDoi {
                    definition: DoiDefinition::local(9),
                },
                &subject()
            )
            .is_error());

        handler.handle(
            IpcCommand::AddDomain {
                mapping: DomainMapping::cipso(Some("carol"), 9),
            },
            &subject(),
        );
        expect_error(
            handler.handle(IpcCommand::RemoveDoi { doi: 9 }, &subject()),
            ErrorCode::OperationFailed,
        );
        handler.handle(
            IpcCommand::RemoveDomain {
                domain: Some("carol".into()),
            },
            &subject(),
        );
        assert!(!handler
            .handle(IpcCommand::RemoveDoi { doi: 9 }, &subject())
            .is_error());
        expect_error(
            handler.handle(IpcCommand::RemoveDoi { doi: 9 }, &subject()),
            ErrorCode::NotFound,
        );
    }

    #[test]
    fn test_status() {
        let handler = create_test_handler();
        match handler.handle(IpcCommand::Status, &subject()) {
            IpcResponse::Status(status) => {
                assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
                assert_eq!(status.netlabel.dois, vec![7]);
                assert!(!status.netlabel.enabled);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }
}
