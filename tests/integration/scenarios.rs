//! End-to-end labeling scenarios
//!
//! - `scenario_a_*`: unlabeled domain strips the label
//! - `scenario_b_*`: address-selective domain labels by peer
//! - `scenario_c_*`: accept-unlabeled flag decides unmatched inbound traffic

use netlabel::addr::Family;
use netlabel::audit::{AuditInfo, AuditKind};
use netlabel::cipso::{CipsoCodec, LabelTarget};
use netlabel::config::{DomainMapping, LeafConfig};
use netlabel::engine::{ConnectionRequest, Packet, Socket};
use netlabel::error::NetlabelError;
use netlabel::label::{LabelType, MlsAttr, SecAttr};

use super::common::Fixture;

fn subject() -> AuditInfo {
    AuditInfo::new(Some(0), Some(100))
}

fn as_domain(domain: &str) -> SecAttr {
    SecAttr::for_domain(domain).with_mls(MlsAttr::new(3).with_categories([0, 12]))
}

// ============================================================================
// Scenario A
// ============================================================================

#[test]
fn scenario_a_unlabeled_domain_strips_label() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain(&DomainMapping::unlabeled(Some("alice")), &subject())
        .unwrap();

    let mut sock = Socket::new(Family::Inet);
    sock.set_label_option(Some(vec![134, 6, 0, 0, 0, 7]));

    fx.netlabel
        .sock_setattr(&mut sock, Family::Inet, &as_domain("alice"))
        .unwrap();
    assert!(sock.label_option().is_none());
    assert!(fx.codec.applied().is_empty());
}

#[test]
fn scenario_a_is_audited_once() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain(&DomainMapping::unlabeled(Some("alice")), &subject())
        .unwrap();

    let events = fx.audit.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditKind::MapAdd);
    assert_eq!(events[0].domain.as_deref(), Some("alice"));
    assert!(events[0].success);
}

// ============================================================================
// Scenario B
// ============================================================================

#[test]
fn scenario_b_address_select_labels_by_peer() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain_address(
            Some("bob"),
            "10.0.0.0/24".parse().unwrap(),
            &LeafConfig::Cipso { doi: 7 },
            &subject(),
        )
        .unwrap();

    let mut sock = Socket::new(Family::Inet);
    fx.netlabel
        .conn_setattr(&mut sock, "10.0.0.5".parse().unwrap(), &as_domain("bob"))
        .unwrap();
    assert_eq!(fx.codec.applied(), vec![7]);

    let decoded = fx.codec.decode_label(&sock).unwrap();
    assert_eq!(decoded.label_type, Some(LabelType::Cipso));
    assert_eq!(decoded.mls.map(|m| m.level), Some(3));

    let mut other = Socket::new(Family::Inet);
    let peer = "192.168.1.1".parse().unwrap();
    let result = fx.netlabel.conn_setattr(&mut other, peer, &as_domain("bob"));
    assert_eq!(result, Err(NetlabelError::NoEntry));
    assert_eq!(fx.codec.applied(), vec![7]);
}

#[test]
fn scenario_b_every_call_site_resolves_the_peer() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain_address(
            Some("bob"),
            "10.0.0.0/24".parse().unwrap(),
            &LeafConfig::Cipso { doi: 7 },
            &subject(),
        )
        .unwrap();
    fx.netlabel
        .add_domain_address(
            Some("bob"),
            "0.0.0.0/0".parse().unwrap(),
            &LeafConfig::Unlabeled,
            &subject(),
        )
        .unwrap();

    let mut req = ConnectionRequest::new("10.0.0.77".parse().unwrap());
    fx.netlabel.req_setattr(&mut req, &as_domain("bob")).unwrap();
    assert!(req.label_option().is_some());

    // The catch-all range is less specific, so it only applies outside /24.
    let mut packet = Packet::new(
        0,
        "10.0.0.1".parse().unwrap(),
        "172.16.5.5".parse().unwrap(),
    );
    packet.set_label_option(Some(vec![1]));
    fx.netlabel
        .skbuff_setattr(&mut packet, Family::Inet, &as_domain("bob"))
        .unwrap();
    assert!(packet.label_option().is_none());

    let mut sock = Socket::new(Family::Inet);
    let result = fx.netlabel.sock_setattr(&mut sock, Family::Inet, &as_domain("bob"));
    assert_eq!(result, Err(NetlabelError::DestinationAddressRequired));
    assert_eq!(fx.codec.applied(), vec![7]);
}

// ============================================================================
// Scenario C
// ============================================================================

#[test]
fn scenario_c_accept_flag_governs_unmatched_inbound() {
    let fx = Fixture::new();
    let packet = Packet::new(2, "10.0.0.9".parse().unwrap(), "10.0.0.1".parse().unwrap());

    fx.netlabel.set_accept_unlabeled(false, &subject());
    assert_eq!(
        fx.netlabel.skbuff_getattr(&packet, Family::Inet),
        Err(NetlabelError::NoLabel)
    );

    fx.netlabel.set_accept_unlabeled(true, &subject());
    let secattr = fx.netlabel.skbuff_getattr(&packet, Family::Inet).unwrap();
    assert_eq!(secattr.label_type, Some(LabelType::Unlabeled));
    assert!(secattr.secid.is_none());

    let flag_events: Vec<_> = fx
        .audit
        .events()
        .into_iter()
        .filter(|e| e.kind == AuditKind::AcceptUnlabeled)
        .collect();
    assert_eq!(flag_events.len(), 2);
    assert_eq!(flag_events[0].accept, Some((false, true)));
    assert_eq!(flag_events[1].accept, Some((true, false)));
}

#[test]
fn scenario_c_static_mapping_overrides_refusal() {
    let fx = Fixture::new();
    let peer = fx.secids.register("trusted_peer_t");
    fx.netlabel
        .add_static(
            Some("eth0"),
            "10.0.0.0/24".parse().unwrap(),
            "trusted_peer_t",
            &subject(),
        )
        .unwrap();
    fx.netlabel.set_accept_unlabeled(false, &subject());

    let packet = Packet::new(2, "10.0.0.9".parse().unwrap(), "10.0.0.1".parse().unwrap());
    let secattr = fx.netlabel.skbuff_getattr(&packet, Family::Inet).unwrap();
    assert_eq!(secattr.secid, Some(peer));

    // Same source on another interface is still refused.
    let elsewhere = Packet::new(3, "10.0.0.9".parse().unwrap(), "10.0.0.1".parse().unwrap());
    assert_eq!(
        fx.netlabel.skbuff_getattr(&elsewhere, Family::Inet),
        Err(NetlabelError::NoLabel)
    );
}
