//! Table invariants
//!
//! Each test drives the public API through a sequence of operations and
//! checks an invariant that must hold after every step.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use netlabel::addr::{AddrMask, AddressRangeList};
use netlabel::audit::{AuditInfo, AuditKind, RecordingAuditSink};
use netlabel::config::{AddressMapping, DomainMapping, LeafConfig};
use netlabel::domain::{domain_hash, DomainTable, LeafKind};
use netlabel::error::NetlabelError;
use netlabel::rcu::TableLock;
use netlabel::unlabeled::IfIndex;

use super::common::Fixture;

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn subject() -> AuditInfo {
    AuditInfo::default()
}

// ============================================================================
// Hash stability
// ============================================================================

#[test]
fn hash_is_deterministic_and_in_range() {
    let names = [
        "",
        "a",
        "alice",
        "bob",
        "system_u:system_r:httpd_t",
        "ünïcödé",
        "a-very-long-domain-name-that-wraps-the-rotation-several-times-over",
    ];
    for size in [1usize, 2, 16, 128, 1024] {
        let table = DomainTable::new(size, Arc::new(RecordingAuditSink::new())).unwrap();
        for name in names {
            let h = table.hash(name);
            assert!(h < size, "hash({name:?}) = {h} out of range for {size}");
            assert_eq!(h, table.hash(name));
            assert_eq!(h, domain_hash(name) as usize & (size - 1));
        }
    }

    let mut gen = Lcg(7);
    let table = DomainTable::new(128, Arc::new(RecordingAuditSink::new())).unwrap();
    for _ in 0..1000 {
        let len = gen.below(40) as usize;
        let name: String = (0..len)
            .map(|_| char::from(b'a' + gen.below(26) as u8))
            .collect();
        assert!(table.hash(&name) < 128);
    }
}

#[test]
fn table_size_must_be_power_of_two() {
    for size in [0usize, 3, 100] {
        assert!(matches!(
            DomainTable::new(size, Arc::new(RecordingAuditSink::new())),
            Err(NetlabelError::Invalid(_))
        ));
    }
}

// ============================================================================
// At most one default
// ============================================================================

#[test]
fn at_most_one_default_after_any_sequence() {
    let fx = Fixture::new();
    let mut gen = Lcg(42);

    for step in 0..500 {
        let range: AddrMask = format!("10.{}.0.0/16", gen.below(4)).parse().unwrap();
        let _ = match gen.below(8) {
            0 => fx
                .netlabel
                .add_domain(&DomainMapping::unlabeled(None), &subject()),
            1 => fx
                .netlabel
                .add_domain(&DomainMapping::cipso(None, 7), &subject()),
            2 => fx.netlabel.remove_domain(None, &subject()),
            3 => fx.netlabel.add_domain_address(
                None,
                range,
                &LeafConfig::Unlabeled,
                &subject(),
            ),
            4 => fx.netlabel.remove_domain_address(None, range, &subject()),
            5 => fx.netlabel.add_static(None, range, "peer_t", &subject()),
            6 => fx.netlabel.remove_static(None, range, &subject()),
            _ => fx.netlabel.remove_static_default(&subject()),
        };

        let default_domains = fx
            .netlabel
            .domains()
            .list()
            .iter()
            .filter(|p| p.is_default())
            .count();
        assert!(
            default_domains <= 1,
            "step {step}: {default_domains} default domains"
        );

        let default_ifaces = fx
            .netlabel
            .interfaces()
            .list()
            .iter()
            .filter(|p| p.ifindex() == IfIndex::Default)
            .count();
        assert!(
            default_ifaces <= 1,
            "step {step}: {default_ifaces} default interfaces"
        );
    }
}

// ============================================================================
// Add / lookup / remove round trip
// ============================================================================

#[test]
fn range_list_round_trip() {
    let lock = TableLock::new();
    let list: AddressRangeList<Ipv4Addr, &str> = AddressRangeList::new();
    let a = Ipv4Addr::new(10, 1, 2, 3);
    let m24 = Ipv4Addr::new(255, 255, 255, 0);
    let m8 = Ipv4Addr::new(255, 0, 0, 0);

    {
        let guard = lock.lock();
        list.add(&guard, a, m24, "narrow").unwrap();
    }
    assert_eq!(list.lookup(a).map(|e| *e.policy()), Some("narrow"));

    {
        let guard = lock.lock();
        list.add(&guard, a, m8, "wide").unwrap();
        assert_eq!(
            list.add(&guard, Ipv4Addr::new(10, 1, 2, 99), m24, "dup").unwrap_err(),
            NetlabelError::AlreadyExists
        );
    }
    // The /24 is more specific and keeps winning.
    assert_eq!(list.lookup(a).map(|e| *e.policy()), Some("narrow"));

    {
        let guard = lock.lock();
        let removed = list.remove_exact(&guard, a, m24).unwrap();
        assert_eq!(*removed.policy(), "narrow");
        assert!(!removed.is_valid());
    }
    // Another entry still contains the address.
    assert_eq!(list.lookup(a).map(|e| *e.policy()), Some("wide"));

    {
        let guard = lock.lock();
        assert!(list.remove_exact(&guard, a, m8).is_some());
        assert!(list.remove_exact(&guard, a, m8).is_none());
    }
    assert!(list.lookup(a).is_none());
    assert!(list.is_empty());
}

#[test]
fn domain_round_trip_through_engine() {
    let fx = Fixture::new();
    let mut gen = Lcg(3);

    for _ in 0..50 {
        let octet = gen.below(200) + 1;
        let range: AddrMask = format!("172.{octet}.0.0/16").parse().unwrap();
        let peer: IpAddr = format!("172.{octet}.9.9").parse().unwrap();

        let leaf = LeafConfig::Cipso { doi: 7 };
        if fx
            .netlabel
            .add_domain_address(Some("carol"), range, &leaf, &subject())
            .is_err()
        {
            continue;
        }
        let leaf = fx.netlabel.domains().get_leaf(Some("carol"), Some(peer)).unwrap();
        assert!(matches!(leaf, LeafKind::Cipso(ref doi) if doi.doi() == 7));

        fx.netlabel
            .remove_domain_address(Some("carol"), range, &subject())
            .unwrap();
        assert!(fx
            .netlabel
            .domains()
            .get_leaf(Some("carol"), Some(peer))
            .is_err());
    }
    assert_eq!(fx.codec.refcount(7), Some(0));
}

// ============================================================================
// Merge atomicity
// ============================================================================

#[test]
fn failed_merge_leaves_table_unchanged() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain(
            &DomainMapping::address_select(
                Some("dave"),
                vec![
                    AddressMapping {
                        address: "10.0.0.0/24".parse().unwrap(),
                        leaf: LeafConfig::Cipso { doi: 7 },
                    },
                    AddressMapping {
                        address: "fd00::/8".parse().unwrap(),
                        leaf: LeafConfig::Unlabeled,
                    },
                ],
            ),
            &subject(),
        )
        .unwrap();

    let before = fx.netlabel.list_domains();
    let refs_before = fx.codec.refcount(7);
    fx.audit.take();

    // One new IPv4 range plus one duplicate IPv6 range.
    let result = fx.netlabel.add_domain(
        &DomainMapping::address_select(
            Some("dave"),
            vec![
                AddressMapping {
                    address: "192.168.0.0/16".parse().unwrap(),
                    leaf: LeafConfig::Cipso { doi: 7 },
                },
                AddressMapping {
                    address: "fd00::/8".parse().unwrap(),
                    leaf: LeafConfig::Cipso { doi: 7 },
                },
            ],
        ),
        &subject(),
    );
    assert_eq!(result, Err(NetlabelError::AlreadyExists));

    assert_eq!(fx.netlabel.list_domains(), before);
    assert_eq!(fx.codec.refcount(7), refs_before);
    assert!(fx
        .netlabel
        .domains()
        .get_leaf(Some("dave"), Some("192.168.1.1".parse().unwrap()))
        .is_err());

    let events = fx.audit.take();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.kind == AuditKind::MapAdd && !e.success));
}

#[test]
fn incompatible_kinds_do_not_merge() {
    let fx = Fixture::new();
    fx.netlabel
        .add_domain(&DomainMapping::cipso(Some("erin"), 7), &subject())
        .unwrap();
    let result = fx.netlabel.add_domain_address(
        Some("erin"),
        "10.0.0.0/8".parse().unwrap(),
        &LeafConfig::Unlabeled,
        &subject(),
    );
    assert!(matches!(result, Err(NetlabelError::Invalid(_))));
    assert_eq!(
        fx.netlabel.list_domains(),
        vec![DomainMapping::cipso(Some("erin"), 7)]
    );
}

// ============================================================================
// Conditional interface removal
// ============================================================================

#[test]
fn interface_removed_only_when_both_lists_empty() {
    let fx = Fixture::new();
    let v4: AddrMask = "10.0.0.0/8".parse().unwrap();
    let v6: AddrMask = "fd00::/8".parse().unwrap();
    let eth0 = IfIndex::Index(2);

    fx.netlabel
        .add_static(Some("eth0"), v4, "peer_t", &subject())
        .unwrap();
    fx.netlabel
        .add_static(Some("eth0"), v6, "peer_t", &subject())
        .unwrap();

    fx.netlabel
        .remove_static(Some("eth0"), v4, &subject())
        .unwrap();
    let iface = fx.netlabel.interfaces().get_exact(eth0).unwrap();
    assert_eq!(iface.len(), 1);

    // A failed removal never drops the policy.
    assert_eq!(
        fx.netlabel.remove_static(Some("eth0"), v4, &subject()),
        Err(NetlabelError::NotFound)
    );
    assert!(fx.netlabel.interfaces().get_exact(eth0).is_some());

    fx.netlabel
        .remove_static(Some("eth0"), v6, &subject())
        .unwrap();
    assert!(fx.netlabel.interfaces().get_exact(eth0).is_none());
    assert!(!iface.is_valid());
}

#[test]
fn default_interface_survives_until_removed_explicitly() {
    let fx = Fixture::new();
    let range: AddrMask = "0.0.0.0/0".parse().unwrap();

    fx.netlabel
        .add_static(None, range, "peer_t", &subject())
        .unwrap();
    fx.netlabel.remove_static(None, range, &subject()).unwrap();

    let default = fx.netlabel.interfaces().get_exact(IfIndex::Default).unwrap();
    assert!(default.is_empty());

    fx.netlabel.remove_static_default(&subject()).unwrap();
    let interfaces = fx.netlabel.interfaces();
    assert!(interfaces.get_exact(IfIndex::Default).is_none());
    assert_eq!(
        fx.netlabel.remove_static_default(&subject()),
        Err(NetlabelError::NotFound)
    );
}
