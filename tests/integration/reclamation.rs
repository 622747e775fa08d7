//! Reclamation under concurrent readers and writers
//!
//! Readers take no locks. A policy unlinked by a writer must stay intact
//! for every reader that already holds it, and its DOI reference must be
//! released exactly once, after the last such reader finishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netlabel::addr::Family;
use netlabel::audit::AuditInfo;
use netlabel::config::{DomainMapping, LeafConfig};
use netlabel::domain::{LeafKind, PolicyKind};
use netlabel::engine::{Packet, Socket};
use netlabel::error::NetlabelError;
use netlabel::label::{MlsAttr, SecAttr};

use super::common::Fixture;

const DOMAINS: [&str; 4] = ["alpha", "bravo", "charlie", "delta"];

#[test]
fn reader_keeps_removed_policy_alive() {
    let fx = Fixture::new();
    let subject = AuditInfo::default();
    fx.netlabel
        .add_domain(&DomainMapping::cipso(Some("alpha"), 7), &subject)
        .unwrap();
    assert_eq!(fx.codec.refcount(7), Some(1));

    let held = fx.netlabel.domains().get(Some("alpha")).unwrap();
    fx.netlabel
        .remove_domain(Some("alpha"), &AuditInfo::default())
        .unwrap();

    // Unlinked for new readers, still whole for this one.
    assert!(fx.netlabel.domains().get_exact(Some("alpha")).is_none());
    assert!(!held.is_valid());
    match held.kind() {
        PolicyKind::Cipso(doi) => assert_eq!(doi.handle().definition().doi, 7),
        other => panic!("unexpected policy kind {other:?}"),
    }
    assert_eq!(fx.codec.refcount(7), Some(1));

    drop(held);
    assert_eq!(fx.codec.refcount(7), Some(0));
}

#[test]
fn concurrent_readers_and_writers() {
    let fx = Fixture::new();
    let netlabel = Arc::new(fx.netlabel);
    let stop = Arc::new(AtomicBool::new(false));
    let lookups = Arc::new(AtomicU64::new(0));

    let readers: Vec<_> = (0..4)
        .map(|id| {
            let netlabel = Arc::clone(&netlabel);
            let stop = Arc::clone(&stop);
            let lookups = Arc::clone(&lookups);
            thread::spawn(move || {
                let mut n = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let domain = DOMAINS[(id + n) % DOMAINS.len()];
                    let peer = format!("10.{}.0.1", n % 4).parse().unwrap();
                    match netlabel.domains().get_leaf(Some(domain), Some(peer)) {
                        Ok(LeafKind::Cipso(doi)) => assert_eq!(doi.doi(), 7),
                        Ok(LeafKind::Unlabeled) | Err(NetlabelError::NoEntry) => {}
                        Err(e) => panic!("unexpected lookup error: {e}"),
                    }

                    let mut sock = Socket::new(Family::Inet);
                    let secattr =
                        SecAttr::for_domain(domain).with_mls(MlsAttr::new(1));
                    match netlabel.conn_setattr(&mut sock, peer, &secattr) {
                        Ok(()) | Err(NetlabelError::NoEntry) => {}
                        Err(e) => panic!("unexpected dispatch error: {e}"),
                    }

                    let packet = Packet::new(2, peer, "10.255.0.1".parse().unwrap());
                    let _ = netlabel.skbuff_getattr(&packet, Family::Inet);

                    n += 1;
                    lookups.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let writer = {
        let netlabel = Arc::clone(&netlabel);
        thread::spawn(move || {
            let subject = AuditInfo::default();
            for round in 0..300 {
                let domain = DOMAINS[round % DOMAINS.len()];
                let range = format!("10.{}.0.0/16", round % 4).parse().unwrap();
                let _ = netlabel.add_domain_address(
                    Some(domain),
                    range,
                    &LeafConfig::Cipso { doi: 7 },
                    &subject,
                );
                let _ = netlabel.add_domain(&DomainMapping::cipso(None, 7), &subject);
                let _ = netlabel.add_static(Some("eth0"), range, "peer_t", &subject);
                if round % 3 == 0 {
                    let _ = netlabel.remove_domain(Some(domain), &subject);
                    let _ = netlabel.remove_domain(None, &subject);
                } else {
                    let _ = netlabel.remove_domain_address(Some(domain), range, &subject);
                }
                let _ = netlabel.remove_static(Some("eth0"), range, &subject);
            }
        })
    };

    writer.join().unwrap();
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(lookups.load(Ordering::Relaxed) > 0);

    netlabel.shutdown();
    assert!(netlabel.domains().is_empty());
    assert_eq!(netlabel.interfaces().static_count(), 0);
    assert_eq!(fx.codec.refcount(7), Some(0));
}
