//! Shared fixtures for the integration tests

use std::sync::Arc;

use parking_lot::Mutex;

use netlabel::audit::RecordingAuditSink;
use netlabel::cipso::{
    CipsoCodec, DoiDefinition, DoiHandle, LabelTarget, MemoryCipso,
};
use netlabel::engine::Netlabel;
use netlabel::error::CodecError;
use netlabel::label::SecAttr;
use netlabel::netdev::StaticNetDevices;
use netlabel::secid::MemorySecidRegistry;

/// Codec that forwards to [`MemoryCipso`] and remembers which DOI every
/// `apply_label` call used.
pub struct RecordingCodec {
    inner: MemoryCipso,
    applied: Mutex<Vec<u32>>,
}

impl RecordingCodec {
    pub fn new() -> Self {
        Self {
            inner: MemoryCipso::new(),
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn applied(&self) -> Vec<u32> {
        self.applied.lock().clone()
    }

    pub fn refcount(&self, doi: u32) -> Option<usize> {
        self.inner.refcount(doi)
    }
}

impl CipsoCodec for RecordingCodec {
    fn doi_add(&self, def: DoiDefinition) -> Result<(), CodecError> {
        self.inner.doi_add(def)
    }

    fn doi_remove(&self, doi: u32) -> Result<(), CodecError> {
        self.inner.doi_remove(doi)
    }

    fn doi_getdef(&self, doi: u32) -> Option<DoiHandle> {
        self.inner.doi_getdef(doi)
    }

    fn doi_putdef(&self, handle: &DoiHandle) {
        self.inner.doi_putdef(handle);
    }

    fn doi_list(&self) -> Vec<DoiDefinition> {
        self.inner.doi_list()
    }

    fn apply_label(
        &self,
        target: &mut dyn LabelTarget,
        doi: &DoiHandle,
        secattr: &SecAttr,
    ) -> Result<(), CodecError> {
        self.applied.lock().push(doi.doi());
        self.inner.apply_label(target, doi, secattr)
    }

    fn strip_label(&self, target: &mut dyn LabelTarget) {
        self.inner.strip_label(target);
    }

    fn decode_label(&self, packet: &dyn LabelTarget) -> Option<SecAttr> {
        self.inner.decode_label(packet)
    }

    fn cache_add(&self, packet: &dyn LabelTarget, secattr: &SecAttr) {
        self.inner.cache_add(packet, secattr);
    }
}

/// A labeling context with DOI 7 (pass) and 9 (local), the security context
/// `peer_t`, and the devices `eth0` (2) and `eth1` (3).
pub struct Fixture {
    pub netlabel: Netlabel,
    pub codec: Arc<RecordingCodec>,
    pub secids: Arc<MemorySecidRegistry>,
    pub audit: Arc<RecordingAuditSink>,
}

impl Fixture {
    pub fn new() -> Self {
        let codec = Arc::new(RecordingCodec::new());
        codec.doi_add(DoiDefinition::pass(7)).unwrap();
        codec.doi_add(DoiDefinition::local(9)).unwrap();

        let secids = Arc::new(MemorySecidRegistry::new());
        secids.register("peer_t");

        let audit = Arc::new(RecordingAuditSink::new());
        let devices = StaticNetDevices::new()
            .with_device("eth0", 2)
            .with_device("eth1", 3);

        let netlabel = Netlabel::builder()
            .codec(codec.clone())
            .secids(secids.clone())
            .devices(Arc::new(devices))
            .audit(audit.clone())
            .build()
            .unwrap();

        Self {
            netlabel,
            codec,
            secids,
            audit,
        }
    }
}
