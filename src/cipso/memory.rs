//! In-memory CIPSO codec
//!
//! Option layout produced and accepted here:
//!
//! ```text
//! +------+-----+-----------+------------------------------+
//! | 134  | len | DOI (BE)  | tag                          |
//! +------+-----+-----------+------------------------------+
//!
//! tag 1   (restricted bitmap): 1, len, 0, level, bitmap...
//! tag 128 (local):             128, 6, secid (BE)
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{CipsoCodec, DoiDefinition, DoiHandle, DoiMapType, LabelTarget};
use crate::error::CodecError;
use crate::label::{LabelType, MlsAttr, SecAttr};
use crate::secid::SecId;

/// IP option type of CIPSO.
pub const CIPSO_OPTION_TYPE: u8 = 134;

/// Maximum number of cached decoded labels before the cache is flushed.
pub const LABEL_CACHE_SIZE: usize = 256;

const HDR_LEN: usize = 6;
const TAG_RBM: u8 = 1;
const TAG_LOCAL: u8 = 128;
const TAG_RBM_HDR_LEN: usize = 4;
const TAG_LOCAL_LEN: usize = 6;
const MAX_OPTION_LEN: usize = 40;
const MAX_BITMAP_LEN: usize = MAX_OPTION_LEN - HDR_LEN - TAG_RBM_HDR_LEN;

struct DoiSlot {
    def: Arc<DoiDefinition>,
    refs: AtomicUsize,
}

/// In-memory DOI registry and codec.
pub struct MemoryCipso {
    dois: DashMap<u32, DoiSlot>,
    cache: DashMap<Vec<u8>, SecAttr>,
}

impl MemoryCipso {
    /// Create a codec with no registered DOIs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dois: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Outstanding references on a DOI, `None` if it is not registered.
    pub fn refcount(&self, doi: u32) -> Option<usize> {
        self.dois
            .get(&doi)
            .map(|slot| slot.refs.load(Ordering::SeqCst))
    }

    /// Number of cached labels.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn encode(def: &DoiDefinition, secattr: &SecAttr) -> Result<Vec<u8>, CodecError> {
        let tag = match def.map_type {
            DoiMapType::Pass => {
                let mls = secattr.mls.as_ref().ok_or_else(|| {
                    CodecError::InvalidAttributes("no MLS attributes to encode".into())
                })?;
                encode_rbm(mls)?
            }
            DoiMapType::Local => {
                let secid = secattr.secid.ok_or_else(|| {
                    CodecError::InvalidAttributes("no security identifier to encode".into())
                })?;
                let mut tag = vec![TAG_LOCAL, len_byte(TAG_LOCAL_LEN)];
                tag.extend_from_slice(&secid.0.to_be_bytes());
                tag
            }
        };

        let mut option = Vec::with_capacity(HDR_LEN + tag.len());
        option.push(CIPSO_OPTION_TYPE);
        option.push(len_byte(HDR_LEN + tag.len()));
        option.extend_from_slice(&def.doi.to_be_bytes());
        option.extend_from_slice(&tag);
        Ok(option)
    }

    fn decode(&self, option: &[u8]) -> Result<SecAttr, CodecError> {
        if option.len() < HDR_LEN + 2 || option[0] != CIPSO_OPTION_TYPE {
            return Err(CodecError::Malformed("not a CIPSO option".into()));
        }
        if usize::from(option[1]) != option.len() {
            return Err(CodecError::Malformed(format!(
                "length field {} does not match option length {}",
                option[1],
                option.len()
            )));
        }
        let doi = u32::from_be_bytes([option[2], option[3], option[4], option[5]]);
        if !self.dois.contains_key(&doi) {
            return Err(CodecError::UnknownDoi(doi));
        }

        let tag = &option[HDR_LEN..];
        if usize::from(tag[1]) != tag.len() {
            return Err(CodecError::Malformed("tag length mismatch".into()));
        }
        let mut secattr = SecAttr {
            label_type: Some(LabelType::Cipso),
            ..SecAttr::default()
        };
        match tag[0] {
            TAG_RBM if tag.len() >= TAG_RBM_HDR_LEN => {
                secattr.mls = Some(decode_rbm(tag[3], &tag[TAG_RBM_HDR_LEN..]));
            }
            TAG_LOCAL if tag.len() == TAG_LOCAL_LEN => {
                secattr.secid = Some(SecId(u32::from_be_bytes([tag[2], tag[3], tag[4], tag[5]])));
            }
            other => {
                return Err(CodecError::Malformed(format!("unsupported tag {other}")));
            }
        }
        Ok(secattr)
    }
}

impl Default for MemoryCipso {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCipso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCipso")
            .field("dois", &self.dois.len())
            .field("cached_labels", &self.cache.len())
            .finish()
    }
}

impl CipsoCodec for MemoryCipso {
    fn doi_add(&self, def: DoiDefinition) -> Result<(), CodecError> {
        let doi = def.doi;
        match self.dois.entry(doi) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CodecError::DoiExists(doi)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(DoiSlot {
                    def: Arc::new(def),
                    refs: AtomicUsize::new(0),
                });
                debug!(doi, "CIPSO DOI registered");
                Ok(())
            }
        }
    }

    fn doi_remove(&self, doi: u32) -> Result<(), CodecError> {
        let removed = self
            .dois
            .remove_if(&doi, |_, slot| slot.refs.load(Ordering::SeqCst) == 0);
        if removed.is_some() {
            self.cache.clear();
            debug!(doi, "CIPSO DOI removed");
            return Ok(());
        }
        if self.dois.contains_key(&doi) {
            Err(CodecError::DoiInUse(doi))
        } else {
            Err(CodecError::UnknownDoi(doi))
        }
    }

    fn doi_getdef(&self, doi: u32) -> Option<DoiHandle> {
        let slot = self.dois.get(&doi)?;
        slot.refs.fetch_add(1, Ordering::SeqCst);
        Some(DoiHandle::new(Arc::clone(&slot.def)))
    }

    fn doi_putdef(&self, handle: &DoiHandle) {
        let Some(slot) = self.dois.get(&handle.doi()) else {
            return;
        };
        let released = slot
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            warn!(doi = handle.doi(), "CIPSO DOI reference released twice");
        }
    }

    fn doi_list(&self) -> Vec<DoiDefinition> {
        let mut defs: Vec<DoiDefinition> =
            self.dois.iter().map(|slot| (*slot.def).clone()).collect();
        defs.sort_by_key(|def| def.doi);
        defs
    }

    fn apply_label(
        &self,
        target: &mut dyn LabelTarget,
        doi: &DoiHandle,
        secattr: &SecAttr,
    ) -> Result<(), CodecError> {
        let option = Self::encode(doi.definition(), secattr)?;
        target.set_label_option(Some(option));
        Ok(())
    }

    fn strip_label(&self, target: &mut dyn LabelTarget) {
        target.set_label_option(None);
    }

    fn decode_label(&self, packet: &dyn LabelTarget) -> Option<SecAttr> {
        let option = packet.label_option()?;
        if let Some(cached) = self.cache.get(option) {
            return Some(cached.value().clone());
        }
        match self.decode(option) {
            Ok(secattr) => Some(secattr),
            Err(e) => {
                debug!("Ignoring undecodable CIPSO option: {}", e);
                None
            }
        }
    }

    fn cache_add(&self, packet: &dyn LabelTarget, secattr: &SecAttr) {
        let Some(option) = packet.label_option() else {
            return;
        };
        if self.cache.len() >= LABEL_CACHE_SIZE {
            self.cache.clear();
        }
        let mut cached = secattr.clone();
        cached.label_type = Some(LabelType::Cipso);
        self.cache.insert(option.to_vec(), cached);
    }
}

fn len_byte(len: usize) -> u8 {
    // Every option built here is at most MAX_OPTION_LEN bytes.
    u8::try_from(len).unwrap_or(u8::MAX)
}

fn encode_rbm(mls: &MlsAttr) -> Result<Vec<u8>, CodecError> {
    let bitmap_len = mls
        .categories
        .iter()
        .next_back()
        .map_or(0, |&highest| usize::from(highest) / 8 + 1);
    if bitmap_len > MAX_BITMAP_LEN {
        return Err(CodecError::InvalidAttributes(format!(
            "category bitmap needs {bitmap_len} bytes, at most {MAX_BITMAP_LEN} fit"
        )));
    }

    let mut tag = vec![0u8; TAG_RBM_HDR_LEN + bitmap_len];
    tag[0] = TAG_RBM;
    tag[1] = len_byte(tag.len());
    tag[3] = mls.level;
    for &cat in &mls.categories {
        let cat = usize::from(cat);
        tag[TAG_RBM_HDR_LEN + cat / 8] |= 0x80 >> (cat % 8);
    }
    Ok(tag)
}

fn decode_rbm(level: u8, bitmap: &[u8]) -> MlsAttr {
    let mut categories = BTreeSet::new();
    for (byte_idx, byte) in bitmap.iter().enumerate() {
        for bit in 0..8u16 {
            if byte & (0x80 >> bit) != 0 {
                if let Ok(base) = u16::try_from(byte_idx * 8) {
                    categories.insert(base + bit);
                }
            }
        }
    }
    MlsAttr { level, categories }
}
