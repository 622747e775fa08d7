//! CIPSO codec collaborator
//!
//! The engine never touches wire labels itself. It resolves a policy and then
//! asks a [`CipsoCodec`] to apply, strip or decode the label on a target.
//! DOI definitions live in the codec's registry and are reference counted:
//! the engine brackets every use with `doi_getdef`/`doi_putdef`, which
//! [`DoiRef`] does automatically when its last clone is dropped.
//!
//! [`MemoryCipso`] is a self-contained implementation with a DOI registry, a
//! minimal option encoder/decoder and a label cache.

mod memory;

pub use memory::{MemoryCipso, CIPSO_OPTION_TYPE, LABEL_CACHE_SIZE};

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::label::SecAttr;

/// How security attributes map onto a DOI's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoiMapType {
    /// MLS level and categories are carried verbatim (restricted bitmap tag)
    Pass,
    /// The local security identifier is carried (local tag)
    Local,
}

/// A DOI definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoiDefinition {
    /// DOI value
    pub doi: u32,
    /// Mapping type
    #[serde(rename = "type", default = "default_map_type")]
    pub map_type: DoiMapType,
}

fn default_map_type() -> DoiMapType {
    DoiMapType::Pass
}

impl DoiDefinition {
    /// Pass-through DOI definition.
    #[must_use]
    pub const fn pass(doi: u32) -> Self {
        Self {
            doi,
            map_type: DoiMapType::Pass,
        }
    }

    /// Local-mapping DOI definition.
    #[must_use]
    pub const fn local(doi: u32) -> Self {
        Self {
            doi,
            map_type: DoiMapType::Local,
        }
    }
}

/// A counted handle on a registered DOI definition, returned by
/// [`CipsoCodec::doi_getdef`].
#[derive(Debug, Clone)]
pub struct DoiHandle {
    def: Arc<DoiDefinition>,
}

impl DoiHandle {
    /// Wrap a definition.
    #[must_use]
    pub fn new(def: Arc<DoiDefinition>) -> Self {
        Self { def }
    }

    /// DOI value.
    #[must_use]
    pub fn doi(&self) -> u32 {
        self.def.doi
    }

    /// Full definition.
    #[must_use]
    pub fn definition(&self) -> &DoiDefinition {
        &self.def
    }
}

/// Kind of object a label is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A socket
    Socket,
    /// A pending connection request
    Request,
    /// A single packet
    Packet,
}

/// Anything that can carry a wire label.
pub trait LabelTarget {
    /// Kind of the target.
    fn target_kind(&self) -> TargetKind;

    /// Raw label option currently attached, if any.
    fn label_option(&self) -> Option<&[u8]>;

    /// Replace the attached label option.
    fn set_label_option(&mut self, option: Option<Vec<u8>>);
}

/// A connection request; its peer is known.
pub trait ConnRequest: LabelTarget {
    /// Remote address of the request.
    fn peer_addr(&self) -> IpAddr;
}

/// A packet as seen by the dispatch layer.
pub trait PacketView: LabelTarget {
    /// Index of the receiving interface (0 if unknown).
    fn ifindex(&self) -> u32;

    /// Source address.
    fn source(&self) -> IpAddr;

    /// Destination address.
    fn destination(&self) -> IpAddr;
}

/// CIPSO codec and DOI registry.
pub trait CipsoCodec: Send + Sync {
    /// Register a DOI definition.
    ///
    /// # Errors
    ///
    /// Returns `DoiExists` if the DOI is already registered.
    fn doi_add(&self, def: DoiDefinition) -> Result<(), CodecError>;

    /// Unregister a DOI definition.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDoi` or `DoiInUse`.
    fn doi_remove(&self, doi: u32) -> Result<(), CodecError>;

    /// Take a reference on a DOI definition.
    fn doi_getdef(&self, doi: u32) -> Option<DoiHandle>;

    /// Release a reference taken with `doi_getdef`.
    fn doi_putdef(&self, handle: &DoiHandle);

    /// All registered DOI definitions.
    fn doi_list(&self) -> Vec<DoiDefinition>;

    /// Encode `secattr` in `doi` and attach it to `target`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the attributes cannot be encoded.
    fn apply_label(
        &self,
        target: &mut dyn LabelTarget,
        doi: &DoiHandle,
        secattr: &SecAttr,
    ) -> Result<(), CodecError>;

    /// Remove any label attached to `target`.
    fn strip_label(&self, target: &mut dyn LabelTarget);

    /// Decode the wire label of a received packet.
    fn decode_label(&self, packet: &dyn LabelTarget) -> Option<SecAttr>;

    /// Remember the attributes decoded for a packet's label.
    fn cache_add(&self, packet: &dyn LabelTarget, secattr: &SecAttr);
}

struct DoiRefInner {
    handle: DoiHandle,
    codec: Arc<dyn CipsoCodec>,
}

impl Drop for DoiRefInner {
    fn drop(&mut self) {
        self.codec.doi_putdef(&self.handle);
    }
}

/// Reference on a DOI held by a labeling policy.
///
/// Clones share one registry reference; the reference is returned with
/// `doi_putdef` when the last clone is dropped.
#[derive(Clone)]
pub struct DoiRef {
    inner: Arc<DoiRefInner>,
}

impl DoiRef {
    /// Take a registry reference on `doi`.
    pub fn acquire(codec: &Arc<dyn CipsoCodec>, doi: u32) -> Option<Self> {
        let handle = codec.doi_getdef(doi)?;
        Some(Self {
            inner: Arc::new(DoiRefInner {
                handle,
                codec: Arc::clone(codec),
            }),
        })
    }

    /// DOI value.
    #[must_use]
    pub fn doi(&self) -> u32 {
        self.inner.handle.doi()
    }

    /// Underlying handle.
    #[must_use]
    pub fn handle(&self) -> &DoiHandle {
        &self.inner.handle
    }
}

impl fmt::Debug for DoiRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DoiRef").field(&self.doi()).finish()
    }
}

impl PartialEq for DoiRef {
    fn eq(&self, other: &Self) -> bool {
        self.doi() == other.doi()
    }
}

impl Eq for DoiRef {}
