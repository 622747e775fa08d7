//! Security identity registry
//!
//! Translation between opaque security identifiers and their textual
//! security contexts. The engine uses it only for audit records and for
//! administrative calls that name a context.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Opaque security identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecId(pub u32);

impl fmt::Display for SecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Translation service between security identifiers and contexts.
pub trait SecidRegistry: Send + Sync {
    /// Context string for an identifier.
    fn secid_to_secctx(&self, secid: SecId) -> Option<String>;

    /// Identifier for a context string.
    fn secctx_to_secid(&self, secctx: &str) -> Option<SecId>;
}

/// In-memory registry; identifiers are assigned on registration.
pub struct MemorySecidRegistry {
    by_id: DashMap<SecId, String>,
    by_ctx: DashMap<String, SecId>,
    next: AtomicU32,
}

impl MemorySecidRegistry {
    /// Create an empty registry. Identifier 0 is never assigned.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_ctx: DashMap::new(),
            next: AtomicU32::new(1),
        }
    }

    /// Register a context, returning its identifier.
    ///
    /// Registering the same context twice returns the same identifier.
    pub fn register(&self, secctx: &str) -> SecId {
        *self.by_ctx.entry(secctx.to_string()).or_insert_with(|| {
            let secid = SecId(self.next.fetch_add(1, Ordering::Relaxed));
            self.by_id.insert(secid, secctx.to_string());
            secid
        })
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.by_ctx.len()
    }

    /// Whether no context is registered.
    pub fn is_empty(&self) -> bool {
        self.by_ctx.is_empty()
    }
}

impl Default for MemorySecidRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySecidRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySecidRegistry")
            .field("contexts", &self.by_ctx.len())
            .finish()
    }
}

impl SecidRegistry for MemorySecidRegistry {
    fn secid_to_secctx(&self, secid: SecId) -> Option<String> {
        self.by_id.get(&secid).map(|ctx| ctx.value().clone())
    }

    fn secctx_to_secid(&self, secctx: &str) -> Option<SecId> {
        self.by_ctx.get(secctx).map(|id| *id.value())
    }
}
