//! Instance registry
//!
//! Embedding hosts refer to casting instances through opaque numeric
//! handles rather than owned objects. The [`InstanceRegistry`] owns every
//! live [`Caster`] and hands out [`InstanceId`]s; a freed or never-issued
//! id fails lookup instead of aliasing another instance. Ids are never
//! reused within a process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::caster::Caster;
use crate::error::{CastError, Result};

/// Opaque handle to a registered [`Caster`]
///
/// The raw value 0 is never issued, so hosts can use it as a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Reconstruct an id from its raw value, e.g. one round-tripped
    /// through a host
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value, for handing across a language boundary
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owner of all live casting instances
pub struct InstanceRegistry {
    instances: Mutex<HashMap<u64, Arc<Caster>>>,
    next_id: AtomicU64,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide registry, created on first use
    pub fn global() -> &'static InstanceRegistry {
        static GLOBAL: OnceLock<InstanceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InstanceRegistry::new)
    }

    /// Register a caster and issue its handle
    pub async fn alloc(&self, caster: Caster) -> InstanceId {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut instances = self.instances.lock().await;
        instances.insert(id.0, Arc::new(caster));
        tracing::info!(instance = %id, "Instance allocated");
        id
    }

    /// Resolve a handle to its caster
    pub async fn lookup(&self, id: InstanceId) -> Result<Arc<Caster>> {
        let instances = self.instances.lock().await;
        instances
            .get(&id.0)
            .map(Arc::clone)
            .ok_or(CastError::InstanceNotFound(id.0))
    }

    /// Remove an instance, finishing its output
    ///
    /// Returns `true` exactly once per issued id; freeing an unknown or
    /// already-freed id returns `false`.
    pub async fn free(&self, id: InstanceId) -> bool {
        let caster = {
            let mut instances = self.instances.lock().await;
            instances.remove(&id.0)
        };

        let Some(caster) = caster else {
            tracing::warn!(instance = %id, "Free of unknown instance");
            return false;
        };

        if let Err(e) = caster.finish().await {
            tracing::warn!(instance = %id, error = %e, "Instance finish failed during free");
        }
        tracing::info!(instance = %id, "Instance freed");
        true
    }

    /// Number of live instances
    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    /// Whether no instances are live
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
