//! Shared per-store context.
//!
//! Every object handed to clients (groups, dimensions, variables,
//! attributes) holds an `Arc<SharedResources>`: the store handle, the
//! global recursive lock serializing native calls, the definition-mode
//! flag, the identity cache for dimensions, and a few facts computed once
//! at open time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::debug;

use crate::dimension::Dimension;
use crate::errors::Result;
use crate::store::{DimId, Store};
use crate::typemap::TypeCache;

pub struct SharedResources {
    store: Box<dyn Store>,
    lock: ReentrantMutex<()>,
    read_only: bool,
    /// Whether strided-mapped buffer strides are expressed in elements
    /// (library 4.4 and later) or in bytes.
    imap_in_elements: bool,
    define_mode: Mutex<bool>,
    scanning_indexing_variable: AtomicBool,
    dimensions: Mutex<HashMap<DimId, Weak<Dimension>>>,
    type_cache: TypeCache,
}

impl SharedResources {
    /// Wrap a store opened on existing content. The store is in data mode.
    pub fn new(store: Box<dyn Store>, read_only: bool) -> Arc<Self> {
        Self::with_mode(store, read_only, false)
    }

    /// Wrap a freshly created store, which starts in definition mode.
    pub fn for_created(store: Box<dyn Store>) -> Arc<Self> {
        Self::with_mode(store, false, true)
    }

    fn with_mode(store: Box<dyn Store>, read_only: bool, define_mode: bool) -> Arc<Self> {
        let imap_in_elements = imap_unit_is_elements(&store.library_version());
        Arc::new(SharedResources {
            store,
            lock: ReentrantMutex::new(()),
            read_only,
            imap_in_elements,
            define_mode: Mutex::new(define_mode),
            scanning_indexing_variable: AtomicBool::new(false),
            dimensions: Mutex::new(HashMap::new()),
            type_cache: TypeCache::new(),
        })
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Serialize a chain of native calls. The lock is recursive, so a
    /// holder may re-enter through nested object methods.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn imap_in_elements(&self) -> bool {
        self.imap_in_elements
    }

    pub(crate) fn type_cache(&self) -> &TypeCache {
        &self.type_cache
    }

    /// Switch the store between definition and data mode. A no-op when the
    /// store is already there, is read-only, or uses a format that does not
    /// distinguish the two.
    pub(crate) fn set_define_mode(&self, define: bool) -> Result<()> {
        if self.read_only || !self.store.format().distinguishes_modes() {
            return Ok(());
        }
        let _guard = self.lock();
        let mut current = self.define_mode.lock();
        if *current == define {
            return Ok(());
        }
        debug!(define, "switching definition mode");
        if define {
            self.store.redef()?;
        } else {
            self.store.enddef()?;
        }
        *current = define;
        Ok(())
    }

    /// Re-entrancy guard for the indexing-variable scan: the scan inspects
    /// other variables, which may themselves look for indexing variables.
    /// Returns `None` when a scan is already running on this store.
    pub(crate) fn begin_indexing_scan(self: &Arc<Self>) -> Option<IndexingScanGuard> {
        if self
            .scanning_indexing_variable
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        Some(IndexingScanGuard {
            shared: Arc::clone(self),
        })
    }

    /// Identity cache: at most one live `Dimension` per dimension id, so
    /// that renames propagate to every holder.
    pub(crate) fn cached_dimension(&self, d: DimId) -> Option<Arc<Dimension>> {
        let mut map = self.dimensions.lock();
        match map.get(&d) {
            Some(weak) => match weak.upgrade() {
                Some(dim) => Some(dim),
                None => {
                    map.remove(&d);
                    None
                }
            },
            None => None,
        }
    }

    pub(crate) fn cache_dimension(&self, d: DimId, dim: &Arc<Dimension>) {
        self.dimensions.lock().insert(d, Arc::downgrade(dim));
    }
}

pub(crate) struct IndexingScanGuard {
    shared: Arc<SharedResources>,
}

impl Drop for IndexingScanGuard {
    fn drop(&mut self) {
        self.shared
            .scanning_indexing_variable
            .store(false, Ordering::Release);
    }
}

/// Whether the library expresses mapped-access buffer strides in elements.
/// Versions before 4.4 used bytes.
pub(crate) fn imap_unit_is_elements(version: &str) -> bool {
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major > 4 || (major == 4 && minor >= 4)
}
