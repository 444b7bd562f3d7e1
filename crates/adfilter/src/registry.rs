// Blob lifetime registry: tracks every locally materialized playlist so a
// session releases them together, never at ad-hoc call sites.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A locally materialized playlist standing in for its original network URL.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Origin-independent handle, `blob:<uuid>`.
    pub uri: String,
    pub content: Arc<str>,
}

/// Owns the lifetime of every artifact one session materializes.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    inner: Mutex<HashMap<String, Arc<str>>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a local URI for `content` and track it until [`Self::release_all`].
    pub fn register(&self, content: String) -> Artifact {
        let uri = format!("blob:{}", Uuid::new_v4());
        let content: Arc<str> = content.into();
        self.inner.lock().insert(uri.clone(), Arc::clone(&content));
        Artifact { uri, content }
    }

    /// Dereference a previously registered handle. `None` once released.
    pub fn get(&self, uri: &str) -> Option<Arc<str>> {
        self.inner.lock().get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every tracked artifact. Idempotent.
    pub fn release_all(&self) {
        let mut map = self.inner.lock();
        if !map.is_empty() {
            debug!(count = map.len(), "releasing materialized artifacts");
        }
        map.clear();
    }
}
