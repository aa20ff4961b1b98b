use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;
use uuid::Uuid;

const OBJECT_URL_SCHEME: &str = "blob:faceswap/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub mime_type: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    blobs: HashMap<String, Blob>,
    created: u64,
    released: u64,
}

#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>, mime_type: Option<String>) -> ObjectUrlGuard {
        let url = format!("{OBJECT_URL_SCHEME}{}", Uuid::new_v4());
        {
            let mut state = self.lock();
            state.blobs.insert(
                url.clone(),
                Blob {
                    bytes: bytes.into(),
                    mime_type,
                },
            );
            state.created += 1;
        }
        debug!(url = %url, "object url created");
        ObjectUrlGuard {
            url,
            registry: self.clone(),
            released: false,
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.lock().blobs.get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn created_count(&self) -> u64 {
        self.lock().created
    }

    pub fn released_count(&self) -> u64 {
        self.lock().released
    }

    fn revoke(&self, url: &str) {
        let mut state = self.lock();
        if state.blobs.remove(url).is_some() {
            state.released += 1;
            debug!(url, "object url released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObjectUrlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrlRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

/// Scoped ownership of one object URL.
pub struct ObjectUrlGuard {
    url: String,
    registry: ObjectUrlRegistry,
    released: bool,
}

impl ObjectUrlGuard {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn blob(&self) -> Option<Blob> {
        self.registry.resolve(&self.url)
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.revoke(&self.url);
        }
    }
}

impl Drop for ObjectUrlGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for ObjectUrlGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrlGuard")
            .field("url", &self.url)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_resolves_until_dropped() {
        let registry = ObjectUrlRegistry::new();
        let guard = registry.create(vec![1, 2, 3], Some("image/png".into()));
        assert!(guard.url().starts_with(OBJECT_URL_SCHEME));

        let blob = registry.resolve(guard.url()).expect("live blob");
        assert_eq!(&*blob.bytes, &[1, 2, 3]);
        assert_eq!(registry.live_count(), 1);

        drop(guard);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn explicit_release_is_not_repeated_on_drop() {
        let registry = ObjectUrlRegistry::new();
        let guard = registry.create(vec![9], None);
        let url = guard.url().to_string();

        guard.release();

        assert!(registry.resolve(&url).is_none());
        assert_eq!(registry.created_count(), 1);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn urls_are_unique_per_blob() {
        let registry = ObjectUrlRegistry::new();
        let a = registry.create(vec![1], None);
        let b = registry.create(vec![1], None);
        assert_ne!(a.url(), b.url());
        assert_eq!(registry.live_count(), 2);
    }
}
