//! Clip registry
//!
//! Owns every loaded clip's backend handle plus its cached duration and
//! position. Handles are released exactly once: either through `unload` /
//! `unload_all` here, or never (entries removed from the map always have
//! their handle unloaded in the same call).

use crate::backend::ClipHandle;
use glossa_common::types::ClipId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One loaded clip
pub struct LoadedClip {
    pub clip_id: ClipId,
    pub handle: Arc<dyn ClipHandle>,
    /// None until the backend's metadata event resolves
    pub duration_ms: Option<u64>,
    pub last_position_ms: u64,
    /// Cleared when the backend reports a decode failure; an unplayable
    /// clip silently ignores play requests
    pub playable: bool,
}

/// Registry of loaded clips, owned by the audio controller
#[derive(Default)]
pub struct ClipRegistry {
    clips: HashMap<ClipId, LoadedClip>,
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
        }
    }

    /// Register a freshly loaded clip.
    ///
    /// Returns false (and unloads the incoming handle) if the clip is
    /// already registered — loading is idempotent and never produces a
    /// second backend handle for the same id.
    pub fn insert(&mut self, clip_id: ClipId, handle: Arc<dyn ClipHandle>) -> bool {
        if self.clips.contains_key(&clip_id) {
            debug!("Clip {} already loaded, dropping duplicate handle", clip_id);
            handle.unload();
            return false;
        }
        self.clips.insert(
            clip_id,
            LoadedClip {
                clip_id,
                handle,
                duration_ms: None,
                last_position_ms: 0,
                playable: true,
            },
        );
        true
    }

    pub fn contains(&self, clip_id: ClipId) -> bool {
        self.clips.contains_key(&clip_id)
    }

    pub fn get(&self, clip_id: ClipId) -> Option<&LoadedClip> {
        self.clips.get(&clip_id)
    }

    pub fn get_mut(&mut self, clip_id: ClipId) -> Option<&mut LoadedClip> {
        self.clips.get_mut(&clip_id)
    }

    /// Remove and release one clip. Idempotent: unknown ids are a no-op.
    pub fn unload(&mut self, clip_id: ClipId) -> bool {
        match self.clips.remove(&clip_id) {
            Some(clip) => {
                clip.handle.unload();
                debug!("Unloaded clip {}", clip_id);
                true
            }
            None => false,
        }
    }

    /// Remove and release every clip.
    pub fn unload_all(&mut self) {
        for (_, clip) in self.clips.drain() {
            clip.handle.unload();
        }
    }

    pub fn ids(&self) -> Vec<ClipId> {
        self.clips.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedClip> {
        self.clips.values()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandle {
        unloads: AtomicUsize,
    }

    impl ClipHandle for CountingHandle {
        fn play(&self) {}
        fn pause(&self) {}
        fn seek(&self, _position_ms: u64) {}
        fn unload(&self) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_insert_idempotent() {
        let mut registry = ClipRegistry::new();
        let first = Arc::new(CountingHandle::default());
        let second = Arc::new(CountingHandle::default());

        assert!(registry.insert(3, first.clone()));
        assert!(!registry.insert(3, second.clone()));

        assert_eq!(registry.len(), 1);
        // The duplicate handle was released, the original kept
        assert_eq!(second.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(first.unloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unload_idempotent() {
        let mut registry = ClipRegistry::new();
        let handle = Arc::new(CountingHandle::default());
        registry.insert(0, handle.clone());

        assert!(registry.unload(0));
        assert!(!registry.unload(0));
        assert!(!registry.unload(0));

        // Released exactly once
        assert_eq!(handle.unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_all() {
        let mut registry = ClipRegistry::new();
        let handles: Vec<_> = (0..4).map(|_| Arc::new(CountingHandle::default())).collect();
        for (i, handle) in handles.iter().enumerate() {
            registry.insert(i, handle.clone());
        }

        registry.unload_all();
        assert!(registry.is_empty());
        for handle in &handles {
            assert_eq!(handle.unloads.load(Ordering::SeqCst), 1);
        }
    }
}
