//! Last-known per-application volume levels.

use std::collections::{BTreeMap, HashMap};

use super::volume::clamp_level;

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    /// Name as it was last written, kept for export.
    name: String,
    level: f32,
}

/// Case-insensitive map from application name to normalized volume.
///
/// Written on every named-application apply, read when a slider is assigned
/// to an application so the slider can show the level without querying the
/// audio subsystem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeCache {
    entries: HashMap<String, CacheEntry>,
}

impl VolumeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the cache from a persisted `app_volumes` map.
    pub fn from_map(map: &BTreeMap<String, f32>) -> Self {
        let mut cache = Self::new();
        for (name, level) in map {
            cache.insert(name, *level);
        }
        cache
    }

    /// Exports the cache as an `app_volumes` map.
    pub fn to_map(&self) -> BTreeMap<String, f32> {
        self.entries
            .values()
            .map(|e| (e.name.clone(), e.level))
            .collect()
    }

    /// Records `level` (clamped to `0.0..=1.0`) for `name`.
    pub fn insert(&mut self, name: &str, level: f32) {
        self.entries.insert(
            fold(name),
            CacheEntry {
                name: name.to_string(),
                level: clamp_level(level),
            },
        );
    }

    /// Looks up the level for `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.entries.get(&fold(name)).map(|e| e.level)
    }

    /// Number of cached applications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}
