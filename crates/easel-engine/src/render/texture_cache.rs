//! Keyed texture cache with a byte budget.
//!
//! Entries remember the frame they were last used in. After each frame the
//! renderer calls [`TextureCache::evict_to_budget`], which drops the least
//! recently used entries until the total fits, never touching anything used
//! in the current frame.

use std::collections::HashMap;

use easel_scene::TextAlign;

use crate::gpu::TextureId;

/// Identity of a rasterized label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextKey {
    pub text: String,
    pub family: String,
    /// `f32::to_bits` of the raster font size.
    pub size_bits: u32,
    pub weight: u16,
    /// `f32::to_bits` of the straight-alpha color.
    pub color_bits: [u32; 4],
    /// `f32::to_bits` of the layout box.
    pub layout_bits: [u32; 2],
    pub origin: [u32; 2],
    pub width: u32,
    pub height: u32,
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureKey {
    /// Decoded image, keyed by its URL.
    Image(String),
    Text(TextKey),
}

/// A texture resident on the backend plus its pixel size.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureHandle {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

impl TextureHandle {
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

struct Entry {
    handle: TextureHandle,
    last_used: u64,
}

pub struct TextureCache {
    entries: HashMap<TextureKey, Entry>,
    budget_bytes: usize,
    bytes: usize,
    frame: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl TextureCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            budget_bytes,
            bytes: 0,
            frame: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Marks the start of a new frame.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    #[cfg(test)]
    pub fn contains(&self, key: &TextureKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks up `key` and marks it used in the current frame.
    pub fn get(&mut self, key: &TextureKey) -> Option<TextureHandle> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.frame;
                self.hits += 1;
                Some(entry.handle)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a handle, returning the one it replaced (which the caller
    /// must release on the backend).
    pub fn insert(&mut self, key: TextureKey, handle: TextureHandle) -> Option<TextureHandle> {
        self.bytes += handle.byte_size();
        let old = self.entries.insert(
            key,
            Entry {
                handle,
                last_used: self.frame,
            },
        )?;
        self.bytes -= old.handle.byte_size();
        Some(old.handle)
    }

    /// Drops least recently used entries until the cache fits its budget.
    ///
    /// Entries used in the current frame are kept even if that leaves the
    /// cache over budget. Returns the evicted handles for release.
    pub fn evict_to_budget(&mut self) -> Vec<TextureHandle> {
        if self.bytes <= self.budget_bytes {
            return Vec::new();
        }

        let mut candidates: Vec<(u64, TextureKey)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_used < self.frame)
            .map(|(k, e)| (e.last_used, k.clone()))
            .collect();
        candidates.sort_by_key(|(last_used, _)| *last_used);

        let mut evicted = Vec::new();
        for (_, key) in candidates {
            if self.bytes <= self.budget_bytes {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes -= entry.handle.byte_size();
                self.evictions += 1;
                evicted.push(entry.handle);
            }
        }

        if !evicted.is_empty() {
            log::debug!(
                "texture cache: evicted {} entries, {} bytes resident",
                evicted.len(),
                self.bytes
            );
        }
        evicted
    }

    /// Removes everything, returning the handles for release.
    pub fn clear(&mut self) -> Vec<TextureHandle> {
        self.bytes = 0;
        self.entries.drain().map(|(_, e)| e.handle).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
            bytes: self.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u32, side: u32) -> TextureHandle {
        TextureHandle {
            texture: TextureId(id),
            width: side,
            height: side,
        }
    }

    fn image(url: &str) -> TextureKey {
        TextureKey::Image(url.to_owned())
    }

    #[test]
    fn hit_and_miss_are_counted() {
        let mut cache = TextureCache::new(1 << 20);
        assert!(cache.get(&image("a")).is_none());
        cache.insert(image("a"), handle(1, 2));
        assert_eq!(cache.get(&image("a")), Some(handle(1, 2)));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries, stats.bytes), (1, 1, 1, 16));
    }

    #[test]
    fn replacing_returns_old_handle() {
        let mut cache = TextureCache::new(1 << 20);
        cache.insert(image("a"), handle(1, 2));
        assert_eq!(cache.insert(image("a"), handle(2, 4)), Some(handle(1, 2)));
        assert_eq!(cache.stats().bytes, 64);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        // Room for two 4x4 textures.
        let mut cache = TextureCache::new(128);
        cache.begin_frame();
        cache.insert(image("old"), handle(1, 4));
        cache.begin_frame();
        cache.insert(image("mid"), handle(2, 4));
        cache.begin_frame();
        cache.insert(image("new"), handle(3, 4));

        let evicted = cache.evict_to_budget();
        assert_eq!(evicted, vec![handle(1, 4)]);
        assert!(!cache.contains(&image("old")));
        assert!(cache.contains(&image("mid")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn never_evicts_current_frame() {
        let mut cache = TextureCache::new(0);
        cache.begin_frame();
        cache.insert(image("a"), handle(1, 4));
        cache.insert(image("b"), handle(2, 4));
        assert!(cache.evict_to_budget().is_empty());
        assert_eq!(cache.len(), 2);

        cache.begin_frame();
        cache.get(&image("b"));
        assert_eq!(cache.evict_to_budget(), vec![handle(1, 4)]);
    }

    #[test]
    fn clear_returns_everything() {
        let mut cache = TextureCache::new(0);
        cache.insert(image("a"), handle(1, 1));
        cache.insert(image("b"), handle(2, 1));
        assert_eq!(cache.clear().len(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().bytes, 0);
    }
}
