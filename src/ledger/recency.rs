use lru::LruCache;
use std::num::NonZeroUsize;

/// 履歴を保持するフレームの LRU
pub struct Recency {
    frames: LruCache<usize, ()>,
}

impl Recency {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            frames: LruCache::new(capacity),
        }
    }

    /// `frame` を最新にする。溢れて追い出されたフレームを返す
    pub fn touch(&mut self, frame: usize) -> Option<usize> {
        match self.frames.push(frame, ()) {
            Some((evicted, ())) if evicted != frame => Some(evicted),
            _ => None,
        }
    }

    pub fn contains(&self, frame: usize) -> bool {
        self.frames.contains(&frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
