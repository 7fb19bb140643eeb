use {
    super::{replacer::Replacer, FrameId},
    lru::LruCache,
    parking_lot::Mutex,
    std::num::NonZeroUsize,
};

pub struct LruReplacer(Mutex<LruCache<FrameId, ()>>);

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap();
        Self(Mutex::new(LruCache::new(capacity)))
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        self.0.lock().pop_lru().map(|(k, _)| k)
    }

    fn pin(&self, frame_id: FrameId) {
        self.0.lock().pop(&frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut cache = self.0.lock();

        // A redundant unpin must not refresh recency.
        if !cache.contains(&frame_id) {
            cache.put(frame_id, ());
        }
    }

    fn size(&self) -> usize {
        self.0.lock().len()
    }
}
