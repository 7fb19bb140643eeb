use {
    super::{page::Page, FrameId},
    parking_lot::RwLock,
};

/// The fixed frame array. Each frame's byte image sits behind its own data
/// latch; the array itself is never resized after construction.
pub(super) struct BufferPool {
    frames: Vec<RwLock<Page>>,
}

impl BufferPool {
    pub(super) fn new(size: usize) -> Self {
        let frames = (0..size).map(|_| RwLock::new(Page::default())).collect();

        Self { frames }
    }

    pub(super) fn size(&self) -> usize {
        self.frames.len()
    }

    pub(super) fn get_buffer(&self, frame_id: FrameId) -> &RwLock<Page> {
        &self.frames[frame_id]
    }
}
