use {
    super::{
        error::{BufferPoolIsFullSnafu, DiskSnafu, Result},
        page::Page,
        pool::BufferPool,
        FrameId, LruReplacer, PageTag, Replacer,
    },
    crate::{disk::DiskManager, FileId, PageNum},
    parking_lot::{Mutex, RwLockWriteGuard},
    snafu::prelude::*,
    std::collections::{HashMap, VecDeque},
};

/// Residency metadata of one frame. Lives in the latched [`Core`] so that pin
/// accounting never has to take the frame's data latch.
#[derive(Debug, Default)]
struct Frame {
    tag: Option<PageTag>,
    pin_count: u32,
    is_dirty: bool,
}

struct Core {
    frames: Vec<Frame>,
    page_table: HashMap<PageTag, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// The page cache: multiplexes pages from many files onto a fixed set of
/// in-memory frames, writing dirty images back to disk before a frame is
/// repurposed. A page stays resident while any [`BufferRef`] to it is alive.
///
/// Lock order is core latch, then replacer latch, then a frame's data latch.
/// [`BufferRef`] takes the data latch only after the core latch is released.
pub struct BufferManager<R: Replacer = LruReplacer> {
    pool: BufferPool,
    core: Mutex<Core>,
    replacer: R,
    disk: DiskManager,
}

impl BufferManager {
    pub fn new(disk: DiskManager, pool_size: usize) -> Self {
        Self::with_replacer(disk, pool_size, LruReplacer::new(pool_size))
    }
}

impl<R: Replacer> BufferManager<R> {
    pub fn with_replacer(disk: DiskManager, pool_size: usize, replacer: R) -> Self {
        Self {
            pool: BufferPool::new(pool_size),
            core: Mutex::new(Core {
                frames: (0..pool_size).map(|_| Frame::default()).collect(),
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
            }),
            replacer,
            disk,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Pins `tag`'s page into a frame, reading it from disk on a miss, and
    /// returns a guard over its bytes. Fails with [`Error::BufferPoolIsFull`]
    /// when every frame is pinned.
    ///
    /// [`Error::BufferPoolIsFull`]: super::Error::BufferPoolIsFull
    pub fn fetch_page(&self, tag: PageTag) -> Result<BufferRef<'_, R>> {
        let mut core = self.core.lock();

        if let Some(&frame_id) = core.page_table.get(&tag) {
            self.replacer.pin(frame_id);
            core.frames[frame_id].pin_count += 1;
            drop(core);

            return Ok(self.buffer_ref(tag, frame_id));
        }

        let frame_id = self.find_victim(&mut core)?;
        if let Err(err) = self.update_page(&mut core, frame_id, tag) {
            self.requeue(&mut core, frame_id);
            return Err(err);
        }

        {
            let mut page = self.pool.get_buffer(frame_id).write();
            if let Err(err) = self.disk.read_page(&tag, page.data_mut()) {
                drop(page);
                // Tear the installation down again so the frame is not
                // stranded outside both the free list and the replacer.
                core.page_table.remove(&tag);
                core.frames[frame_id] = Frame::default();
                core.free_list.push_front(frame_id);
                return Err(err).context(DiskSnafu);
            }
        }

        self.replacer.pin(frame_id);
        core.frames[frame_id].pin_count = 1;
        drop(core);

        Ok(self.buffer_ref(tag, frame_id))
    }

    /// Allocates a fresh page in `file_id` and pins it into a frame. The
    /// returned image is zeroed; the caller initializes it and marks the
    /// guard dirty.
    pub fn new_page(&self, file_id: FileId) -> Result<BufferRef<'_, R>> {
        let mut core = self.core.lock();

        let frame_id = self.find_victim(&mut core)?;

        let page_num = match self.disk.allocate_page(file_id) {
            Ok(page_num) => page_num,
            Err(err) => {
                self.requeue(&mut core, frame_id);
                return Err(err).context(DiskSnafu);
            }
        };
        let tag = PageTag { file_id, page_num };

        if let Err(err) = self.update_page(&mut core, frame_id, tag) {
            self.requeue(&mut core, frame_id);
            return Err(err);
        }

        self.replacer.pin(frame_id);
        core.frames[frame_id].pin_count = 1;
        drop(core);

        Ok(self.buffer_ref(tag, frame_id))
    }

    /// Releases one pin on `tag`'s page, folding `is_dirty` into the frame's
    /// dirty bit. The bit only ever ORs in here; flushing is what clears it.
    /// Returns `false` when the page is not resident or not pinned.
    ///
    /// [`BufferRef`] calls this on drop; direct use must pair one call with
    /// one successful fetch.
    pub fn unpin_page(&self, tag: &PageTag, is_dirty: bool) -> bool {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(tag) else {
            return false;
        };

        let frame = &mut core.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        if is_dirty {
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        true
    }

    /// Writes `tag`'s image to disk regardless of pin count and clears its
    /// dirty bit. Returns `Ok(false)` when the page is not resident.
    pub fn flush_page(&self, tag: &PageTag) -> Result<bool> {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(tag) else {
            return Ok(false);
        };

        {
            let page = self.pool.get_buffer(frame_id).read();
            self.disk.write_page(tag, page.data()).context(DiskSnafu)?;
        }
        core.frames[frame_id].is_dirty = false;

        Ok(true)
    }

    /// Drops `tag`'s page from the pool, writing its image out first. The
    /// on-disk slot stays allocated; reclaiming it is a file-level concern.
    /// Returns `Ok(false)` when the page is still pinned, `Ok(true)` when it
    /// was dropped or was not resident to begin with.
    pub fn delete_page(&self, tag: &PageTag) -> Result<bool> {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(tag) else {
            return Ok(true);
        };

        if core.frames[frame_id].pin_count != 0 {
            return Ok(false);
        }

        {
            let page = self.pool.get_buffer(frame_id).read();
            self.disk.write_page(tag, page.data()).context(DiskSnafu)?;
        }

        core.page_table.remove(tag);
        // The frame is no longer resident, so it must leave the replacer too.
        self.replacer.pin(frame_id);
        self.pool.get_buffer(frame_id).write().reset();
        core.frames[frame_id] = Frame::default();
        core.free_list.push_back(frame_id);

        Ok(true)
    }

    /// Writes every resident page of `file_id` back to disk and clears the
    /// dirty bits. Pinned pages are written as-is.
    pub fn flush_all_pages(&self, file_id: FileId) -> Result<()> {
        let mut core = self.core.lock();

        for frame_id in 0..core.frames.len() {
            let Some(tag) = core.frames[frame_id].tag else {
                continue;
            };
            if tag.file_id != file_id {
                continue;
            }

            {
                let page = self.pool.get_buffer(frame_id).read();
                self.disk.write_page(&tag, page.data()).context(DiskSnafu)?;
            }
            core.frames[frame_id].is_dirty = false;
        }

        Ok(())
    }

    /// Whether `tag`'s page currently occupies a frame.
    pub fn is_resident(&self, tag: &PageTag) -> bool {
        self.core.lock().page_table.contains_key(tag)
    }

    /// Outstanding pins on `tag`'s page, or `None` when it is not resident.
    pub fn pin_count(&self, tag: &PageTag) -> Option<u32> {
        let core = self.core.lock();
        let &frame_id = core.page_table.get(tag)?;

        Some(core.frames[frame_id].pin_count)
    }

    /// Claims a frame for reuse: the free list first (those need no
    /// write-back), then the replacer. The frame comes back off both.
    fn find_victim(&self, core: &mut Core) -> Result<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        self.replacer.victim().context(BufferPoolIsFullSnafu)
    }

    /// Returns a claimed frame that will not be used after all to where it
    /// came from: empty frames to the free list, resident ones to the
    /// replacer.
    fn requeue(&self, core: &mut Core, frame_id: FrameId) {
        if core.frames[frame_id].tag.is_none() {
            core.free_list.push_front(frame_id);
        } else {
            self.replacer.unpin(frame_id);
        }
    }

    /// The one place a frame changes identity: writes back the old dirty
    /// image, swaps the page-table entries and leaves the frame zeroed, clean
    /// and unpinned under `new_tag`. On a failed write-back the frame keeps
    /// its old identity and stays dirty.
    fn update_page(&self, core: &mut Core, frame_id: FrameId, new_tag: PageTag) -> Result<()> {
        if let Some(old_tag) = core.frames[frame_id].tag {
            if core.frames[frame_id].is_dirty {
                let page = self.pool.get_buffer(frame_id).read();
                self.disk
                    .write_page(&old_tag, page.data())
                    .context(DiskSnafu)?;
            }
            core.page_table.remove(&old_tag);
        }

        core.page_table.insert(new_tag, frame_id);
        self.pool.get_buffer(frame_id).write().reset();
        core.frames[frame_id] = Frame {
            tag: Some(new_tag),
            pin_count: 0,
            is_dirty: false,
        };

        Ok(())
    }

    fn buffer_ref(&self, tag: PageTag, frame_id: FrameId) -> BufferRef<'_, R> {
        // The frame cannot be repurposed while pinned, so taking the data
        // latch outside the core latch is safe.
        let page = self.pool.get_buffer(frame_id).write();

        BufferRef {
            manager: self,
            tag,
            dirty: false,
            page: Some(page),
        }
    }
}

/// A pinned page. Holds the frame's data latch for its lifetime; dropping the
/// guard releases the latch and unpins, handing the recorded dirtiness to the
/// pool.
///
/// Guards are exclusive per frame: concurrent fetches of one page serialize,
/// and a thread must drop its guard before fetching, flushing or deleting the
/// same page again.
pub struct BufferRef<'a, R: Replacer = LruReplacer> {
    manager: &'a BufferManager<R>,
    tag: PageTag,
    dirty: bool,
    page: Option<RwLockWriteGuard<'a, Page>>,
}

impl<R: Replacer> BufferRef<'_, R> {
    pub fn tag(&self) -> &PageTag {
        &self.tag
    }

    pub fn page_num(&self) -> PageNum {
        self.tag.page_num
    }

    pub fn as_slice(&self) -> &[u8] {
        self.page.as_ref().unwrap().data()
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        self.page.as_mut().unwrap().data_mut()
    }

    /// Records that the caller modified the image. Folded into the frame's
    /// dirty bit when the guard drops.
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }
}

impl<R: Replacer> Drop for BufferRef<'_, R> {
    fn drop(&mut self) {
        // Release the data latch before unpinning: unpin takes the core
        // latch, and a flush may hold the core latch while waiting on the
        // data latch.
        self.page = None;
        self.manager.unpin_page(&self.tag, self.dirty);
    }
}
