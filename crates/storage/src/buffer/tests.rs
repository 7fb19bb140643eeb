use {
    super::*,
    crate::{DiskManager, FileId, PageNum, PAGE_SIZE},
    rand::prelude::*,
    std::{fs, path::Path, sync::Arc, thread},
    tempfile::{tempdir, TempDir},
};

const POOL_SIZE: usize = 3;
const DB_FILE: &str = "main.db";

fn setup() -> (TempDir, BufferManager, FileId) {
    let dir = tempdir().unwrap();
    let disk = DiskManager::new(dir.path().to_path_buf());
    let file_id = disk.open(Path::new(DB_FILE)).unwrap();
    let manager = BufferManager::new(disk, POOL_SIZE);

    (dir, manager, file_id)
}

fn raw_page(dir: &TempDir, file: &str, page_num: PageNum) -> Vec<u8> {
    let bytes = fs::read(dir.path().join(file)).unwrap();

    bytes[page_num as usize * PAGE_SIZE..][..PAGE_SIZE].to_vec()
}

#[test]
fn allocate_and_read_back() -> Result<()> {
    let (dir, manager, file_id) = setup();

    let tag = {
        let mut page = manager.new_page(file_id)?;
        assert_eq!(page.page_num(), 0);

        page.as_slice_mut().fill(0xAA);
        page.set_dirty();
        *page.tag()
    };

    assert!(manager.flush_page(&tag)?);
    assert_eq!(raw_page(&dir, DB_FILE, 0), vec![0xAA; PAGE_SIZE]);

    Ok(())
}

#[test]
fn eviction_picks_the_least_recently_unpinned() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let mut tags = Vec::new();
    for _ in 0..POOL_SIZE {
        // The guard drops right away, so the unpin order is the allocation
        // order.
        tags.push(*manager.new_page(file_id)?.tag());
    }

    let overflow = *manager.new_page(file_id)?.tag();

    assert!(!manager.is_resident(&tags[0]));
    assert!(manager.is_resident(&tags[1]));
    assert!(manager.is_resident(&tags[2]));
    assert!(manager.is_resident(&overflow));

    Ok(())
}

#[test]
fn pinned_pages_block_eviction() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let pinned: Vec<_> = (0..POOL_SIZE)
        .map(|_| manager.new_page(file_id))
        .collect::<Result<_>>()?;

    assert!(matches!(
        manager.new_page(file_id),
        Err(Error::BufferPoolIsFull { .. })
    ));

    drop(pinned);
    manager.new_page(file_id)?;

    Ok(())
}

#[test]
fn dirty_page_survives_eviction() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let tag = {
        let mut page = manager.new_page(file_id)?;
        page.as_slice_mut().fill(0xAA);
        page.set_dirty();
        *page.tag()
    };

    // Fill the pool with fresh pages until the dirty one is expelled.
    for _ in 0..POOL_SIZE {
        manager.new_page(file_id)?;
    }
    assert!(!manager.is_resident(&tag));

    let page = manager.fetch_page(tag)?;
    assert_eq!(page.as_slice(), vec![0xAA; PAGE_SIZE]);

    Ok(())
}

#[test]
fn delete_waits_for_unpin() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let tag = *manager.new_page(file_id)?.tag();

    let page = manager.fetch_page(tag)?;
    assert!(!manager.delete_page(&tag)?);
    drop(page);

    assert!(manager.delete_page(&tag)?);
    assert!(!manager.is_resident(&tag));

    // Re-fetching goes back to disk; the freed frame is reusable.
    let page = manager.fetch_page(tag)?;
    assert_eq!(page.as_slice(), vec![0; PAGE_SIZE]);
    drop(page);

    // Deleting a page that is not resident is a no-op success.
    assert!(manager.delete_page(&tag)?);
    assert!(manager.delete_page(&tag)?);

    Ok(())
}

#[test]
fn redundant_unpin_is_rejected() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let tag = *manager.new_page(file_id)?.tag();

    let page = manager.fetch_page(tag)?;
    assert_eq!(manager.pin_count(&tag), Some(1));
    drop(page);

    assert_eq!(manager.pin_count(&tag), Some(0));
    assert!(!manager.unpin_page(&tag, false));

    Ok(())
}

#[test]
fn unpin_never_clears_dirtiness() -> Result<()> {
    let (_dir, manager, file_id) = setup();

    let tag = {
        let mut page = manager.new_page(file_id)?;
        page.as_slice_mut().fill(7);
        page.set_dirty();
        *page.tag()
    };

    // A clean fetch/unpin after the dirty one must not drop the update.
    manager.fetch_page(tag)?;

    for _ in 0..POOL_SIZE {
        manager.new_page(file_id)?;
    }
    assert!(!manager.is_resident(&tag));

    let page = manager.fetch_page(tag)?;
    assert_eq!(page.as_slice(), vec![7; PAGE_SIZE]);

    Ok(())
}

#[test]
fn flush_page_is_idempotent() -> Result<()> {
    let (dir, manager, file_id) = setup();

    let tag = {
        let mut page = manager.new_page(file_id)?;
        page.as_slice_mut().fill(3);
        page.set_dirty();
        *page.tag()
    };

    assert!(manager.flush_page(&tag)?);
    let first = raw_page(&dir, DB_FILE, 0);

    assert!(manager.flush_page(&tag)?);
    assert_eq!(raw_page(&dir, DB_FILE, 0), first);

    let missing = PageTag::new(file_id, 999);
    assert!(!manager.flush_page(&missing)?);

    Ok(())
}

#[test]
fn flush_all_pages_filters_by_file() -> Result<()> {
    let (dir, manager, file_a) = setup();
    let file_b = manager.disk().open(Path::new("other.db")).unwrap();

    for (file_id, fill) in [(file_a, 1u8), (file_b, 2u8)] {
        let mut page = manager.new_page(file_id)?;
        page.as_slice_mut().fill(fill);
        page.set_dirty();
    }

    manager.flush_all_pages(file_a)?;

    assert_eq!(raw_page(&dir, DB_FILE, 0), vec![1; PAGE_SIZE]);
    // The other file's image was allocated but not flushed.
    assert_eq!(raw_page(&dir, "other.db", 0), vec![0; PAGE_SIZE]);

    manager.flush_all_pages(file_b)?;
    assert_eq!(raw_page(&dir, "other.db", 0), vec![2; PAGE_SIZE]);

    Ok(())
}

#[test]
fn concurrent_fetches_keep_images_intact() {
    const PAGES: u32 = 16;
    const THREADS: usize = 4;
    const ROUNDS: usize = 8;

    let dir = tempdir().unwrap();
    let disk = DiskManager::new(dir.path().to_path_buf());
    let file_id = disk.open(Path::new(DB_FILE)).unwrap();
    // Big enough that one pinned page per thread can never exhaust the pool.
    let manager = Arc::new(BufferManager::new(disk, 2 * THREADS));

    let mut tags = Vec::new();
    for i in 0..PAGES {
        let mut page = manager.new_page(file_id).unwrap();
        page.as_slice_mut().fill(i as u8);
        page.set_dirty();
        tags.push(*page.tag());
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let mut tags = tags.clone();

            thread::spawn(move || {
                let mut rng = rand::thread_rng();

                for _ in 0..ROUNDS {
                    tags.shuffle(&mut rng);

                    for tag in &tags {
                        let mut page = manager.fetch_page(*tag).unwrap();
                        let expected = tag.page_num as u8;
                        assert!(page.as_slice().iter().all(|&b| b == expected));

                        // Rewrite the same image to exercise write-backs
                        // under contention.
                        page.as_slice_mut().fill(expected);
                        page.set_dirty();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for tag in &tags {
        let page = manager.fetch_page(*tag).unwrap();
        assert_eq!(page.as_slice(), vec![tag.page_num as u8; PAGE_SIZE]);
    }
}
