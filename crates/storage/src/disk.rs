use {
    crate::{buffer::PageTag, FileId, PageNum, PAGE_SIZE},
    parking_lot::RwLock,
    snafu::{prelude::*, Backtrace},
    std::{
        collections::HashMap,
        fs::{self, File, OpenOptions},
        os::unix::fs::FileExt,
        path::{Path, PathBuf},
    },
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("file {} is not registered with the disk manager", file_id))]
    UnknownFile {
        backtrace: Backtrace,
        file_id: FileId,
    },

    #[snafu(display("page i/o failed"))]
    Io {
        backtrace: Backtrace,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Owns the open database files and performs all page-granular I/O. Handles
/// are minted at [`open`](DiskManager::open); page numbers are derived from
/// the file length, so a freshly allocated page always reads back as zeros.
pub struct DiskManager {
    data_dir: PathBuf,
    files: RwLock<FileTable>,
}

#[derive(Default)]
struct FileTable {
    by_path: HashMap<PathBuf, FileId>,
    opened: Vec<File>,
}

impl FileTable {
    fn get(&self, file_id: FileId) -> Result<&File> {
        self.opened
            .get(file_id as usize)
            .context(UnknownFileSnafu { file_id })
    }
}

impl DiskManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            files: RwLock::new(FileTable::default()),
        }
    }

    /// Opens `file_path` under the data directory, creating it (and any
    /// missing parent directories) if absent, and returns its handle.
    /// Reopening a path yields the handle minted first.
    pub fn open(&self, file_path: &Path) -> Result<FileId> {
        let mut files = self.files.write();

        if let Some(&file_id) = files.by_path.get(file_path) {
            return Ok(file_id);
        }

        let path = self.data_dir.join(file_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(IoSnafu)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .context(IoSnafu)?;

        let file_id = files.opened.len() as FileId;
        files.by_path.insert(file_path.to_path_buf(), file_id);
        files.opened.push(file);

        Ok(file_id)
    }

    /// Reads exactly `data.len()` bytes of the page named by `tag`.
    pub fn read_page(&self, tag: &PageTag, data: &mut [u8]) -> Result<()> {
        let files = self.files.read();
        let file = files.get(tag.file_id)?;

        file.read_exact_at(data, tag.offset()).context(IoSnafu)
    }

    /// Writes `data` under the page named by `tag`.
    pub fn write_page(&self, tag: &PageTag, data: &[u8]) -> Result<()> {
        let files = self.files.read();
        let file = files.get(tag.file_id)?;

        file.write_all_at(data, tag.offset()).context(IoSnafu)
    }

    /// Reserves the next page number of `file_id`, extending the file with a
    /// zeroed page.
    pub fn allocate_page(&self, file_id: FileId) -> Result<PageNum> {
        // Write lock: the length probe and the extension must be atomic.
        let files = self.files.write();
        let file = files.get(file_id)?;

        let len = file.metadata().context(IoSnafu)?.len();
        let page_num = (len / PAGE_SIZE as u64) as PageNum;
        file.set_len(len + PAGE_SIZE as u64).context(IoSnafu)?;

        Ok(page_num)
    }

    /// Number of pages currently allocated in `file_id`.
    pub fn page_count(&self, file_id: FileId) -> Result<PageNum> {
        let files = self.files.read();
        let file = files.get(file_id)?;

        let len = file.metadata().context(IoSnafu)?.len();

        Ok((len / PAGE_SIZE as u64) as PageNum)
    }
}
