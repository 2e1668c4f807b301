
use crate::store::{
    ByteStore,
    check_range,
};
use std::{
    fs::{
        File,
        OpenOptions,
    },
    io::{
        Read,
        Write,
        Seek,
        SeekFrom,
    },
    path::{
        Path,
        PathBuf,
    },
};
use anyhow::*;


/// Byte store backed by a file on disk.
///
/// Every operation goes straight to the file; there is no buffering beyond
/// what the OS does.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    path: PathBuf,
    // cached file length
    len: u64,
    read_only: bool,
}

impl FileStore {
    /// Create a new empty file, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
        debug!(path=%path.display(), "created tile data file");
        Ok(FileStore {
            file,
            path: path.to_owned(),
            len: 0,
            read_only: false,
        })
    }

    /// Open an existing file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), false)
    }

    /// Open an existing file. Any mutation fails.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), true)
    }

    fn open_inner(path: &Path, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let len = file.metadata()?.len();
        debug!(path=%path.display(), %len, %read_only, "opened tile data file");
        Ok(FileStore {
            file,
            path: path.to_owned(),
            len,
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn ensure_writable(&self) -> Result<()> {
        ensure!(!self.read_only, "{} is opened read-only", self.path.display());
        Ok(())
    }
}

impl ByteStore for FileStore {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<()> {
        check_range(offset, dst.len(), self.len)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
        self.ensure_writable()?;
        check_range(offset, src.len(), self.len)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(src)?;
        Ok(())
    }

    fn resize(&mut self, byte_count: u64) -> Result<()> {
        self.ensure_writable()?;
        self.file.set_len(byte_count)
            .with_context(|| format!("resizing {}", self.path.display()))?;
        self.len = byte_count;
        Ok(())
    }

    fn byte_count(&self) -> u64 {
        self.len
    }
}


#[test]
fn test_file_store() {
    let path = std::env::temp_dir().join(format!("tile_data_file_store_{}.bin", std::process::id()));

    let mut store = FileStore::create(&path).unwrap();
    store.resize(8).unwrap();
    store.write(&[1, 2, 3], 0).unwrap();
    let offset = store.append_chunk(4).unwrap();
    assert_eq!(offset, 8);
    store.clear_chunk(&[5, 6], offset, 2).unwrap();
    drop(store);

    let store = FileStore::open_read_only(&path).unwrap();
    assert_eq!(store.byte_count(), 12);
    let mut buf = [0; 12];
    store.read(&mut buf, 0).unwrap();
    assert_eq!(buf, [1, 2, 3, 0, 0, 0, 0, 0, 5, 6, 5, 6]);
    assert!(store.read(&mut buf, 1).is_err());

    let mut store = store;
    assert!(store.write(&[0], 0).is_err());
    assert!(store.resize(0).is_err());

    std::fs::remove_file(&path).unwrap();
}
