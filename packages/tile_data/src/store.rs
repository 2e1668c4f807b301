//! The byte-addressable store that tile data lives in.

use std::{
    path::Path,
    fs,
};
use anyhow::*;


/// A growable, byte-addressable backing store.
///
/// Reads and writes must stay within the current size; the store only grows
/// through `resize` and `append_chunk`.
pub trait ByteStore {
    /// Fill `dst` with the bytes starting at `offset`.
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<()>;

    /// Overwrite the bytes starting at `offset` with `src`.
    fn write(&mut self, src: &[u8], offset: u64) -> Result<()>;

    /// Grow or truncate to exactly `byte_count` bytes. New bytes are zero.
    fn resize(&mut self, byte_count: u64) -> Result<()>;

    /// Grow by `byte_count` zero bytes, returning the offset of the new chunk.
    fn append_chunk(&mut self, byte_count: u64) -> Result<u64> {
        let offset = self.byte_count();
        self.resize(offset + byte_count)?;
        Ok(offset)
    }

    /// Write `pattern` `repeat_count` times back to back, starting at `offset`.
    fn clear_chunk(&mut self, pattern: &[u8], offset: u64, repeat_count: u64) -> Result<()> {
        // one write per batch of repeats
        const BATCH_BYTES: usize = 1 << 16;
        if pattern.is_empty() || repeat_count == 0 {
            return Ok(());
        }
        let per_batch = (BATCH_BYTES / pattern.len()).max(1) as u64;
        let buf = pattern.repeat(per_batch.min(repeat_count) as usize);
        let mut offset = offset;
        let mut remaining = repeat_count;
        while remaining > 0 {
            let n = per_batch.min(remaining);
            let bytes = &buf[..n as usize * pattern.len()];
            self.write(bytes, offset)?;
            offset += bytes.len() as u64;
            remaining -= n;
        }
        Ok(())
    }

    /// Current size in bytes.
    fn byte_count(&self) -> u64;
}

impl<T: ByteStore + ?Sized> ByteStore for Box<T> {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<()> {
        (**self).read(dst, offset)
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
        (**self).write(src, offset)
    }

    fn resize(&mut self, byte_count: u64) -> Result<()> {
        (**self).resize(byte_count)
    }

    fn append_chunk(&mut self, byte_count: u64) -> Result<u64> {
        (**self).append_chunk(byte_count)
    }

    fn clear_chunk(&mut self, pattern: &[u8], offset: u64, repeat_count: u64) -> Result<()> {
        (**self).clear_chunk(pattern, offset, repeat_count)
    }

    fn byte_count(&self) -> u64 {
        (**self).byte_count()
    }
}

// error unless offset..offset+len lies within the store
pub(crate) fn check_range(offset: u64, len: usize, byte_count: u64) -> Result<()> {
    let end = offset.checked_add(len as u64)
        .ok_or_else(|| anyhow!("byte range overflows"))?;
    ensure!(
        end <= byte_count,
        "byte range {}..{} out of bounds of store of size {}",
        offset, end, byte_count,
    );
    Ok(())
}


/// In-memory byte store.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VecStore(Vec<u8>);

impl VecStore {
    pub fn new() -> Self {
        VecStore(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        VecStore(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Read the whole content of a file into memory.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(VecStore(bytes))
    }

    /// Write the whole content out to a file, replacing it.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, &self.0)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl ByteStore for VecStore {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<()> {
        check_range(offset, dst.len(), self.byte_count())?;
        let start = offset as usize;
        dst.copy_from_slice(&self.0[start..start + dst.len()]);
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
        check_range(offset, src.len(), self.byte_count())?;
        let start = offset as usize;
        self.0[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn resize(&mut self, byte_count: u64) -> Result<()> {
        self.0.resize(byte_count as usize, 0);
        Ok(())
    }

    fn clear_chunk(&mut self, pattern: &[u8], offset: u64, repeat_count: u64) -> Result<()> {
        let len = pattern.len() * repeat_count as usize;
        check_range(offset, len, self.byte_count())?;
        if pattern.is_empty() {
            return Ok(());
        }
        let start = offset as usize;
        for chunk in self.0[start..start + len].chunks_exact_mut(pattern.len()) {
            chunk.copy_from_slice(pattern);
        }
        Ok(())
    }

    fn byte_count(&self) -> u64 {
        self.0.len() as u64
    }
}


#[test]
fn test_vec_store_append_and_clear() {
    let mut store = VecStore::new();
    store.resize(4).unwrap();
    let offset = store.append_chunk(6).unwrap();
    assert_eq!(offset, 4);
    store.clear_chunk(&[1, 2], offset, 3).unwrap();
    assert_eq!(store.as_bytes(), &[0, 0, 0, 0, 1, 2, 1, 2, 1, 2]);
}

#[test]
fn test_vec_store_out_of_bounds() {
    let mut store = VecStore::from_bytes(vec![0; 4]);
    let mut buf = [0; 2];
    assert!(store.read(&mut buf, 3).is_err());
    assert!(store.write(&[1, 2, 3], 2).is_err());
    assert!(store.clear_chunk(&[1], 2, 3).is_err());
    store.write(&[9, 8], 2).unwrap();
    store.read(&mut buf, 2).unwrap();
    assert_eq!(buf, [9, 8]);
}

#[test]
fn test_default_clear_chunk_batches() {
    // exercise the provided method through a store that only overrides the basics
    struct Counting(VecStore, usize);

    impl ByteStore for Counting {
        fn read(&self, dst: &mut [u8], offset: u64) -> Result<()> {
            self.0.read(dst, offset)
        }

        fn write(&mut self, src: &[u8], offset: u64) -> Result<()> {
            self.1 += 1;
            self.0.write(src, offset)
        }

        fn resize(&mut self, byte_count: u64) -> Result<()> {
            self.0.resize(byte_count)
        }

        fn byte_count(&self) -> u64 {
            self.0.byte_count()
        }
    }

    let mut store = Counting(VecStore::new(), 0);
    let offset = store.append_chunk(3 * 50_000).unwrap();
    store.clear_chunk(&[7, 7, 7], offset, 50_000).unwrap();
    assert!(store.0.as_bytes().iter().all(|&b| b == 7));
    assert_eq!(store.1, 3);
}
