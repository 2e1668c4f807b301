//! Dense layout: a small header followed by every tile, row-major.
//!
//! ```text
//! u32 magic = 0x87fbbeea
//! u32 version = 1
//! [tile; width * height]
//! ```

use super::{
    TileStorage,
    page_tile_count,
    read_u32,
    encode_tile,
};
use tile_data::{
    ByteStore,
    Tile,
    TilePage,
};
use vek::*;
use anyhow::*;


pub const MAGIC: u32 = 0x87fbbeea;
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 8;


fn encode_header() -> [u8; HEADER_SIZE as usize] {
    let mut buf = [0; HEADER_SIZE as usize];
    buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf
}

/// Write a header and `layer_size` default tiles, replacing previous content.
pub fn initialize(default_tile: Tile, layer_size: Extent2<u32>, store: &mut dyn ByteStore) -> Result<()> {
    let (pattern, tile_size) = encode_tile(default_tile);
    let layer_tiles = layer_size.w as u64 * layer_size.h as u64;

    store.resize(HEADER_SIZE)?;
    store.write(&encode_header(), 0)?;
    let offset = store.append_chunk(layer_tiles * tile_size as u64)?;
    store.clear_chunk(&pattern[..tile_size], offset, layer_tiles)?;

    debug!(
        layer_width=%layer_size.w,
        layer_height=%layer_size.h,
        "initialized dense tile data",
    );
    Ok(())
}

/// Copy row by row. Columns past the old width are filled with the default
/// tile, as are rows past the old height.
pub fn resize_copy(
    default_tile: Tile,
    src_size: Extent2<u32>,
    dst_size: Extent2<u32>,
    src: &dyn ByteStore,
    dst: &mut dyn ByteStore,
) -> Result<()> {
    let (pattern, tile_size) = encode_tile(default_tile);
    let src_row_bytes = src_size.w as usize * tile_size;
    let dst_row_bytes = dst_size.w as usize * tile_size;
    let copy_rows = src_size.h.min(dst_size.h);
    let copy_bytes = src_row_bytes.min(dst_row_bytes);

    let mut default_row = vec![0; dst_row_bytes];
    for chunk in default_row.chunks_exact_mut(tile_size) {
        chunk.copy_from_slice(&pattern[..tile_size]);
    }

    let mut row_buf = vec![0; copy_bytes];
    for row in 0..copy_rows as u64 {
        let src_offset = HEADER_SIZE + row * src_row_bytes as u64;
        let dst_offset = HEADER_SIZE + row * dst_row_bytes as u64;
        src.read(&mut row_buf, src_offset)?;
        dst.write(&row_buf, dst_offset)?;

        if dst_row_bytes > src_row_bytes {
            dst.write(
                &default_row[src_row_bytes..],
                dst_offset + src_row_bytes as u64,
            )?;
        }
    }
    for row in copy_rows as u64..dst_size.h as u64 {
        dst.write(&default_row, HEADER_SIZE + row * dst_row_bytes as u64)?;
    }
    Ok(())
}


/// Dense storage backend. Holds no metadata beyond the layer geometry.
#[derive(Debug, Clone)]
pub struct DenseStorage {
    default_tile: Tile,
    layer_size: Extent2<u32>,
}

impl DenseStorage {
    pub fn new(default_tile: Tile, layer_size: Extent2<u32>) -> Self {
        DenseStorage {
            default_tile,
            layer_size,
        }
    }

    fn tile_offset(&self, tile_index: usize) -> u64 {
        HEADER_SIZE + (tile_index * self.default_tile.byte_size()) as u64
    }
}

impl TileStorage for DenseStorage {
    fn load_state(&mut self, store: &dyn ByteStore) -> Result<()> {
        ensure!(
            store.byte_count() >= HEADER_SIZE,
            "dense tile data shorter than its header",
        );
        let mut header = [0; HEADER_SIZE as usize];
        store.read(&mut header, 0)?;
        ensure!(read_u32(&header, 0) == MAGIC, "dense tile data magic bytes wrong");
        let version = read_u32(&header, 4);
        ensure!(version == VERSION, "unsupported dense tile data version {}", version);

        let expected = self.tile_offset(self.layer_size.w as usize * self.layer_size.h as usize);
        ensure!(
            store.byte_count() >= expected,
            "dense tile data holds {} bytes, expected {}",
            store.byte_count(), expected,
        );
        Ok(())
    }

    fn save_state(&self, _store: &mut dyn ByteStore) -> Result<()> {
        Ok(())
    }

    fn load_cache(&self, store: &dyn ByteStore, page: &mut TilePage, page_index: usize) -> Result<()> {
        let count = page_tile_count(self.layer_size, page.len(), page_index);
        let bytes = count * self.default_tile.byte_size();
        let offset = self.tile_offset(page_index * page.len());
        store.read(&mut page.bytes_mut()[..bytes], offset)?;
        page.fill_from(count, self.default_tile);
        Ok(())
    }

    fn save_cache(&mut self, store: &mut dyn ByteStore, page: &TilePage, page_index: usize) -> Result<()> {
        let count = page_tile_count(self.layer_size, page.len(), page_index);
        let bytes = count * self.default_tile.byte_size();
        let offset = self.tile_offset(page_index * page.len());
        store.write(&page.bytes()[..bytes], offset)
    }

    fn byte_count(&self) -> usize {
        0
    }
}


#[cfg(test)]
fn tile_values(store: &dyn ByteStore, size: Extent2<u32>) -> Vec<Vec<u8>> {
    let mut rows = Vec::new();
    for row in 0..size.h as u64 {
        let mut buf = vec![0; size.w as usize];
        store.read(&mut buf, HEADER_SIZE + row * size.w as u64).unwrap();
        rows.push(buf);
    }
    rows
}

#[test]
fn test_dense_initialize_layout() {
    use tile_data::VecStore;

    let mut store = VecStore::new();
    initialize(Tile::DataUInt16 { data: 0x0102 }, Extent2::new(3, 2), &mut store).unwrap();
    assert_eq!(&store.as_bytes()[..8], &[0xea, 0xbe, 0xfb, 0x87, 1, 0, 0, 0]);
    assert_eq!(store.as_bytes().len(), 8 + 3 * 2 * 2);
    assert_eq!(&store.as_bytes()[8..10], &[0x02, 0x01]);
    DenseStorage::new(Tile::DataUInt16 { data: 0 }, Extent2::new(3, 2)).load_state(&store).unwrap();
}

#[test]
fn test_dense_load_state_rejects_garbage() {
    use tile_data::VecStore;

    let mut storage = DenseStorage::new(Tile::DataUInt8 { data: 0 }, Extent2::new(2, 2));
    assert!(storage.load_state(&VecStore::from_bytes(vec![0; 4])).is_err());
    assert!(storage.load_state(&VecStore::from_bytes(vec![0; 12])).is_err());

    let mut store = VecStore::new();
    initialize(Tile::DataUInt8 { data: 0 }, Extent2::new(2, 1), &mut store).unwrap();
    assert!(storage.load_state(&store).is_err(), "store too small for 2x2 layer");
}

#[test]
fn test_dense_resize_copy_crops_and_extends() {
    use tile_data::VecStore;

    let default_tile = Tile::DataUInt8 { data: 9 };
    let old = Extent2::new(4, 4);
    let new = Extent2::new(6, 3);
    let mut src = VecStore::new();
    initialize(default_tile, old, &mut src).unwrap();
    let content = (0..16).collect::<Vec<u8>>();
    src.write(&content, HEADER_SIZE).unwrap();

    let mut dst = VecStore::new();
    initialize(default_tile, new, &mut dst).unwrap();
    resize_copy(default_tile, old, new, &src, &mut dst).unwrap();

    assert_eq!(tile_values(&dst, new), vec![
        vec![0, 1, 2, 3, 9, 9],
        vec![4, 5, 6, 7, 9, 9],
        vec![8, 9, 10, 11, 9, 9],
    ]);
}

#[test]
fn test_dense_resize_copy_grows_rows() {
    use tile_data::VecStore;

    let default_tile = Tile::DataUInt8 { data: 0 };
    let old = Extent2::new(3, 1);
    let new = Extent2::new(2, 3);
    let mut src = VecStore::new();
    initialize(default_tile, old, &mut src).unwrap();
    src.write(&[1, 2, 3], HEADER_SIZE).unwrap();

    let mut dst = VecStore::new();
    initialize(Tile::DataUInt8 { data: 7 }, new, &mut dst).unwrap();
    resize_copy(default_tile, old, new, &src, &mut dst).unwrap();

    assert_eq!(tile_values(&dst, new), vec![
        vec![1, 2],
        vec![0, 0],
        vec![0, 0],
    ]);
}
