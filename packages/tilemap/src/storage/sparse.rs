//! Sparse layout: tiles are grouped into rectangular blocks, and a block is
//! only materialized in the store once a non-default tile is written to it.
//!
//! ```text
//! u32 magic = 0x8a23d33d
//! u32 version = 1
//! u16 block_width
//! u16 block_height
//! u32 block_count
//! block_count times:
//!     u32 block_index
//!     [tile; block_width * block_height]
//! ```
//!
//! Blocks appear in the order they were allocated. Block `i` covers block row
//! `i / blocks_wide` and block column `i % blocks_wide`, where `blocks_wide` is
//! the number of blocks needed to span the layer width.

use super::{
    TileStorage,
    page_tile_count,
    read_u16,
    read_u32,
    encode_tile,
};
use crate::block_size::sparse_block_size;
use tile_data::{
    ByteStore,
    Tile,
    TilePage,
};
use vek::*;
use anyhow::{
    Result,
    ensure,
    anyhow,
};


pub const MAGIC: u32 = 0x8a23d33d;
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 16;
pub const BLOCK_HEADER_SIZE: u64 = 4;

// in-memory size of one block table entry
const BLOCK_ENTRY_BYTES: usize = 8;


fn encode_header(block_size: Extent2<u32>, block_count: u32) -> [u8; HEADER_SIZE as usize] {
    let mut buf = [0; HEADER_SIZE as usize];
    buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf[8..10].copy_from_slice(&(block_size.w as u16).to_le_bytes());
    buf[10..12].copy_from_slice(&(block_size.h as u16).to_le_bytes());
    buf[12..16].copy_from_slice(&block_count.to_le_bytes());
    buf
}

/// Write a header with no blocks, replacing previous content.
pub fn initialize(default_tile: Tile, layer_size: Extent2<u32>, store: &mut dyn ByteStore) -> Result<()> {
    let block_size = sparse_block_size(default_tile.byte_size(), layer_size);
    store.resize(HEADER_SIZE)?;
    store.write(&encode_header(block_size, 0), 0)?;
    debug!(
        layer_width=%layer_size.w,
        layer_height=%layer_size.h,
        block_width=%block_size.w,
        block_height=%block_size.h,
        "initialized sparse tile data",
    );
    Ok(())
}

/// Copy tile by tile, since the old and new block shapes may differ. Absent
/// source blocks and default tiles are skipped, so no destination block is
/// allocated just to hold default tiles.
pub fn resize_copy(
    default_tile: Tile,
    src_size: Extent2<u32>,
    dst_size: Extent2<u32>,
    src: &dyn ByteStore,
    dst: &mut dyn ByteStore,
) -> Result<()> {
    let mut src_storage = SparseStorage::new(default_tile, src_size);
    let mut dst_storage = SparseStorage::new(default_tile, dst_size);
    src_storage.load_state(src)?;
    dst_storage.load_state(dst)?;

    let (default_bytes, tile_size) = encode_tile(default_tile);
    let default_bytes = &default_bytes[..tile_size];
    let mut tile_buf = [0; 4];
    let tile_buf = &mut tile_buf[..tile_size];

    for row in 0..src_size.h.min(dst_size.h) {
        for col in 0..src_size.w.min(dst_size.w) {
            let (src_index, src_inside) = src_storage.locate(row, col);
            let Some(src_block) = src_storage.find_block(src_index).ok() else {
                continue;
            };
            let src_offset = src_storage.tile_offset(src_block, src_inside);
            src.read(tile_buf, src_offset)?;
            if tile_buf[..] == default_bytes[..] {
                continue;
            }

            let (dst_index, dst_inside) = dst_storage.locate(row, col);
            let dst_block = match dst_storage.find_block(dst_index) {
                Ok(i) => i,
                Err(i) => dst_storage.allocate_block(dst, dst_index, i)?,
            };
            let dst_offset = dst_storage.tile_offset(dst_block, dst_inside);
            dst.write(tile_buf, dst_offset)?;
        }
    }
    dst_storage.save_state(dst)
}


// one materialized block
#[derive(Debug, Copy, Clone)]
struct Block {
    index: u32,
    // store offset of the first tile, just past the block header
    data_offset: u64,
}

/// Sparse storage backend. Holds the block table, sorted by block index.
#[derive(Debug, Clone)]
pub struct SparseStorage {
    default_tile: Tile,
    layer_size: Extent2<u32>,
    block_size: Extent2<u32>,
    blocks: Vec<Block>,
}

impl SparseStorage {
    pub fn new(default_tile: Tile, layer_size: Extent2<u32>) -> Self {
        SparseStorage {
            default_tile,
            layer_size,
            block_size: sparse_block_size(default_tile.byte_size(), layer_size),
            blocks: Vec::new(),
        }
    }

    pub fn block_size(&self) -> Extent2<u32> {
        self.block_size
    }

    /// Number of materialized blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn blocks_wide(&self) -> u32 {
        (self.layer_size.w + self.block_size.w - 1) / self.block_size.w
    }

    fn block_bytes(&self) -> u64 {
        self.block_size.w as u64 * self.block_size.h as u64 * self.default_tile.byte_size() as u64
    }

    // block index owning a tile, and the tile's index within that block
    fn locate(&self, row: u32, col: u32) -> (u32, usize) {
        debug_assert!(row < self.layer_size.h && col < self.layer_size.w);
        let block_index = (row / self.block_size.h) * self.blocks_wide() + col / self.block_size.w;
        let inside = (row % self.block_size.h) * self.block_size.w + col % self.block_size.w;
        (block_index, inside as usize)
    }

    // position in the block table, or where it would be inserted
    fn find_block(&self, block_index: u32) -> std::result::Result<usize, usize> {
        self.blocks.binary_search_by_key(&block_index, |block| block.index)
    }

    fn tile_offset(&self, block: usize, inside: usize) -> u64 {
        self.blocks[block].data_offset + (inside * self.default_tile.byte_size()) as u64
    }

    // append a default-filled block to the store and insert it at `position`
    fn allocate_block(
        &mut self,
        store: &mut dyn ByteStore,
        block_index: u32,
        position: usize,
    ) -> Result<usize> {
        let (pattern, tile_size) = encode_tile(self.default_tile);
        let block_tiles = self.block_size.w as u64 * self.block_size.h as u64;
        let base = store.append_chunk(BLOCK_HEADER_SIZE + self.block_bytes())?;
        store.write(&block_index.to_le_bytes(), base)?;
        let data_offset = base + BLOCK_HEADER_SIZE;
        store.clear_chunk(&pattern[..tile_size], data_offset, block_tiles)?;
        self.blocks.insert(position, Block {
            index: block_index,
            data_offset,
        });
        trace!(%block_index, %data_offset, "allocated sparse tile block");
        Ok(position)
    }
}

impl TileStorage for SparseStorage {
    fn load_state(&mut self, store: &dyn ByteStore) -> Result<()> {
        ensure!(
            store.byte_count() >= HEADER_SIZE,
            "sparse tile data shorter than its header",
        );
        let mut header = [0; HEADER_SIZE as usize];
        store.read(&mut header, 0)?;
        ensure!(read_u32(&header, 0) == MAGIC, "sparse tile data magic bytes wrong");
        let version = read_u32(&header, 4);
        ensure!(version == VERSION, "unsupported sparse tile data version {}", version);
        let block_size = Extent2::new(read_u16(&header, 8) as u32, read_u16(&header, 10) as u32);
        ensure!(
            block_size.w > 0 && block_size.h > 0,
            "sparse tile data has empty block size",
        );
        let block_count = read_u32(&header, 12);
        self.block_size = block_size;

        let stride = BLOCK_HEADER_SIZE + self.block_bytes();
        let end = stride.checked_mul(block_count as u64)
            .and_then(|table| table.checked_add(HEADER_SIZE))
            .ok_or_else(|| anyhow!(
                "sparse tile data block table of {} {}x{} blocks overflows",
                block_count, block_size.w, block_size.h,
            ))?;
        ensure!(
            store.byte_count() >= end,
            "sparse tile data holds {} bytes, {} blocks need {}",
            store.byte_count(), block_count, end,
        );

        let mut blocks = Vec::with_capacity(block_count as usize);
        let mut block_header = [0; BLOCK_HEADER_SIZE as usize];
        for i in 0..block_count as u64 {
            let base = HEADER_SIZE + stride * i;
            store.read(&mut block_header, base)?;
            blocks.push(Block {
                index: read_u32(&block_header, 0),
                data_offset: base + BLOCK_HEADER_SIZE,
            });
        }
        blocks.sort_by_key(|block| block.index);
        self.blocks = blocks;
        Ok(())
    }

    fn save_state(&self, store: &mut dyn ByteStore) -> Result<()> {
        store.write(&encode_header(self.block_size, self.blocks.len() as u32), 0)
    }

    fn load_cache(&self, store: &dyn ByteStore, page: &mut TilePage, page_index: usize) -> Result<()> {
        let count = page_tile_count(self.layer_size, page.len(), page_index);
        let first = page_index * page.len();
        let width = self.layer_size.w as usize;

        // consecutive tiles mostly share a block
        let mut last: Option<(u32, Option<usize>)> = None;
        for i in 0..count {
            let tile = first + i;
            let (block_index, inside) = self.locate((tile / width) as u32, (tile % width) as u32);
            let block = match last {
                Some((index, block)) if index == block_index => block,
                _ => {
                    let block = self.find_block(block_index).ok();
                    last = Some((block_index, block));
                    block
                }
            };
            match block {
                Some(block) => store.read(page.tile_bytes_mut(i), self.tile_offset(block, inside))?,
                None => page.set(i, self.default_tile),
            }
        }
        page.fill_from(count, self.default_tile);
        Ok(())
    }

    fn save_cache(&mut self, store: &mut dyn ByteStore, page: &TilePage, page_index: usize) -> Result<()> {
        let count = page_tile_count(self.layer_size, page.len(), page_index);
        let first = page_index * page.len();
        let width = self.layer_size.w as usize;

        for i in 0..count {
            let tile = first + i;
            let (block_index, inside) = self.locate((tile / width) as u32, (tile % width) as u32);
            let block = match self.find_block(block_index) {
                Ok(block) => block,
                Err(_) if page.get(i) == self.default_tile => continue,
                Err(position) => self.allocate_block(store, block_index, position)?,
            };
            store.write(page.tile_bytes(i), self.tile_offset(block, inside))?;
        }
        Ok(())
    }

    fn byte_count(&self) -> usize {
        self.blocks.len() * BLOCK_ENTRY_BYTES
    }
}


#[test]
fn test_sparse_header_layout() {
    use tile_data::VecStore;

    let mut store = VecStore::new();
    initialize(Tile::DataUInt8 { data: 0 }, Extent2::new(64, 64), &mut store).unwrap();
    assert_eq!(store.as_bytes(), &[
        0x3d, 0xd3, 0x23, 0x8a,
        1, 0, 0, 0,
        32, 0,
        8, 0,
        0, 0, 0, 0,
    ]);
}

#[test]
fn test_sparse_writes_allocate_blocks_in_write_order() {
    use tile_data::VecStore;

    let default_tile = Tile::DataUInt8 { data: 0 };
    let size = Extent2::new(64, 64);
    let mut store = VecStore::new();
    initialize(default_tile, size, &mut store).unwrap();

    let mut storage = SparseStorage::new(default_tile, size);
    storage.load_state(&store).unwrap();
    let block_size = storage.block_size();

    // one page per layer row; write the last row first so blocks land out of order
    let mut page = TilePage::new(default_tile, 64);
    page.set(40, Tile::DataUInt8 { data: 3 });
    storage.save_cache(&mut store, &page, 63).unwrap();
    page.set(0, Tile::DataUInt8 { data: 4 });
    storage.save_cache(&mut store, &page, 0).unwrap();
    storage.save_state(&mut store).unwrap();
    assert_eq!(storage.block_count(), 3);
    let block_bytes = (block_size.w * block_size.h) as usize;
    assert_eq!(store.as_bytes().len(), 16 + 3 * (4 + block_bytes));

    let mut reloaded = SparseStorage::new(default_tile, size);
    reloaded.load_state(&store).unwrap();
    assert_eq!(reloaded.block_count(), 3);
    assert_eq!(reloaded.byte_count(), 24);
    let indices = reloaded.blocks.iter().map(|block| block.index).collect::<Vec<_>>();
    let mut sorted = indices.clone();
    sorted.sort();
    assert_eq!(indices, sorted);

    let mut page = TilePage::new(default_tile, 64);
    reloaded.load_cache(&store, &mut page, 63).unwrap();
    assert_eq!(page.get(40), Tile::DataUInt8 { data: 3 });
    assert_eq!(page.get(0), default_tile);
    reloaded.load_cache(&store, &mut page, 0).unwrap();
    assert_eq!(page.get(0), Tile::DataUInt8 { data: 4 });
    assert_eq!(page.get(1), default_tile);
    assert_eq!(page.get(40), Tile::DataUInt8 { data: 3 });
}

#[test]
fn test_sparse_default_writes_do_not_allocate() {
    use tile_data::VecStore;

    let default_tile = Tile::RenderDataSInt8 { index: 2, data: -1 };
    let size = Extent2::new(16, 16);
    let mut store = VecStore::new();
    initialize(default_tile, size, &mut store).unwrap();
    let mut storage = SparseStorage::new(default_tile, size);
    storage.load_state(&store).unwrap();

    let page = TilePage::new(default_tile, 32);
    storage.save_cache(&mut store, &page, 0).unwrap();
    assert_eq!(storage.block_count(), 0);
    assert_eq!(store.as_bytes().len(), 16);
}

#[test]
fn test_sparse_oversized_block_table_is_rejected() {
    use tile_data::VecStore;

    let default_tile = Tile::RenderDataSInt24 { index: 0, data: 0 };
    let header = encode_header(Extent2::new(0xffff, 0xffff), u32::MAX);
    let store = VecStore::from_bytes(header.to_vec());
    let mut storage = SparseStorage::new(default_tile, Extent2::new(8, 8));
    assert!(storage.load_state(&store).is_err());
}
