//! Dense and sparse layouts of layer tile data within a byte store.
//!
//! A storage backend knows how tiles are laid out in the store. It keeps
//! whatever metadata it needs in memory (`load_state`/`save_state`) and moves
//! one page of tiles at a time between the store and a `TilePage`
//! (`load_cache`/`save_cache`). A page with index `p` covers the tiles at
//! row-major offsets `p * page.len()` onward; a page running past the last
//! tile of the layer has its extra slots filled with the default tile.

pub mod dense;
pub mod sparse;

use crate::descriptor::{
    LayerDescriptor,
    Storage,
};
use self::{
    dense::DenseStorage,
    sparse::SparseStorage,
};
use tile_data::{
    ByteStore,
    Tile,
    TilePage,
};
use std::fmt::Debug;
use vek::*;
use anyhow::*;


/// Layout of one layer's tile data within a byte store.
pub trait TileStorage: Debug {
    /// Load backend metadata from the store.
    fn load_state(&mut self, store: &dyn ByteStore) -> Result<()>;

    /// Persist backend metadata to the store.
    fn save_state(&self, store: &mut dyn ByteStore) -> Result<()>;

    /// Fill `page` with the tiles of page `page_index`.
    fn load_cache(&self, store: &dyn ByteStore, page: &mut TilePage, page_index: usize) -> Result<()>;

    /// Write the tiles of `page` back as page `page_index`.
    fn save_cache(&mut self, store: &mut dyn ByteStore, page: &TilePage, page_index: usize) -> Result<()>;

    /// Bytes of in-memory metadata held by the backend.
    fn byte_count(&self) -> usize;
}


/// Construct the backend for a layer of `layer_size` tiles. Its state still
/// has to be loaded.
pub fn new_storage(storage: Storage, default_tile: Tile, layer_size: Extent2<u32>) -> Box<dyn TileStorage> {
    match storage {
        Storage::Dense => Box::new(DenseStorage::new(default_tile, layer_size)),
        Storage::Sparse => Box::new(SparseStorage::new(default_tile, layer_size)),
    }
}

/// Lay out fresh tile data for the layer on a map of `map_size` in `store`,
/// replacing any previous content.
pub fn initialize(desc: &LayerDescriptor, map_size: Extent2<u32>, store: &mut dyn ByteStore) -> Result<()> {
    let layer_size = desc.layer_size(map_size);
    let result = match desc.storage {
        Storage::Dense => dense::initialize(desc.default_tile(), layer_size, store),
        Storage::Sparse => sparse::initialize(desc.default_tile(), layer_size, store),
    };
    result.with_context(|| format!("initializing tile data of layer {:?}", desc.name))
}

/// Copy the layer's tiles from `src`, laid out for a map of `src_map_size`, to
/// `dst`, which must already be initialized for `dst_map_size`. Tiles outside
/// the new bounds are dropped; tiles outside the old bounds keep the default.
pub fn resize_copy(
    desc: &LayerDescriptor,
    src_map_size: Extent2<u32>,
    dst_map_size: Extent2<u32>,
    src: &dyn ByteStore,
    dst: &mut dyn ByteStore,
) -> Result<()> {
    let src_size = desc.layer_size(src_map_size);
    let dst_size = desc.layer_size(dst_map_size);
    debug!(
        layer=%desc.name,
        src_w=%src_size.w, src_h=%src_size.h,
        dst_w=%dst_size.w, dst_h=%dst_size.h,
        "resizing layer tile data",
    );
    let result = match desc.storage {
        Storage::Dense => dense::resize_copy(desc.default_tile(), src_size, dst_size, src, dst),
        Storage::Sparse => sparse::resize_copy(desc.default_tile(), src_size, dst_size, src, dst),
    };
    result.with_context(|| format!("resizing tile data of layer {:?}", desc.name))
}

// number of real tiles in page `page_index`
fn page_tile_count(layer_size: Extent2<u32>, page_len: usize, page_index: usize) -> usize {
    let layer_tiles = layer_size.w as usize * layer_size.h as usize;
    let first = page_index * page_len;
    page_len.min(layer_tiles.saturating_sub(first))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn encode_tile(tile: Tile) -> ([u8; 4], usize) {
    let mut buf = [0; 4];
    let size = tile.byte_size();
    tile.encode(&mut buf[..size]);
    (buf, size)
}
