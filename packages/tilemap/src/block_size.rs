//! Choosing the block shape of a sparse layer.

use vek::*;


/// Candidate block edge lengths, in tiles.
pub const BLOCK_DIMENSIONS: [u32; 8] = [8, 16, 32, 64, 128, 256, 512, 1024];

// bytes of bookkeeping per block in the in-memory block table
const BLOCK_ENTRY_BYTES: f64 = 8.0;

// assumed fill ratio of both the layer and each block
const FILL_RATIO: f64 = 0.5;


/// Pick the sparse block size (in tiles) for a layer of `layer_size` tiles
/// whose tiles are `tile_size` bytes.
///
/// A sparse layer never beats a dense one when completely full, so the search
/// assumes the layer ends up at most half full with each block half full, and
/// minimizes the bytes lost to the block table, to the padding past the layer
/// edge, and to the empty half of a block. Among candidates whose half-full
/// blocks can still hold half the layer, the first with the strictly smallest
/// overhead wins, searching heights in the outer loop and widths in the inner
/// loop, both ascending.
pub fn sparse_block_size(tile_size: usize, layer_size: Extent2<u32>) -> Extent2<u32> {
    let tile_size = tile_size as f64;
    let layer_tiles = layer_size.w as f64 * layer_size.h as f64;
    let capacity_target = layer_tiles * FILL_RATIO;

    let mut selected = Extent2::new(BLOCK_DIMENSIONS[0], BLOCK_DIMENSIONS[0]);
    let mut best = f64::INFINITY;

    for &h in &BLOCK_DIMENSIONS {
        for &w in &BLOCK_DIMENSIONS {
            let block_rows = (layer_size.h as u64 + h as u64 - 1) / h as u64;
            let block_cols = (layer_size.w as u64 + w as u64 - 1) / w as u64;
            let num_blocks = (block_rows * block_cols) as f64;

            let table_overhead = num_blocks * BLOCK_ENTRY_BYTES;

            let padded_tiles = (block_rows * h as u64) as f64 * (block_cols * w as u64) as f64;
            let border_overhead = (padded_tiles - layer_tiles) * tile_size;

            let block_tiles = w as f64 * h as f64;
            let block_tiles_used = block_tiles * FILL_RATIO;
            let block_overhead = (block_tiles - block_tiles_used) * tile_size;

            let overhead = table_overhead + border_overhead + block_overhead;
            if num_blocks * block_tiles_used >= capacity_target && overhead < best {
                selected = Extent2::new(w, h);
                best = overhead;
            }
        }
    }

    selected
}


#[test]
fn test_block_size_64x64() {
    let block = sparse_block_size(1, Extent2::new(64, 64));
    assert!(BLOCK_DIMENSIONS.contains(&block.w));
    assert!(BLOCK_DIMENSIONS.contains(&block.h));
    let num_blocks = ((64 + block.w - 1) / block.w) * ((64 + block.h - 1) / block.h);
    assert!(block.w as f64 * block.h as f64 * 0.5 * num_blocks as f64 >= 0.5 * 64.0 * 64.0);
    // 32x8 and 16x16 tie, and 32x8 comes first in search order
    assert_eq!(block, Extent2::new(32, 8));
}

#[test]
fn test_block_size_prefers_small_blocks_for_small_layers() {
    assert_eq!(sparse_block_size(4, Extent2::new(8, 8)), Extent2::new(8, 8));
}

#[test]
fn test_block_size_grows_with_layer() {
    let small = sparse_block_size(1, Extent2::new(64, 64));
    let large = sparse_block_size(1, Extent2::new(4096, 4096));
    assert!(large.w * large.h > small.w * small.h);
}
