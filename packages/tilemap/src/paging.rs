//! The cache window through which a layer's tiles are accessed.

use crate::storage::TileStorage;
use tile_data::{
    ByteStore,
    Tile,
    TilePage,
};
use std::fmt::{self, Formatter, Debug};
use vek::*;
use anyhow::*;


/// A loaded layer: its storage backend, its byte store, and one resident page
/// of tiles.
///
/// Tile `(row, col)` lives at row-major offset `row * width + col`, which falls
/// in page `offset / cache_size`. Accessing a tile outside the resident page
/// first writes the resident page back if it is dirty, then loads the other
/// page. Writes only mark the page dirty; they reach the store on
/// `flush_cache` or when the page is evicted.
pub struct PagingLayer {
    storage: Box<dyn TileStorage>,
    store: Box<dyn ByteStore>,
    layer_size: Extent2<u32>,
    page: TilePage,
    page_index: usize,
    dirty: bool,
}

impl Debug for PagingLayer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f
            .debug_struct("PagingLayer")
            .field("storage", &self.storage)
            .field("store_bytes", &self.store.byte_count())
            .field("layer_size", &self.layer_size)
            .field("cache_size", &self.page.len())
            .field("page_index", &self.page_index)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl PagingLayer {
    /// Attach to a store: load the backend state, then page 0.
    pub fn load(
        mut storage: Box<dyn TileStorage>,
        store: Box<dyn ByteStore>,
        layer_size: Extent2<u32>,
        default_tile: Tile,
        cache_size: usize,
    ) -> Result<Self> {
        ensure!(cache_size > 0, "cache size must not be zero");
        storage.load_state(&*store)?;
        let mut page = TilePage::new(default_tile, cache_size);
        storage.load_cache(&*store, &mut page, 0)?;
        Ok(PagingLayer {
            storage,
            store,
            layer_size,
            page,
            page_index: 0,
            dirty: false,
        })
    }

    pub fn layer_size(&self) -> Extent2<u32> {
        self.layer_size
    }

    /// Number of tiles in the cache window.
    pub fn cache_size(&self) -> usize {
        self.page.len()
    }

    /// Index of the resident page.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Whether the resident page has writes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn store(&self) -> &dyn ByteStore {
        &*self.store
    }

    pub fn storage(&self) -> &dyn TileStorage {
        &*self.storage
    }

    /// Get a tile. Panics if out of bounds.
    pub fn tile(&mut self, row: u32, col: u32) -> Result<Tile> {
        let slot = self.resolve(row, col, false)?;
        Ok(self.page.get(slot))
    }

    /// Set a tile. Panics if out of bounds or of another kind.
    pub fn set_tile(&mut self, tile: Tile, row: u32, col: u32) -> Result<()> {
        let slot = self.resolve(row, col, true)?;
        self.page.set(slot, tile);
        Ok(())
    }

    // make the page holding a tile resident and return the tile's slot in it
    fn resolve(&mut self, row: u32, col: u32, is_write: bool) -> Result<usize> {
        assert!(
            row < self.layer_size.h && col < self.layer_size.w,
            "tile (row {}, col {}) out of bounds of {}x{} layer",
            row, col, self.layer_size.w, self.layer_size.h,
        );
        let offset = row as usize * self.layer_size.w as usize + col as usize;
        let cache_size = self.page.len();
        let page_index = offset / cache_size;
        let slot = offset % cache_size;

        if page_index == self.page_index {
            self.dirty |= is_write;
            return Ok(slot);
        }

        if self.dirty {
            self.storage.save_cache(&mut *self.store, &self.page, self.page_index)?;
            trace!(page_index=%self.page_index, "evicted dirty tile page");
        }
        self.dirty = false;
        let result = self.storage.load_cache(&*self.store, &mut self.page, page_index);
        if result.is_err() {
            // page content is unknown, force a reload on next access
            self.page_index = usize::MAX;
        }
        result?;
        self.page_index = page_index;
        self.dirty = is_write;
        Ok(slot)
    }

    /// Write the resident page back if dirty.
    pub fn flush_cache(&mut self) -> Result<()> {
        if self.dirty {
            self.storage.save_cache(&mut *self.store, &self.page, self.page_index)?;
            self.dirty = false;
            trace!(page_index=%self.page_index, "flushed tile page");
        }
        Ok(())
    }

    /// Persist backend metadata. Flush first so that every write is in the
    /// store before the metadata describing it.
    pub fn save(&mut self) -> Result<()> {
        self.storage.save_state(&mut *self.store)
    }

    /// Flush, save, and hand back the store.
    pub fn unload(mut self) -> Result<Box<dyn ByteStore>> {
        self.flush_cache()?;
        self.save()?;
        Ok(self.store)
    }

    /// Detach without writing anything back.
    pub fn into_store(self) -> Box<dyn ByteStore> {
        self.store
    }
}
