//! Runtime instance of one tilemap layer.

use crate::{
    descriptor::{
        LayerDescriptor,
        LayerFlags,
        Palette,
        PaletteEntry,
    },
    paging::PagingLayer,
    storage::new_storage,
};
use tile_data::{
    ByteStore,
    Tile,
    TileKind,
};
use std::{
    sync::Arc,
    thread,
};
use vek::*;
use anyhow::*;


/// A tile position within a layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct TileRowCol {
    pub row: u32,
    pub col: u32,
}


/// One layer of a map: a shared descriptor, per-instance flags and palette
/// overrides, and, once loaded, the paged tile data.
///
/// Tile access on an unloaded layer, and tile coordinates outside the layer,
/// are caller bugs and panic. Writes to a read-only layer are refused.
///
/// Dropping a loaded layer flushes and saves it on a best-effort basis,
/// logging failures. Call `unload` or `save` first to see errors.
#[derive(Debug)]
pub struct LayerRuntime {
    desc: Arc<LayerDescriptor>,
    map_size: Extent2<u32>,
    flags: LayerFlags,
    palette: Palette,
    paging: Option<PagingLayer>,
    // whether the layer was writable when its store was attached
    writable: bool,
}

impl LayerRuntime {
    pub fn new(desc: Arc<LayerDescriptor>, map_size: Extent2<u32>) -> Self {
        LayerRuntime {
            flags: desc.flags,
            desc,
            map_size,
            palette: Palette::new(),
            paging: None,
            writable: false,
        }
    }

    /// Attach to a store holding this layer's tile data.
    pub fn load(&mut self, store: Box<dyn ByteStore>, cache_size: usize) -> Result<()> {
        assert!(self.paging.is_none(), "layer {:?} is already loaded", self.desc.name);
        let paging = self.open_paging(store, self.map_size, cache_size)?;
        self.paging = Some(paging);
        self.writable = !self.is_read_only();
        Ok(())
    }

    /// Page over a store laid out for `map_size`, without attaching it.
    pub(crate) fn open_paging(
        &self,
        store: Box<dyn ByteStore>,
        map_size: Extent2<u32>,
        cache_size: usize,
    ) -> Result<PagingLayer> {
        let layer_size = self.desc.layer_size(map_size);
        let storage = new_storage(self.desc.storage, self.desc.default_tile(), layer_size);
        let paging = PagingLayer::load(storage, store, layer_size, self.desc.default_tile(), cache_size)
            .with_context(|| format!("loading layer {:?}", self.desc.name))?;
        debug!(
            layer=%self.desc.name,
            width=%layer_size.w,
            height=%layer_size.h,
            %cache_size,
            "loaded tilemap layer",
        );
        Ok(paging)
    }

    /// Swap in paging opened by `open_paging` for `map_size`, handing back
    /// the previous paging untouched. Panics if the layer is not loaded.
    pub(crate) fn replace_paging(&mut self, paging: PagingLayer, map_size: Extent2<u32>) -> PagingLayer {
        let old = match self.paging.replace(paging) {
            Some(old) => old,
            None => panic!("layer {:?} is not loaded", self.desc.name),
        };
        self.map_size = map_size;
        old
    }

    /// Flush, save, and detach, handing back the store. Pending writes are
    /// flushed even if the layer has since been made read-only.
    pub fn unload(&mut self) -> Result<Box<dyn ByteStore>> {
        let mut paging = self.paging.take()
            .ok_or_else(|| anyhow!("layer {:?} is not loaded", self.desc.name))?;
        let result = paging.flush_cache()
            .and_then(|()| if self.writable { paging.save() } else { Ok(()) });
        if let Err(e) = result {
            self.paging = Some(paging);
            return Err(e);
        }
        debug!(layer=%self.desc.name, "unloaded tilemap layer");
        Ok(paging.into_store())
    }

    pub fn is_loaded(&self) -> bool {
        self.paging.is_some()
    }

    fn paging(&mut self) -> &mut PagingLayer {
        match self.paging {
            Some(ref mut paging) => paging,
            None => panic!("layer {:?} is not loaded", self.desc.name),
        }
    }

    pub fn paging_layer(&self) -> Option<&PagingLayer> {
        self.paging.as_ref()
    }

    // ==== tiles ====

    pub fn tile(&mut self, row: u32, col: u32) -> Result<Tile> {
        self.paging().tile(row, col)
    }

    /// Set a whole tile. Returns false for a read-only layer. Panics if the
    /// tile is of another kind.
    pub fn set_tile(&mut self, tile: Tile, row: u32, col: u32) -> Result<bool> {
        if self.is_read_only() {
            return Ok(false);
        }
        self.paging().set_tile(tile, row, col)?;
        Ok(true)
    }

    /// Data value of a tile, or `None` if this layer's tiles have none.
    pub fn tile_value(&mut self, row: u32, col: u32) -> Result<Option<i32>> {
        Ok(self.tile(row, col)?.try_get_data_value())
    }

    /// Set the data value of a tile. Returns false if this layer's tiles have
    /// no data value or the layer is read-only.
    pub fn set_tile_value(&mut self, value: i32, row: u32, col: u32) -> Result<bool> {
        if self.is_read_only() || !self.kind().has_data_component() {
            return Ok(false);
        }
        let mut tile = self.tile(row, col)?;
        tile.try_set_data_value(value);
        self.paging().set_tile(tile, row, col)?;
        Ok(true)
    }

    /// Palette index of a tile, or `None` if this layer's tiles have none.
    pub fn tile_palette_index(&mut self, row: u32, col: u32) -> Result<Option<u8>> {
        Ok(self.tile(row, col)?.try_get_palette_index())
    }

    /// Set the palette index of a tile. Returns false if this layer's tiles
    /// have no palette index or the layer is read-only.
    pub fn set_tile_palette_index(&mut self, index: u8, row: u32, col: u32) -> Result<bool> {
        if self.is_read_only() || !self.kind().has_render_component() {
            return Ok(false);
        }
        let mut tile = self.tile(row, col)?;
        tile.try_set_palette_index(index);
        self.paging().set_tile(tile, row, col)?;
        Ok(true)
    }

    /// Write pending tile writes to the store.
    pub fn flush_cache(&mut self) -> Result<()> {
        self.paging().flush_cache()
    }

    /// Persist storage metadata. Does nothing for a layer that was read-only
    /// when loaded.
    pub fn save(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.paging().save()
    }

    // ==== geometry ====

    pub fn map_size(&self) -> Extent2<u32> {
        self.map_size
    }

    /// Change the map size. Panics if loaded.
    pub fn set_map_size(&mut self, map_size: Extent2<u32>) {
        assert!(self.paging.is_none(), "cannot resize loaded layer {:?}", self.desc.name);
        self.map_size = map_size;
    }

    /// Layer size in layer tiles.
    pub fn layer_size(&self) -> Extent2<u32> {
        self.desc.layer_size(self.map_size)
    }

    pub fn width(&self) -> u32 {
        self.layer_size().w
    }

    pub fn height(&self) -> u32 {
        self.layer_size().h
    }

    pub fn tile_size_scaler(&self) -> f32 {
        self.desc.tile_size_scaler()
    }

    /// Bytes of in-memory storage metadata, zero when unloaded.
    pub fn byte_count(&self) -> usize {
        self.paging.as_ref().map(|paging| paging.storage().byte_count()).unwrap_or(0)
    }

    // ==== descriptor ====

    pub fn descriptor(&self) -> &Arc<LayerDescriptor> {
        &self.desc
    }

    pub fn id(&self) -> &str {
        &self.desc.id
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn kind(&self) -> TileKind {
        self.desc.kind()
    }

    pub fn default_tile(&self) -> Tile {
        self.desc.default_tile()
    }

    pub fn depth(&self) -> i32 {
        self.desc.depth
    }

    pub fn render_layer(&self) -> i32 {
        self.desc.render_layer
    }

    // ==== flags ====

    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: LayerFlags) {
        self.flags = flags;
    }

    pub fn set_flag(&mut self, flag: LayerFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn test_flag(&self, flag: LayerFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_visible(&self) -> bool {
        self.test_flag(LayerFlags::VISIBLE)
    }

    pub fn is_enabled(&self) -> bool {
        self.test_flag(LayerFlags::ENABLED)
    }

    pub fn is_read_only(&self) -> bool {
        self.test_flag(LayerFlags::READ_ONLY)
    }

    // ==== palette ====
    //
    // lookups prefer this instance's entry and fall back to the descriptor's

    fn palette_entry(&self, index: u32) -> Option<&PaletteEntry> {
        self.palette.get(&index).or_else(|| self.desc.palette_entry(index))
    }

    pub fn set_palette_material_id(&mut self, material_id: impl Into<String>, index: u32) {
        let entry = self.palette.entry(index)
            .or_insert_with(|| self.desc.palette_entry(index).cloned().unwrap_or_default());
        entry.material_id = material_id.into();
    }

    pub fn palette_material_id(&self, index: u32) -> Option<&str> {
        self.palette_entry(index).map(|entry| entry.material_id.as_str())
    }

    pub fn palette_tile_index(&self, index: u32) -> Option<u8> {
        self.palette_entry(index).map(|entry| entry.tile_index)
    }

    pub fn palette_flags(&self, index: u32) -> Option<u8> {
        self.palette_entry(index).map(|entry| entry.flags)
    }

    pub fn test_palette_flag(&self, flag: u8, index: u32) -> bool {
        self.palette_flags(index).map(|flags| flags & flag != 0).unwrap_or(false)
    }

    /// Drop this instance's override of a palette index.
    pub fn clear_palette_override(&mut self, index: u32) {
        self.palette.remove(&index);
    }
}

impl Drop for LayerRuntime {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        let writable = self.writable;
        let paging = match self.paging.as_mut() {
            Some(paging) => paging,
            None => return,
        };
        let result = paging.flush_cache()
            .and_then(|()| if writable { paging.save() } else { Ok(()) });
        if let Err(e) = result {
            error!(layer=%self.desc.name, error=%format!("{:#}", e), "failed to save dropped tilemap layer");
        }
    }
}
