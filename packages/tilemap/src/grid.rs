//! Runtime instance of a whole tilemap.

use crate::{
    descriptor::LayerDescriptor,
    layer::{
        LayerRuntime,
        TileRowCol,
    },
    loader::{
        TileDataDesc,
        TileDataLoader,
    },
    map::MapDescriptor,
    settings::Settings,
};
use tile_data::ByteStore;
use std::sync::Arc;
use vek::*;
use anyhow::{Result, Context};


/// An ordered list of layer runtimes sharing one map size.
///
/// The map descriptor is kept in step with the layer list: adding, removing,
/// swapping, and resizing go through both.
#[derive(Debug)]
pub struct GridRuntime {
    map: Arc<MapDescriptor>,
    layers: Vec<LayerRuntime>,
}

impl GridRuntime {
    /// Construct one unloaded layer runtime per layer of the map.
    pub fn new(map: Arc<MapDescriptor>) -> Self {
        let layers = map.layers().iter()
            .map(|desc| LayerRuntime::new(Arc::clone(desc), map.map_size()))
            .collect();
        GridRuntime { map, layers }
    }

    pub fn map(&self) -> &Arc<MapDescriptor> {
        &self.map
    }

    pub fn map_size(&self) -> Extent2<u32> {
        self.map.map_size()
    }

    /// Ask the loader for every unloaded layer's tile data and attach it.
    /// Layers that fail are logged and left unloaded. Returns whether every
    /// layer loaded.
    pub fn load(&mut self, loader: &impl TileDataLoader, settings: &Settings) -> bool {
        let mut ok = true;
        for layer in &mut self.layers {
            if layer.is_loaded() {
                continue;
            }
            let data_desc = TileDataDesc {
                read_only: layer.is_read_only(),
                ..TileDataDesc::new(layer.descriptor())
            };
            let cache_size = settings.cache_tile_count(layer.descriptor().cache);
            let result = loader.load_tile_data(&data_desc)
                .and_then(|store| layer.load(store, cache_size));
            if let Err(e) = result {
                warn!(layer=%layer.name(), error=%format!("{:#}", e), "failed to load tilemap layer data");
                ok = false;
            }
        }
        ok
    }

    /// Write every loaded layer's pending tile writes to its store.
    pub fn flush_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut().filter(|layer| layer.is_loaded()) {
            layer.flush_cache()?;
        }
        Ok(())
    }

    /// Flush, then persist storage metadata of every loaded layer.
    pub fn save_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut().filter(|layer| layer.is_loaded()) {
            layer.flush_cache()?;
            layer.save()?;
        }
        Ok(())
    }

    // ==== layers ====

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Panics if out of range.
    pub fn layer(&self, index: usize) -> &LayerRuntime {
        &self.layers[index]
    }

    /// Panics if out of range.
    pub fn layer_mut(&mut self, index: usize) -> &mut LayerRuntime {
        &mut self.layers[index]
    }

    pub fn layers(&self) -> &[LayerRuntime] {
        &self.layers
    }

    /// Append an unloaded layer. Returns its index.
    pub fn add_layer(&mut self, desc: impl Into<Arc<LayerDescriptor>>) -> usize {
        let desc = desc.into();
        Arc::make_mut(&mut self.map).add_layer(Arc::clone(&desc));
        self.layers.push(LayerRuntime::new(desc, self.map.map_size()));
        self.layers.len() - 1
    }

    /// Remove a layer, handing it back still loaded. Panics if out of range.
    pub fn remove_layer(&mut self, index: usize) -> LayerRuntime {
        Arc::make_mut(&mut self.map).delete_layer(index);
        self.layers.remove(index)
    }

    /// Panics if either index is out of range.
    pub fn swap_layers(&mut self, a: usize, b: usize) {
        Arc::make_mut(&mut self.map).swap_layers(a, b);
        self.layers.swap(a, b);
    }

    pub fn find_layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id() == id)
    }

    pub fn find_layer_by_id(&mut self, id: &str) -> Option<&mut LayerRuntime> {
        self.layers.iter_mut().find(|layer| layer.id() == id)
    }

    pub fn find_layer_by_name(&mut self, name: &str) -> Option<&mut LayerRuntime> {
        self.layers.iter_mut().find(|layer| layer.name() == name)
    }

    // ==== plane coordinates ====

    // world size of one of the layer's tiles
    fn layer_tile_size(&self, layer_index: usize) -> Extent2<f32> {
        let scaler = self.layers[layer_index].tile_size_scaler();
        Extent2::new(self.map.tile_width * scaler, self.map.tile_height * scaler)
    }

    /// The tile of a layer containing a plane point, in world units. Points
    /// outside the layer clamp to its edge tiles. Panics if the index is out
    /// of range.
    pub fn map_from_plane(&self, xy: Vec2<f32>, layer_index: usize) -> TileRowCol {
        let layer = &self.layers[layer_index];
        let tile_size = self.layer_tile_size(layer_index);
        let size = layer.layer_size();
        let x = xy.x.clamp(0.0, tile_size.w * size.w as f32);
        let y = xy.y.clamp(0.0, tile_size.h * size.h as f32);

        let col = ((x / tile_size.w) as i64).clamp(0, size.w.saturating_sub(1) as i64);
        let row = ((y / tile_size.h) as i64).clamp(0, size.h.saturating_sub(1) as i64);
        TileRowCol { row: row as u32, col: col as u32 }
    }

    /// Whether a plane point, in world units, lies within a layer. Panics if
    /// the index is out of range.
    pub fn test_plane_coordinate(&self, xy: Vec2<f32>, layer_index: usize) -> bool {
        let tile_size = self.layer_tile_size(layer_index);
        let size = self.layers[layer_index].layer_size();
        xy.x >= 0.0
            && xy.y >= 0.0
            && xy.x <= tile_size.w * size.w as f32
            && xy.y <= tile_size.h * size.h as f32
    }

    // ==== resize ====

    /// Resize the map. Every loaded layer is flushed and saved, its tiles
    /// copied into a fresh store from `make_store` laid out for the new size,
    /// and paged with its previous cache size. Only once every layer's new
    /// store is ready are they swapped in, so on error the map and its layers
    /// are left at the old size on their old stores. Unloaded layers only
    /// take the new size.
    pub fn resize<F>(&mut self, new_size: Extent2<u32>, mut make_store: F) -> Result<()>
    where
        F: FnMut(&LayerDescriptor) -> Result<Box<dyn ByteStore>>,
    {
        let old_size = self.map.map_size();
        info!(
            map=%self.map.name,
            old_w=%old_size.w, old_h=%old_size.h,
            new_w=%new_size.w, new_h=%new_size.h,
            "resizing tilemap",
        );

        self.save_all()?;
        let mut resized = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let src = match layer.paging_layer() {
                Some(paging) => paging,
                None => {
                    resized.push(None);
                    continue;
                }
            };
            let desc = Arc::clone(layer.descriptor());
            let cache_size = src.cache_size();
            let mut dst = make_store(&desc)
                .with_context(|| format!("creating resized store for layer {:?}", desc.name))?;
            desc.initialize(new_size, &mut *dst)?;
            desc.resize_copy(old_size, new_size, src.store(), &mut *dst)?;
            resized.push(Some(layer.open_paging(dst, new_size, cache_size)?));
        }

        for (layer, paging) in self.layers.iter_mut().zip(resized) {
            match paging {
                Some(paging) => {
                    layer.replace_paging(paging, new_size);
                }
                None => layer.set_map_size(new_size),
            }
        }
        Arc::make_mut(&mut self.map).set_map_size(new_size);
        Ok(())
    }
}
