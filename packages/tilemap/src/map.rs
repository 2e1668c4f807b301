//! Static configuration of a whole tilemap.

use crate::{
    descriptor::{
        LayerDescriptor,
        random_id,
    },
    json::JsonReader,
};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};
use serde_json::{
    json,
    Value,
};
use vek::*;


/// A map: its size in map tiles, the world size of one map tile, and an
/// ordered list of layers. Layer descriptors are shared with runtimes and
/// copied on write.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDescriptor {
    pub id: String,
    pub name: String,
    pub script_file: String,
    pub map_width: u32,
    pub map_height: u32,
    /// World units per map tile.
    pub tile_width: f32,
    pub tile_height: f32,
    layers: Vec<Arc<LayerDescriptor>>,
}

impl MapDescriptor {
    pub fn new() -> Self {
        MapDescriptor {
            id: random_id(),
            name: String::new(),
            script_file: String::new(),
            map_width: 0,
            map_height: 0,
            tile_width: 1.0,
            tile_height: 1.0,
            layers: Vec::new(),
        }
    }

    pub fn map_size(&self) -> Extent2<u32> {
        Extent2::new(self.map_width, self.map_height)
    }

    pub fn set_map_size(&mut self, map_size: Extent2<u32>) {
        self.map_width = map_size.w;
        self.map_height = map_size.h;
    }

    pub fn tile_size(&self) -> Extent2<f32> {
        Extent2::new(self.tile_width, self.tile_height)
    }

    // ==== layers ====

    pub fn layers(&self) -> &[Arc<LayerDescriptor>] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn add_layer(&mut self, layer: impl Into<Arc<LayerDescriptor>>) {
        self.layers.push(layer.into());
    }

    /// Panics if out of range.
    pub fn delete_layer(&mut self, index: usize) -> Arc<LayerDescriptor> {
        self.layers.remove(index)
    }

    /// Panics if either index is out of range.
    pub fn swap_layers(&mut self, a: usize, b: usize) {
        self.layers.swap(a, b);
    }

    /// Panics if out of range.
    pub fn layer(&self, index: usize) -> &Arc<LayerDescriptor> {
        &self.layers[index]
    }

    /// Mutable access to a layer, cloning it first if shared. Panics if out
    /// of range.
    pub fn layer_mut(&mut self, index: usize) -> &mut LayerDescriptor {
        Arc::make_mut(&mut self.layers[index])
    }

    pub fn find_layer_by_id(&self, id: &str) -> Option<&Arc<LayerDescriptor>> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn find_layer_by_name(&self, name: &str) -> Option<&Arc<LayerDescriptor>> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn find_layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }

    // ==== identity ====

    /// Deep copy with fresh ids for the map and every layer.
    pub fn clone_with_new_ids(&self) -> Self {
        let mut clone = self.clone();
        clone.id = random_id();
        for layer in &mut clone.layers {
            let mut copy = LayerDescriptor::clone(layer);
            copy.id = random_id();
            *layer = Arc::new(copy);
        }
        clone
    }

    /// Hash over every field and every layer's content hash.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.name.hash(&mut hasher);
        self.script_file.hash(&mut hasher);
        self.map_width.hash(&mut hasher);
        self.map_height.hash(&mut hasher);
        self.tile_width.to_bits().hash(&mut hasher);
        self.tile_height.to_bits().hash(&mut hasher);
        for layer in &self.layers {
            layer.content_hash().hash(&mut hasher);
        }
        hasher.finish()
    }

    // ==== persistence ====

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "script": self.script_file,
            "width": self.map_width,
            "height": self.map_height,
            "tile_width": self.tile_width,
            "tile_height": self.tile_height,
            "layers": self.layers.iter().map(|layer| layer.to_json()).collect::<Vec<_>>(),
        })
    }

    /// Read a map from JSON. Missing or malformed fields, including inside
    /// layers, make the returned flag false; layers that fail to read fully
    /// are still added.
    pub fn from_json(value: &Value) -> (Self, bool) {
        let mut map = MapDescriptor::new();
        let mut reader = JsonReader::new(value, "tilemap");
        reader.read("id", &mut map.id);
        reader.read("name", &mut map.name);
        reader.read("script", &mut map.script_file);
        reader.read("width", &mut map.map_width);
        reader.read("height", &mut map.map_height);
        reader.read("tile_width", &mut map.tile_width);
        reader.read("tile_height", &mut map.tile_height);

        for chunk in reader.chunks("layers") {
            let (layer, ok) = LayerDescriptor::from_json(chunk);
            if !ok {
                warn!(map=%map.name, layer=%layer.name, "tilemap layer failed to load completely");
            }
            reader.merge(ok);
            map.layers.push(Arc::new(layer));
        }

        let ok = reader.ok();
        (map, ok)
    }
}

impl Default for MapDescriptor {
    fn default() -> Self {
        MapDescriptor::new()
    }
}


#[cfg(test)]
fn test_map() -> MapDescriptor {
    use crate::descriptor::Storage;
    use tile_data::TileKind;

    let mut map = MapDescriptor::new();
    map.name = "island".to_owned();
    map.script_file = "island.lua".to_owned();
    map.set_map_size(Extent2::new(32, 16));
    map.tile_width = 10.0;
    map.tile_height = 5.0;

    let mut ground = LayerDescriptor::new();
    ground.name = "ground".to_owned();
    ground.set_kind(TileKind::RenderDataUInt8);
    ground.set_palette_material_id("grass", 0);
    map.add_layer(ground);

    let mut height = LayerDescriptor::new();
    height.name = "height".to_owned();
    height.storage = Storage::Sparse;
    height.set_kind(TileKind::DataSInt16);
    height.set_default_data_value(-7);
    map.add_layer(height);
    map
}

#[test]
fn test_map_json_round_trip() {
    let map = test_map();
    let (back, ok) = MapDescriptor::from_json(&map.to_json());
    assert!(ok);
    assert_eq!(back, map);
    assert_eq!(back.content_hash(), map.content_hash());
}

#[test]
fn test_map_json_bad_layer_still_added() {
    let mut json = test_map().to_json();
    json["layers"][1].as_object_mut().unwrap().remove("depth");
    let (back, ok) = MapDescriptor::from_json(&json);
    assert!(!ok);
    assert_eq!(back.layer_count(), 2);
    assert_eq!(back.layer(1).name, "height");
}

#[test]
fn test_map_clone_with_new_ids() {
    let map = test_map();
    let clone = map.clone_with_new_ids();
    assert_ne!(clone.id, map.id);
    assert_ne!(clone.layer(0).id, map.layer(0).id);
    assert_eq!(clone.layer(1).default_tile(), map.layer(1).default_tile());
    assert_ne!(clone.content_hash(), map.content_hash());

    let copy = map.clone();
    assert_eq!(copy.content_hash(), map.content_hash());
}

#[test]
fn test_map_layer_lookup() {
    let mut map = test_map();
    let height_id = map.layer(1).id.clone();
    assert_eq!(map.find_layer_index(&height_id), Some(1));
    assert_eq!(map.find_layer_by_name("ground").map(|layer| layer.depth), Some(0));
    assert!(map.find_layer_by_id("nope").is_none());

    map.swap_layers(0, 1);
    assert_eq!(map.find_layer_index(&height_id), Some(0));
    map.layer_mut(0).depth = 3;
    assert_eq!(map.find_layer_by_id(&height_id).map(|layer| layer.depth), Some(3));

    let removed = map.delete_layer(0);
    assert_eq!(removed.id, height_id);
    assert_eq!(map.layer_count(), 1);
}
