//! Static configuration of a tilemap layer.

use crate::{
    json::JsonReader,
    storage,
};
use tile_data::{
    ByteStore,
    Tile,
    TileKind,
};
use std::{
    collections::{
        hash_map::DefaultHasher,
        BTreeMap,
    },
    hash::{Hash, Hasher},
};
use bitflags::bitflags;
use serde::{Serialize, Deserialize};
use serde_json::{
    json,
    Value,
};
use vek::*;
use anyhow::Result;


/// Storage layout of a layer's tile data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Storage {
    /// Every tile is materialized in one flat array.
    Dense,
    /// Tiles are materialized in blocks, only once written.
    Sparse,
}

/// Size of the in-memory cache window, in tiles.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CacheSize {
    Automatic,
    Cache8,
    Cache16,
    Cache32,
    Cache64,
    Cache128,
    Cache256,
    Cache512,
    Cache1024,
}

impl CacheSize {
    /// Number of tiles, or `None` for `Automatic`.
    pub fn tile_count(self) -> Option<usize> {
        match self {
            CacheSize::Automatic => None,
            CacheSize::Cache8 => Some(8),
            CacheSize::Cache16 => Some(16),
            CacheSize::Cache32 => Some(32),
            CacheSize::Cache64 => Some(64),
            CacheSize::Cache128 => Some(128),
            CacheSize::Cache256 => Some(256),
            CacheSize::Cache512 => Some(512),
            CacheSize::Cache1024 => Some(1024),
        }
    }

    /// Number of tiles, with `Automatic` resolved to `automatic`.
    pub fn resolve(self, automatic: usize) -> usize {
        self.tile_count().unwrap_or(automatic)
    }
}

/// Tile density of a layer relative to the map's tile grid.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Original,
    DownScale8,
    DownScale4,
    DownScale2,
    UpScale2,
    UpScale4,
    UpScale8,
}

impl Resolution {
    /// Map a map dimension (in map tiles) to a layer dimension (in layer tiles).
    pub fn map_dimension(self, dim: u32) -> u32 {
        match self {
            Resolution::Original => dim,
            Resolution::DownScale2 => dim / 2,
            Resolution::DownScale4 => dim / 4,
            Resolution::DownScale8 => dim / 8,
            Resolution::UpScale2 => dim * 2,
            Resolution::UpScale4 => dim * 4,
            Resolution::UpScale8 => dim * 8,
        }
    }

    /// Size of one layer tile relative to one map tile.
    pub fn tile_size_scaler(self) -> f32 {
        match self {
            Resolution::Original => 1.0,
            Resolution::DownScale2 => 2.0,
            Resolution::DownScale4 => 4.0,
            Resolution::DownScale8 => 8.0,
            Resolution::UpScale2 => 1.0 / 2.0,
            Resolution::UpScale4 => 1.0 / 4.0,
            Resolution::UpScale8 => 1.0 / 8.0,
        }
    }

    pub fn map_size(self, map_size: Extent2<u32>) -> Extent2<u32> {
        map_size.map(|dim| self.map_dimension(dim))
    }
}

bitflags! {
    /// Layer flags, persisted as a bitmask.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct LayerFlags: u32 {
        const VISIBLE_IN_EDITOR = 1 << 0;
        const VISIBLE = 1 << 1;
        const READ_ONLY = 1 << 2;
        const ENABLED = 1 << 3;
    }
}

impl Default for LayerFlags {
    fn default() -> Self {
        LayerFlags::VISIBLE_IN_EDITOR | LayerFlags::VISIBLE | LayerFlags::ENABLED
    }
}

/// What one palette index resolves to.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct PaletteEntry {
    pub material_id: String,
    /// Sub-tile within the material's texture.
    pub tile_index: u8,
    pub flags: u8,
}

/// Palette indices are stored as a sparse map.
pub type Palette = BTreeMap<u32, PaletteEntry>;


/// Static configuration of one layer.
///
/// The default tile always has the layer's tile kind; changing the kind
/// resets the default tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerDescriptor {
    pub id: String,
    pub name: String,
    /// Where the tile data store lives, resolved by a `TileDataLoader`.
    pub data_uri: String,
    pub data_id: String,
    pub flags: LayerFlags,
    pub storage: Storage,
    pub cache: CacheSize,
    pub resolution: Resolution,
    pub depth: i32,
    pub render_layer: i32,
    default_tile: Tile,
    palette: Palette,
}

/// Generate a fresh random id.
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl LayerDescriptor {
    pub fn new() -> Self {
        LayerDescriptor {
            id: random_id(),
            name: String::new(),
            data_uri: String::new(),
            data_id: String::new(),
            flags: LayerFlags::default(),
            storage: Storage::Dense,
            cache: CacheSize::Cache64,
            resolution: Resolution::Original,
            depth: 0,
            render_layer: 0,
            default_tile: TileKind::Render.default_tile(),
            palette: Palette::new(),
        }
    }

    pub fn kind(&self) -> TileKind {
        self.default_tile.kind()
    }

    /// Change the tile kind, resetting the default tile to that kind's zero tile.
    pub fn set_kind(&mut self, kind: TileKind) {
        self.default_tile = kind.default_tile();
    }

    pub fn tile_size(&self) -> usize {
        self.kind().byte_size()
    }

    pub fn default_tile(&self) -> Tile {
        self.default_tile
    }

    /// Panics if the tile is not of this layer's kind.
    pub fn set_default_tile(&mut self, tile: Tile) {
        assert_eq!(tile.kind(), self.kind(), "default tile kind must match layer kind");
        self.default_tile = tile;
    }

    /// Panics if this layer's kind has no palette index.
    pub fn set_default_palette_index(&mut self, index: u8) {
        assert!(
            self.default_tile.try_set_palette_index(index),
            "{} tiles have no palette index", self.kind(),
        );
    }

    /// Panics if this layer's kind has no data value.
    pub fn set_default_data_value(&mut self, value: i32) {
        assert!(
            self.default_tile.try_set_data_value(value),
            "{} tiles have no data value", self.kind(),
        );
    }

    /// Panics if this layer's kind has no palette index.
    pub fn default_palette_index(&self) -> u8 {
        match self.default_tile.try_get_palette_index() {
            Some(index) => index,
            None => panic!("{} tiles have no palette index", self.kind()),
        }
    }

    /// Panics if this layer's kind has no data value.
    pub fn default_data_value(&self) -> i32 {
        match self.default_tile.try_get_data_value() {
            Some(value) => value,
            None => panic!("{} tiles have no data value", self.kind()),
        }
    }

    pub fn has_render_component(&self) -> bool {
        self.kind().has_render_component()
    }

    pub fn has_data_component(&self) -> bool {
        self.kind().has_data_component()
    }

    pub fn max_palette_index(&self) -> Option<u8> {
        self.kind().max_palette_index()
    }

    pub fn test_flag(&self, flag: LayerFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: LayerFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn is_read_only(&self) -> bool {
        self.test_flag(LayerFlags::READ_ONLY)
    }

    pub fn is_visible(&self) -> bool {
        self.test_flag(LayerFlags::VISIBLE)
    }

    pub fn is_enabled(&self) -> bool {
        self.test_flag(LayerFlags::ENABLED)
    }

    pub fn map_dimension(&self, dim: u32) -> u32 {
        self.resolution.map_dimension(dim)
    }

    pub fn tile_size_scaler(&self) -> f32 {
        self.resolution.tile_size_scaler()
    }

    /// Layer size in layer tiles for a map of `map_size` map tiles.
    pub fn layer_size(&self, map_size: Extent2<u32>) -> Extent2<u32> {
        self.resolution.map_size(map_size)
    }

    // ==== palette ====

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn set_palette_material_id(&mut self, material_id: impl Into<String>, index: u32) {
        self.palette.entry(index).or_default().material_id = material_id.into();
    }

    pub fn set_palette_tile_index(&mut self, tile_index: u8, index: u32) {
        self.palette.entry(index).or_default().tile_index = tile_index;
    }

    pub fn set_palette_flag(&mut self, flag: u8, on: bool, index: u32) {
        let entry = self.palette.entry(index).or_default();
        if on {
            entry.flags |= flag;
        } else {
            entry.flags &= !flag;
        }
    }

    pub fn test_palette_flag(&self, flag: u8, index: u32) -> bool {
        self.palette.get(&index).map(|entry| entry.flags & flag != 0).unwrap_or(false)
    }

    pub fn palette_entry(&self, index: u32) -> Option<&PaletteEntry> {
        self.palette.get(&index)
    }

    pub fn palette_material_id(&self, index: u32) -> Option<&str> {
        self.palette.get(&index).map(|entry| entry.material_id.as_str())
    }

    pub fn palette_tile_index(&self, index: u32) -> Option<u8> {
        self.palette.get(&index).map(|entry| entry.tile_index)
    }

    pub fn palette_flags(&self, index: u32) -> Option<u8> {
        self.palette.get(&index).map(|entry| entry.flags)
    }

    pub fn clear_palette(&mut self) {
        self.palette.clear();
    }

    pub fn clear_palette_entry(&mut self, index: u32) {
        self.palette.remove(&index);
    }

    /// Lowest palette index referring to `material_id`.
    pub fn find_palette_index(&self, material_id: &str) -> Option<u32> {
        self.palette.iter()
            .find(|(_, entry)| entry.material_id == material_id)
            .map(|(&index, _)| index)
    }

    /// Lowest palette index referring to `material_id` at `tile_index`.
    pub fn find_palette_index_with_tile(&self, material_id: &str, tile_index: u8) -> Option<u32> {
        self.palette.iter()
            .find(|(_, entry)| entry.material_id == material_id && entry.tile_index == tile_index)
            .map(|(&index, _)| index)
    }

    /// Lowest unused palette index below the kind's maximum palette index.
    pub fn next_available_palette_index(&self) -> Option<u32> {
        let max = self.max_palette_index()? as u32;
        (0..max).find(|index| !self.palette.contains_key(index))
    }

    // ==== storage ====

    /// Bytes needed to hold every tile of a `kind` layer of the given size.
    pub fn layer_byte_size(kind: TileKind, layer_size: Extent2<u32>) -> u64 {
        layer_size.w as u64 * layer_size.h as u64 * kind.byte_size() as u64
    }

    /// Lay out fresh tile data for a map of `map_size` in `store`.
    pub fn initialize(&self, map_size: Extent2<u32>, store: &mut dyn ByteStore) -> Result<()> {
        storage::initialize(self, map_size, store)
    }

    /// Copy tile data for a map resized from `src_map_size` to `dst_map_size`.
    /// `dst` must already be initialized for `dst_map_size`.
    pub fn resize_copy(
        &self,
        src_map_size: Extent2<u32>,
        dst_map_size: Extent2<u32>,
        src: &dyn ByteStore,
        dst: &mut dyn ByteStore,
    ) -> Result<()> {
        storage::resize_copy(self, src_map_size, dst_map_size, src, dst)
    }

    // ==== identity ====

    /// Hash over every field, including the palette in index order.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    // ==== persistence ====

    pub fn to_json(&self) -> Value {
        let bits = self.default_tile.to_bits();
        let palette = self.palette.iter()
            .map(|(index, entry)| json!({
                "index": index,
                "value": entry.material_id,
                "tile_index": entry.tile_index,
                "flags": entry.flags,
            }))
            .collect::<Vec<_>>();
        json!({
            "id": self.id,
            "name": self.name,
            "data_uri": self.data_uri,
            "data_id": self.data_id,
            "flags": self.flags.bits(),
            "storage": self.storage,
            "type": self.kind(),
            "cache": self.cache,
            "rez": self.resolution,
            "depth": self.depth,
            "layer": self.render_layer,
            "default": {
                "hi_bits": bits >> 16,
                "lo_bits": bits & 0xffff,
            },
            "palette": palette,
        })
    }

    /// Read a descriptor from JSON. Fields that are missing or malformed are
    /// left at their defaults and make the returned flag false. A missing
    /// tile type leaves the default tile unread.
    pub fn from_json(value: &Value) -> (Self, bool) {
        let mut desc = LayerDescriptor::new();
        let mut reader = JsonReader::new(value, "tilemap layer");
        reader.read("id", &mut desc.id);
        reader.read("name", &mut desc.name);
        reader.read("data_uri", &mut desc.data_uri);
        reader.read("data_id", &mut desc.data_id);
        if let Some(bits) = reader.try_read::<u32>("flags") {
            desc.flags = LayerFlags::from_bits_truncate(bits);
        }
        reader.read("storage", &mut desc.storage);
        reader.read("cache", &mut desc.cache);
        reader.read("rez", &mut desc.resolution);
        reader.read("depth", &mut desc.depth);
        reader.read("layer", &mut desc.render_layer);

        for chunk in reader.chunks("palette") {
            let mut chunk_reader = JsonReader::new(chunk, "tilemap layer palette entry");
            let mut index = 0u32;
            let mut entry = PaletteEntry::default();
            chunk_reader.read("index", &mut index);
            chunk_reader.read("value", &mut entry.material_id);
            chunk_reader.read("flags", &mut entry.flags);
            chunk_reader.read("tile_index", &mut entry.tile_index);
            reader.merge(chunk_reader.ok());
            desc.palette.insert(index, entry);
        }

        let Some(kind) = reader.try_read::<TileKind>("type") else {
            return (desc, false);
        };
        desc.set_kind(kind);

        let mut hi = 0u32;
        let mut lo = 0u32;
        if let Some(chunk) = reader.chunk("default") {
            let mut chunk_reader = JsonReader::new(chunk, "tilemap layer default tile");
            chunk_reader.read("hi_bits", &mut hi);
            chunk_reader.read("lo_bits", &mut lo);
            reader.merge(chunk_reader.ok());
        }
        let bits = ((hi & 0xffff) << 16) | (lo & 0xffff);
        desc.default_tile = Tile::from_bits(kind, bits);

        let ok = reader.ok();
        (desc, ok)
    }
}

impl Default for LayerDescriptor {
    fn default() -> Self {
        LayerDescriptor::new()
    }
}


#[test]
fn test_resolution_mapping() {
    assert_eq!(Resolution::DownScale4.map_dimension(64), 16);
    assert_eq!(Resolution::UpScale2.map_dimension(64), 128);
    assert_eq!(Resolution::DownScale8.tile_size_scaler(), 8.0);
    assert_eq!(Resolution::UpScale4.tile_size_scaler(), 0.25);
    assert_eq!(Resolution::Original.map_size(Extent2::new(3, 5)), Extent2::new(3, 5));
}

#[test]
fn test_set_kind_resets_default() {
    let mut desc = LayerDescriptor::new();
    desc.set_kind(TileKind::DataSInt16);
    desc.set_default_data_value(-40);
    assert_eq!(desc.default_tile(), Tile::DataSInt16 { data: -40 });
    desc.set_kind(TileKind::RenderDataUInt8);
    assert_eq!(desc.default_tile(), Tile::RenderDataUInt8 { index: 0, data: 0 });
}

#[test]
#[should_panic]
fn test_default_palette_index_on_data_layer() {
    let mut desc = LayerDescriptor::new();
    desc.set_kind(TileKind::DataUInt8);
    desc.set_default_palette_index(1);
}

#[test]
fn test_palette_lookup() {
    let mut desc = LayerDescriptor::new();
    desc.set_kind(TileKind::RenderDataUInt4);
    desc.set_palette_material_id("grass", 0);
    desc.set_palette_material_id("rock", 1);
    desc.set_palette_tile_index(3, 1);
    desc.set_palette_material_id("rock", 4);
    desc.set_palette_flag(0b10, true, 4);

    assert_eq!(desc.find_palette_index("rock"), Some(1));
    assert_eq!(desc.find_palette_index_with_tile("rock", 0), Some(4));
    assert_eq!(desc.find_palette_index("water"), None);
    assert_eq!(desc.next_available_palette_index(), Some(2));
    assert!(desc.test_palette_flag(0b10, 4));
    assert!(!desc.test_palette_flag(0b10, 1));

    desc.set_palette_flag(0b10, false, 4);
    assert_eq!(desc.palette_flags(4), Some(0));
    desc.clear_palette_entry(0);
    assert_eq!(desc.next_available_palette_index(), Some(0));

    desc.set_kind(TileKind::DataUInt8);
    assert_eq!(desc.next_available_palette_index(), None);
}

#[test]
fn test_json_round_trip() {
    let mut desc = LayerDescriptor::new();
    desc.name = "height".to_owned();
    desc.data_uri = "fs://height.bin".to_owned();
    desc.data_id = "abc".to_owned();
    desc.storage = Storage::Sparse;
    desc.cache = CacheSize::Cache256;
    desc.resolution = Resolution::DownScale2;
    desc.depth = -2;
    desc.render_layer = 5;
    desc.set_flag(LayerFlags::READ_ONLY, true);
    desc.set_kind(TileKind::RenderDataSInt24);
    desc.set_default_palette_index(9);
    desc.set_default_data_value(-100_000);
    desc.set_palette_material_id("sand", 9);
    desc.set_palette_tile_index(2, 9);

    let json = desc.to_json();
    assert_eq!(json["type"], "Render_DataSInt24");
    let (back, ok) = LayerDescriptor::from_json(&json);
    assert!(ok);
    assert_eq!(back, desc);
    assert_eq!(back.content_hash(), desc.content_hash());
}

#[test]
fn test_json_missing_fields() {
    let json = serde_json::json!({
        "name": "only a name",
        "type": "DataUInt16",
        "default": { "hi_bits": 0, "lo_bits": 300 },
    });
    let (desc, ok) = LayerDescriptor::from_json(&json);
    assert!(!ok);
    assert_eq!(desc.name, "only a name");
    assert_eq!(desc.default_tile(), Tile::DataUInt16 { data: 300 });

    let json = serde_json::json!({ "name": "no type" });
    let (desc, ok) = LayerDescriptor::from_json(&json);
    assert!(!ok);
    assert_eq!(desc.name, "no type");
    assert_eq!(desc.kind(), TileKind::Render);
}
