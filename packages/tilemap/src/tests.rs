//! Scenario tests across descriptors, storage, paging, and runtimes.

use crate::{
    descriptor::{
        LayerDescriptor,
        LayerFlags,
        Storage,
        CacheSize,
        Resolution,
    },
    layer::{
        LayerRuntime,
        TileRowCol,
    },
    map::MapDescriptor,
    grid::GridRuntime,
    loader::{
        TileDataDesc,
        DirLoader,
    },
    settings::Settings,
};
use tile_data::{
    ByteStore,
    Tile,
    TileKind,
    VecStore,
};
use std::sync::Arc;
use vek::*;
use anyhow::{Result, anyhow};


fn layer_desc(kind: TileKind, storage: Storage) -> LayerDescriptor {
    let mut desc = LayerDescriptor::new();
    desc.name = format!("{:?} {}", storage, kind);
    desc.set_kind(kind);
    desc.storage = storage;
    desc
}

// an initialized, loaded layer over an in-memory store
fn loaded_layer(desc: LayerDescriptor, map_size: Extent2<u32>, cache_size: usize) -> LayerRuntime {
    let mut store = VecStore::new();
    desc.initialize(map_size, &mut store).unwrap();
    let mut layer = LayerRuntime::new(Arc::new(desc), map_size);
    layer.load(Box::new(store), cache_size).unwrap();
    layer
}

fn reload(layer: &mut LayerRuntime, cache_size: usize) {
    let store = layer.unload().unwrap();
    layer.load(store, cache_size).unwrap();
}

// deterministic pseudo-random sequence
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

#[test]
fn test_dense_uint8_round_trip() {
    let mut desc = layer_desc(TileKind::DataUInt8, Storage::Dense);
    desc.cache = CacheSize::Cache8;
    let mut layer = loaded_layer(desc, Extent2::new(4, 4), 8);

    assert!(layer.set_tile_value(5, 1, 2).unwrap());
    layer.flush_cache().unwrap();
    reload(&mut layer, 8);

    assert_eq!(layer.tile_value(1, 2).unwrap(), Some(5));
    assert_eq!(layer.tile_value(0, 0).unwrap(), Some(0));
    assert_eq!(layer.tile_palette_index(1, 2).unwrap(), None);
    assert!(!layer.set_tile_palette_index(3, 1, 2).unwrap());
}

#[test]
fn test_round_trip_every_kind_and_backend() {
    let map_size = Extent2::new(9, 7);
    for &storage in &[Storage::Dense, Storage::Sparse] {
        for &kind in TileKind::ALL.iter() {
            let mut layer = loaded_layer(layer_desc(kind, storage), map_size, 16);
            let (min, max) = kind.value_range().unwrap_or((0, 0));
            let palette_len = kind.max_palette_index().unwrap_or(0) as u32 + 1;
            for row in 0..7 {
                for col in 0..9 {
                    let i = row * 9 + col;
                    if kind.has_data_component() {
                        let value = if i % 2 == 0 { min } else { max - i as i32 % 3 };
                        assert!(layer.set_tile_value(value, row, col).unwrap());
                    }
                    if kind.has_render_component() {
                        assert!(layer.set_tile_palette_index((i % palette_len) as u8, row, col).unwrap());
                    }
                }
            }
            layer.flush_cache().unwrap();
            layer.save().unwrap();
            reload(&mut layer, 8);
            for row in 0..7 {
                for col in 0..9 {
                    let i = row * 9 + col;
                    if kind.has_data_component() {
                        let value = if i % 2 == 0 { min } else { max - i as i32 % 3 };
                        assert_eq!(layer.tile_value(row, col).unwrap(), Some(value), "{} {:?}", kind, storage);
                    } else {
                        assert_eq!(layer.tile_value(row, col).unwrap(), None);
                    }
                    if kind.has_render_component() {
                        assert_eq!(
                            layer.tile_palette_index(row, col).unwrap(),
                            Some((i % palette_len) as u8),
                            "{} {:?}", kind, storage,
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_backend_equivalence() {
    let map_size = Extent2::new(20, 13);
    let mut layers = [Storage::Dense, Storage::Sparse].map(|storage| {
        let mut desc = layer_desc(TileKind::DataSInt16, storage);
        desc.set_default_data_value(-3);
        loaded_layer(desc, map_size, 16)
    });

    let mut rng = Lcg(7);
    for _ in 0..300 {
        let row = rng.next() % 13;
        let col = rng.next() % 20;
        let value = (rng.next() % 2000) as i32 - 1000;
        for layer in &mut layers {
            assert!(layer.set_tile_value(value, row, col).unwrap());
        }
        if rng.next() % 10 == 0 {
            for layer in &mut layers {
                layer.flush_cache().unwrap();
            }
        }
    }

    for layer in &mut layers {
        layer.flush_cache().unwrap();
        layer.save().unwrap();
        reload(layer, 32);
    }
    let [dense, sparse] = &mut layers;
    for row in 0..13 {
        for col in 0..20 {
            assert_eq!(dense.tile_value(row, col).unwrap(), sparse.tile_value(row, col).unwrap());
        }
    }
    assert_eq!(dense.tile_value(0, 0).unwrap().map(|v| v >= -1000), Some(true));
}

#[test]
fn test_cache_transparency() {
    let map_size = Extent2::new(4, 4);
    let mut observed = Vec::new();
    for &cache_size in &[8, 16] {
        for &storage in &[Storage::Dense, Storage::Sparse] {
            let mut layer = loaded_layer(layer_desc(TileKind::RenderDataSInt8, storage), map_size, cache_size);
            // tile index 9 is page 1 when the cache holds 8 tiles
            assert!(layer.set_tile_value(-42, 2, 1).unwrap());
            assert!(layer.set_tile_palette_index(7, 2, 1).unwrap());
            let first = layer.tile(0, 0).unwrap();
            let written = layer.tile(2, 1).unwrap();
            observed.push((first, written));
        }
    }
    assert!(observed.iter().all(|&obs| obs == observed[0]));
    assert_eq!(observed[0].1, Tile::RenderDataSInt8 { index: 7, data: -42 });
    assert_eq!(observed[0].0, TileKind::RenderDataSInt8.default_tile());
}

#[test]
fn test_page_eviction_flushes_dirty_page() {
    let mut layer = loaded_layer(layer_desc(TileKind::DataUInt16, Storage::Dense), Extent2::new(8, 8), 8);
    assert!(layer.set_tile_value(1000, 0, 3).unwrap());
    assert!(layer.paging_layer().unwrap().is_dirty());

    // touching row 5 evicts page 0
    assert_eq!(layer.tile_value(5, 5).unwrap(), Some(0));
    let paging = layer.paging_layer().unwrap();
    assert_eq!(paging.page_index(), 5);
    assert!(!paging.is_dirty());

    // the write is in the store past the 8 byte header
    let mut bytes = [0; 2];
    paging.store().read(&mut bytes, 8 + 3 * 2).unwrap();
    assert_eq!(u16::from_le_bytes(bytes), 1000);
}

#[test]
fn test_sparse_reads_never_allocate() {
    let mut desc = layer_desc(TileKind::RenderDataUInt4, Storage::Sparse);
    desc.set_default_palette_index(2);
    desc.set_default_data_value(9);
    let map_size = Extent2::new(50, 40);
    let mut layer = loaded_layer(desc, map_size, 64);
    let bytes_before = layer.paging_layer().unwrap().store().byte_count();

    for row in 0..40 {
        for col in 0..50 {
            assert_eq!(layer.tile_value(row, col).unwrap(), Some(9));
            assert_eq!(layer.tile_palette_index(row, col).unwrap(), Some(2));
        }
    }
    // writing the default into untouched space does not allocate either
    assert!(layer.set_tile_value(9, 39, 49).unwrap());
    layer.flush_cache().unwrap();
    layer.save().unwrap();

    assert_eq!(layer.paging_layer().unwrap().store().byte_count(), bytes_before);
    assert_eq!(layer.byte_count(), 0);
}

#[test]
fn test_read_only_layer_refuses_writes() {
    let mut desc = layer_desc(TileKind::DataUInt8, Storage::Dense);
    desc.set_flag(LayerFlags::READ_ONLY, true);
    let mut layer = loaded_layer(desc, Extent2::new(4, 4), 8);
    assert!(layer.is_read_only());
    assert!(!layer.set_tile_value(1, 0, 0).unwrap());
    assert!(!layer.set_tile(Tile::DataUInt8 { data: 1 }, 0, 0).unwrap());
    assert_eq!(layer.tile_value(0, 0).unwrap(), Some(0));
    layer.flush_cache().unwrap();
    layer.save().unwrap();
}

#[test]
fn test_writes_survive_becoming_read_only() {
    for &storage in &[Storage::Dense, Storage::Sparse] {
        let mut layer = loaded_layer(layer_desc(TileKind::DataUInt8, storage), Extent2::new(4, 4), 8);
        assert!(layer.set_tile_value(5, 1, 2).unwrap());
        layer.set_flag(LayerFlags::READ_ONLY, true);
        assert!(!layer.set_tile_value(6, 1, 2).unwrap());

        let store = layer.unload().unwrap();
        layer.set_flag(LayerFlags::READ_ONLY, false);
        layer.load(store, 8).unwrap();
        assert_eq!(layer.tile_value(1, 2).unwrap(), Some(5), "{:?}", storage);
    }
}

#[test]
fn test_flush_after_becoming_read_only() {
    let mut layer = loaded_layer(layer_desc(TileKind::DataUInt8, Storage::Dense), Extent2::new(4, 4), 8);
    assert!(layer.set_tile_value(9, 3, 3).unwrap());
    layer.set_flag(LayerFlags::READ_ONLY, true);
    layer.flush_cache().unwrap();
    assert!(!layer.paging_layer().unwrap().is_dirty());
    let mut byte = [0];
    layer.paging_layer().unwrap().store().read(&mut byte, 8 + 15).unwrap();
    assert_eq!(byte, [9]);
}

#[test]
#[should_panic]
fn test_out_of_bounds_panics() {
    let mut layer = loaded_layer(layer_desc(TileKind::DataUInt8, Storage::Dense), Extent2::new(4, 4), 8);
    let _ = layer.tile_value(4, 0);
}

#[test]
fn test_layer_palette_overrides() {
    let mut desc = layer_desc(TileKind::Render, Storage::Dense);
    desc.set_palette_material_id("stone", 1);
    desc.set_palette_tile_index(4, 1);
    let mut layer = LayerRuntime::new(Arc::new(desc), Extent2::new(2, 2));

    assert_eq!(layer.palette_material_id(1), Some("stone"));
    layer.set_palette_material_id("marble", 1);
    assert_eq!(layer.palette_material_id(1), Some("marble"));
    assert_eq!(layer.palette_tile_index(1), Some(4));
    assert_eq!(layer.descriptor().palette_material_id(1), Some("stone"));
    assert_eq!(layer.palette_material_id(2), None);

    layer.clear_palette_override(1);
    assert_eq!(layer.palette_material_id(1), Some("stone"));
}

// map with a dense and a sparse layer whose stores are created on load
fn test_grid(map_size: Extent2<u32>) -> GridRuntime {
    test_grid_with(map_size, vec![
        layer_desc(TileKind::RenderDataUInt8, Storage::Dense),
        layer_desc(TileKind::RenderDataUInt8, Storage::Sparse),
    ])
}

// a loaded grid whose layers each get a fresh in-memory store
fn test_grid_with(map_size: Extent2<u32>, layers: Vec<LayerDescriptor>) -> GridRuntime {
    let mut map = MapDescriptor::new();
    map.name = "test".to_owned();
    map.set_map_size(map_size);
    for layer in layers {
        map.add_layer(layer);
    }
    let map = Arc::new(map);

    let loader_map = Arc::clone(&map);
    let loader = move |desc: &TileDataDesc| -> Result<Box<dyn ByteStore>> {
        let layer = loader_map.find_layer_by_id(&desc.layer_id)
            .ok_or_else(|| anyhow!("unknown layer {}", desc.layer_id))?;
        let mut store = VecStore::new();
        layer.initialize(loader_map.map_size(), &mut store)?;
        Ok(Box::new(store))
    };
    let mut grid = GridRuntime::new(map);
    assert!(grid.load(&loader, &Settings::default()));
    grid
}

#[test]
fn test_grid_resize_preserves_overlap() {
    for &(new_w, new_h) in &[(6, 3), (3, 6), (7, 7), (2, 2)] {
        let mut grid = test_grid(Extent2::new(4, 4));
        for i in 0..2 {
            let layer = grid.layer_mut(i);
            for row in 0..4 {
                for col in 0..4 {
                    assert!(layer.set_tile_value((row * 4 + col + 1) as i32, row, col).unwrap());
                }
            }
        }

        grid
            .resize(Extent2::new(new_w, new_h), |_| Ok(Box::new(VecStore::new()) as Box<dyn ByteStore>))
            .unwrap();
        assert_eq!(grid.map_size(), Extent2::new(new_w, new_h));
        assert_eq!(grid.map().map_size(), Extent2::new(new_w, new_h));

        for i in 0..2 {
            let layer = grid.layer_mut(i);
            assert_eq!(layer.width(), new_w);
            assert_eq!(layer.height(), new_h);
            for row in 0..new_h {
                for col in 0..new_w {
                    let expected = if row < 4 && col < 4 { row * 4 + col + 1 } else { 0 };
                    assert_eq!(
                        layer.tile_value(row, col).unwrap(),
                        Some(expected as i32),
                        "layer {} resized to {}x{} at ({}, {})", i, new_w, new_h, row, col,
                    );
                }
            }
        }
    }
}

#[test]
fn test_grid_failed_resize_changes_nothing() {
    let mut grid = test_grid_with(Extent2::new(4, 4), vec![
        layer_desc(TileKind::DataUInt8, Storage::Dense),
        layer_desc(TileKind::DataSInt16, Storage::Dense),
    ]);
    for i in 0..2 {
        let layer = grid.layer_mut(i);
        for row in 0..4 {
            for col in 0..4 {
                assert!(layer.set_tile_value((row * 4 + col + 1) as i32, row, col).unwrap());
            }
        }
    }

    let mut stores_made = 0;
    let result = grid.resize(Extent2::new(8, 2), |_| {
        stores_made += 1;
        if stores_made == 2 {
            return Err(anyhow!("out of space"));
        }
        Ok(Box::new(VecStore::new()) as Box<dyn ByteStore>)
    });
    assert!(result.is_err());
    assert_eq!(stores_made, 2);
    assert_eq!(grid.map_size(), Extent2::new(4, 4));

    for i in 0..2 {
        let layer = grid.layer_mut(i);
        assert!(layer.is_loaded());
        assert_eq!(layer.map_size(), Extent2::new(4, 4));
        assert_eq!(layer.width(), 4);
        assert_eq!(layer.height(), 4);
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(layer.tile_value(row, col).unwrap(), Some((row * 4 + col + 1) as i32));
            }
        }
    }
}

#[test]
fn test_grid_resize_sparse_block_shape_changes() {
    fn block_size(grid: &GridRuntime) -> Extent2<u32> {
        let mut header = [0; 16];
        grid.layer(0).paging_layer().unwrap().store().read(&mut header, 0).unwrap();
        Extent2::new(
            u16::from_le_bytes([header[8], header[9]]) as u32,
            u16::from_le_bytes([header[10], header[11]]) as u32,
        )
    }
    fn pattern(row: u32, col: u32) -> i32 {
        ((row * 7 + col * 3) % 250 + 1) as i32
    }

    let mut grid = test_grid_with(Extent2::new(64, 64), vec![
        layer_desc(TileKind::DataUInt8, Storage::Sparse),
    ]);
    assert_eq!(block_size(&grid), Extent2::new(32, 8));
    let layer = grid.layer_mut(0);
    for row in 0..64 {
        for col in 0..64 {
            assert!(layer.set_tile_value(pattern(row, col), row, col).unwrap());
        }
    }

    grid
        .resize(Extent2::new(1000, 9), |_| Ok(Box::new(VecStore::new()) as Box<dyn ByteStore>))
        .unwrap();
    assert_eq!(block_size(&grid), Extent2::new(16, 16));

    let layer = grid.layer_mut(0);
    assert_eq!(layer.width(), 1000);
    assert_eq!(layer.height(), 9);
    for row in 0..9 {
        for col in 0..1000 {
            let expected = if col < 64 { pattern(row, col) } else { 0 };
            assert_eq!(layer.tile_value(row, col).unwrap(), Some(expected), "({}, {})", row, col);
        }
    }
}

#[test]
fn test_grid_load_failure_is_partial() {
    let mut map = MapDescriptor::new();
    map.set_map_size(Extent2::new(4, 4));
    let mut good = layer_desc(TileKind::DataUInt8, Storage::Dense);
    good.data_uri = "good".to_owned();
    map.add_layer(good);
    let mut bad = layer_desc(TileKind::DataUInt8, Storage::Dense);
    bad.data_uri = "bad".to_owned();
    map.add_layer(bad);
    let map = Arc::new(map);

    let loader_map = Arc::clone(&map);
    let loader = move |desc: &TileDataDesc| -> Result<Box<dyn ByteStore>> {
        if desc.uri == "bad" {
            // uninitialized store fails header validation
            return Ok(Box::new(VecStore::new()));
        }
        let mut store = VecStore::new();
        loader_map.layer(0).initialize(loader_map.map_size(), &mut store)?;
        Ok(Box::new(store))
    };
    let mut grid = GridRuntime::new(map);
    assert!(!grid.load(&loader, &Settings::default()));
    assert!(grid.layer(0).is_loaded());
    assert!(!grid.layer(1).is_loaded());
}

#[test]
fn test_grid_layer_management() {
    let mut grid = test_grid(Extent2::new(4, 4));
    let sparse_id = grid.layer(1).id().to_owned();
    grid.swap_layers(0, 1);
    assert_eq!(grid.find_layer_index(&sparse_id), Some(0));
    assert_eq!(grid.map().find_layer_index(&sparse_id), Some(0));

    let index = grid.add_layer(layer_desc(TileKind::DataSInt8, Storage::Dense));
    assert_eq!(index, 2);
    assert_eq!(grid.map().layer_count(), 3);
    assert!(!grid.layer(2).is_loaded());
    assert_eq!(grid.layer(2).map_size(), Extent2::new(4, 4));

    let removed = grid.remove_layer(0);
    assert_eq!(removed.id(), sparse_id);
    assert!(removed.is_loaded());
    assert_eq!(grid.layer_count(), 2);
    assert!(grid.find_layer_by_id(&sparse_id).is_none());
    let dense_name = format!("{:?} {}", Storage::Dense, TileKind::RenderDataUInt8);
    assert!(grid.find_layer_by_name(&dense_name).is_some());

    grid.flush_all().unwrap();
    grid.save_all().unwrap();
}

#[test]
fn test_map_from_plane() {
    let mut map = MapDescriptor::new();
    map.set_map_size(Extent2::new(10, 10));
    map.tile_width = 2.0;
    map.tile_height = 2.0;
    map.add_layer(layer_desc(TileKind::Render, Storage::Dense));
    let mut fine = layer_desc(TileKind::Render, Storage::Dense);
    fine.resolution = Resolution::UpScale2;
    map.add_layer(fine);
    let grid = GridRuntime::new(Arc::new(map));

    assert_eq!(grid.layer(1).layer_size(), Extent2::new(20, 20));
    assert_eq!(grid.map_from_plane(Vec2::new(3.5, 7.2), 0), TileRowCol { row: 3, col: 1 });
    assert_eq!(grid.map_from_plane(Vec2::new(3.5, 7.2), 1), TileRowCol { row: 7, col: 3 });
    assert_eq!(grid.map_from_plane(Vec2::new(-5.0, -1.0), 1), TileRowCol { row: 0, col: 0 });
    assert_eq!(grid.map_from_plane(Vec2::new(20.0, 100.0), 1), TileRowCol { row: 19, col: 19 });

    assert!(grid.test_plane_coordinate(Vec2::new(0.0, 0.0), 0));
    assert!(grid.test_plane_coordinate(Vec2::new(20.0, 20.0), 1));
    assert!(!grid.test_plane_coordinate(Vec2::new(20.5, 3.0), 0));
    assert!(!grid.test_plane_coordinate(Vec2::new(3.0, -0.1), 0));
}

#[test]
fn test_grid_file_round_trip() {
    let dir = std::env::temp_dir().join(format!("tilemap_grid_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let mut map = MapDescriptor::new();
    map.set_map_size(Extent2::new(30, 30));
    let mut desc = layer_desc(TileKind::RenderDataSInt24, Storage::Sparse);
    desc.data_uri = "height.bin".to_owned();
    desc.cache = CacheSize::Automatic;
    map.add_layer(desc);

    let mut store = tile_data::FileStore::create(dir.join("height.bin")).unwrap();
    map.layer(0).initialize(map.map_size(), &mut store).unwrap();
    drop(store);

    let map = Arc::new(map);
    let settings = Settings {
        automatic_cache_size: 16,
        ..Settings::default()
    };
    let mut grid = GridRuntime::new(Arc::clone(&map));
    assert!(grid.load(&DirLoader::new(&dir), &settings));
    assert_eq!(grid.layer(0).paging_layer().unwrap().cache_size(), 16);
    assert!(grid.layer_mut(0).set_tile_value(-8_000_000, 29, 0).unwrap());
    assert!(grid.layer_mut(0).set_tile_palette_index(200, 3, 17).unwrap());
    grid.save_all().unwrap();
    drop(grid);

    let mut grid = GridRuntime::new(map);
    assert!(grid.load(&DirLoader::new(&dir), &settings));
    let layer = grid.layer_mut(0);
    assert_eq!(layer.tile_value(29, 0).unwrap(), Some(-8_000_000));
    assert_eq!(layer.tile_palette_index(3, 17).unwrap(), Some(200));
    assert_eq!(layer.tile_value(3, 17).unwrap(), Some(0));
    assert_eq!(layer.tile_value(15, 15).unwrap(), Some(0));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_dropped_layer_keeps_writes() {
    let path = std::env::temp_dir().join(format!("tilemap_drop_{}.bin", std::process::id()));
    let desc = Arc::new(layer_desc(TileKind::DataSInt16, Storage::Sparse));
    let map_size = Extent2::new(40, 40);

    let mut store = tile_data::FileStore::create(&path).unwrap();
    desc.initialize(map_size, &mut store).unwrap();
    let mut layer = LayerRuntime::new(Arc::clone(&desc), map_size);
    layer.load(Box::new(store), 16).unwrap();
    assert!(layer.set_tile_value(-1234, 37, 5).unwrap());
    assert!(layer.paging_layer().unwrap().is_dirty());
    drop(layer);

    let store = tile_data::FileStore::open(&path).unwrap();
    let mut layer = LayerRuntime::new(desc, map_size);
    layer.load(Box::new(store), 16).unwrap();
    assert_eq!(layer.tile_value(37, 5).unwrap(), Some(-1234));
    assert_eq!(layer.tile_value(5, 37).unwrap(), Some(0));
    drop(layer);

    std::fs::remove_file(&path).unwrap();
}
