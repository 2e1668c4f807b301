
#[macro_use]
extern crate tracing;

use tilemap::{
    logging::init_logging,
    settings::SETTINGS_FILE_NAME,
    LayerDescriptor,
    MapDescriptor,
    GridRuntime,
    DirLoader,
    TileDataDesc,
    Settings,
};
use tile_data::FileStore;
use std::{
    sync::Arc,
    env::args,
    fs,
    path::Path,
    process::exit,
};
use anyhow::{
    Result,
    Context,
    bail,
    ensure,
};


const CLI_HELP: &'static str = r#"Usage:

    tilemap info <map.json>
    Print the map and its layers.

    tilemap init <map.json> <dir>
    Create fresh tile data files for every layer in <dir>.

    tilemap get <map.json> <dir> <layer name> <row> <col>
    Print one tile of a layer, reading tile data files from <dir>.

Settings are read from tilemap.json in the working directory.

Env var examples:
    RUST_LOG=tilemap=trace
    Changes logging levels"#;


fn main() {
    let settings = Settings::read(SETTINGS_FILE_NAME);
    if let Err(e) = init_logging(None, &settings.default_log_filter) {
        eprintln!("error initializing logging: {:#}", e);
    }

    let args = args().skip(1).collect::<Vec<_>>();
    let args = args.iter().map(String::as_str).collect::<Vec<_>>();
    let result = match args.as_slice() {
        ["--help"] => {
            println!("{}", CLI_HELP);
            return;
        }
        ["info", map_path] => info(map_path),
        ["init", map_path, dir] => init(map_path, dir),
        ["get", map_path, dir, layer, row, col] => match (row.parse(), col.parse()) {
            (Ok(row), Ok(col)) => get(&settings, map_path, dir, layer, row, col),
            _ => usage(),
        },
        _ => usage(),
    };
    if let Err(e) = result {
        error!("{:#}", e);
        exit(1);
    }
}

fn usage() -> ! {
    eprintln!("{}", CLI_HELP);
    exit(2);
}

// read a map descriptor, warning if it only partially loaded
fn read_map(path: &str) -> Result<MapDescriptor> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?;
    let (map, ok) = MapDescriptor::from_json(&value);
    if !ok {
        warn!(%path, "map descriptor only partially loaded");
    }
    Ok(map)
}

fn info(map_path: &str) -> Result<()> {
    let map = read_map(map_path)?;
    println!("map {:?} ({})", map.name, map.id);
    println!("    size: {}x{} tiles of {}x{}", map.map_width, map.map_height, map.tile_width, map.tile_height);
    if !map.script_file.is_empty() {
        println!("    script: {}", map.script_file);
    }
    for (i, layer) in map.layers().iter().enumerate() {
        let size = layer.layer_size(map.map_size());
        println!("layer {} {:?} ({})", i, layer.name, layer.id);
        println!("    kind: {}", layer.kind());
        println!("    storage: {:?}, cache: {:?}, resolution: {:?}", layer.storage, layer.cache, layer.resolution);
        println!(
            "    size: {}x{} tiles, {} bytes dense",
            size.w, size.h, LayerDescriptor::layer_byte_size(layer.kind(), size),
        );
        println!("    depth: {}, render layer: {}, flags: {:#x}", layer.depth, layer.render_layer, layer.flags.bits());
    }
    Ok(())
}

fn init(map_path: &str, dir: &str) -> Result<()> {
    let map = read_map(map_path)?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir))?;
    let loader = DirLoader::new(dir);
    for layer in map.layers() {
        let path = loader.path(&TileDataDesc::new(layer));
        let mut store = FileStore::create(&path)?;
        layer.initialize(map.map_size(), &mut store)?;
        info!(layer=%layer.name, path=%path.display(), "initialized tile data file");
    }
    Ok(())
}

fn get(settings: &Settings, map_path: &str, dir: &str, layer_name: &str, row: u32, col: u32) -> Result<()> {
    let map = read_map(map_path)?;
    ensure!(Path::new(dir).is_dir(), "{} is not a directory", dir);
    let mut grid = GridRuntime::new(Arc::new(map));
    if !grid.load(&DirLoader::new(dir), settings) {
        warn!("not every layer loaded");
    }
    let layer = match grid.find_layer_by_name(layer_name) {
        Some(layer) => layer,
        None => bail!("no layer named {:?}", layer_name),
    };
    ensure!(layer.is_loaded(), "layer {:?} did not load", layer_name);
    ensure!(
        row < layer.height() && col < layer.width(),
        "tile (row {}, col {}) out of bounds of {}x{} layer",
        row, col, layer.width(), layer.height(),
    );
    let palette_index = layer.tile_palette_index(row, col)?;
    let value = layer.tile_value(row, col)?;
    match palette_index {
        Some(index) => println!(
            "palette index: {} ({})",
            index,
            layer.palette_material_id(index as u32).unwrap_or("no material"),
        ),
        None => println!("palette index: none"),
    }
    match value {
        Some(value) => println!("data value: {}", value),
        None => println!("data value: none"),
    }
    Ok(())
}
