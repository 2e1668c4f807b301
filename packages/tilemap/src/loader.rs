//! Resolving a layer's tile data reference to a byte store.

use crate::descriptor::LayerDescriptor;
use tile_data::{
    ByteStore,
    FileStore,
};
use std::path::PathBuf;
use anyhow::*;


/// What a loader is asked to open.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TileDataDesc {
    pub layer_id: String,
    pub data_id: String,
    pub uri: String,
    pub read_only: bool,
}

impl TileDataDesc {
    /// Request for a layer's tile data, read-only if the layer is.
    pub fn new(layer: &LayerDescriptor) -> Self {
        TileDataDesc {
            layer_id: layer.id.clone(),
            data_id: layer.data_id.clone(),
            uri: layer.data_uri.clone(),
            read_only: layer.is_read_only(),
        }
    }
}

/// Opens the byte store backing a layer.
pub trait TileDataLoader {
    fn load_tile_data(&self, desc: &TileDataDesc) -> Result<Box<dyn ByteStore>>;
}

impl<F> TileDataLoader for F
where
    F: Fn(&TileDataDesc) -> Result<Box<dyn ByteStore>>,
{
    fn load_tile_data(&self, desc: &TileDataDesc) -> Result<Box<dyn ByteStore>> {
        self(desc)
    }
}


/// Loads tile data files from a directory.
///
/// The file is named by the layer's data uri, else by its data id, else
/// `<layer id>.bin`, relative to the directory.
#[derive(Debug, Clone)]
pub struct DirLoader {
    pub root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirLoader { root: root.into() }
    }

    pub fn path(&self, desc: &TileDataDesc) -> PathBuf {
        if !desc.uri.is_empty() {
            self.root.join(&desc.uri)
        } else if !desc.data_id.is_empty() {
            self.root.join(&desc.data_id)
        } else {
            self.root.join(format!("{}.bin", desc.layer_id))
        }
    }
}

impl TileDataLoader for DirLoader {
    fn load_tile_data(&self, desc: &TileDataDesc) -> Result<Box<dyn ByteStore>> {
        let path = self.path(desc);
        let store = if desc.read_only {
            FileStore::open_read_only(&path)?
        } else {
            FileStore::open(&path)?
        };
        Ok(Box::new(store))
    }
}


#[test]
fn test_dir_loader_path() {
    let loader = DirLoader::new("/maps");
    let mut desc = TileDataDesc {
        layer_id: "l".to_owned(),
        data_id: "data.bin".to_owned(),
        uri: String::new(),
        read_only: false,
    };
    assert_eq!(loader.path(&desc), PathBuf::from("/maps/data.bin"));
    desc.uri = "uri.bin".to_owned();
    assert_eq!(loader.path(&desc), PathBuf::from("/maps/uri.bin"));
    desc.uri.clear();
    desc.data_id.clear();
    assert_eq!(loader.path(&desc), PathBuf::from("/maps/l.bin"));
}

#[test]
fn test_dir_loader_missing_file() {
    let loader = DirLoader::new(std::env::temp_dir().join("tilemap-no-such-dir"));
    let desc = TileDataDesc {
        layer_id: "l".to_owned(),
        data_id: String::new(),
        uri: String::new(),
        read_only: true,
    };
    assert!(loader.load_tile_data(&desc).is_err());
}
