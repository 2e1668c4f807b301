
use std::{
    path::Path,
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
};
use crate::descriptor::CacheSize;
use serde::{Serialize, Deserialize};
use anyhow::Result;


pub const SETTINGS_FILE_NAME: &'static str = "tilemap.json";


/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cache window size, in tiles, of layers whose cache size is `Automatic`.
    pub automatic_cache_size: usize,
    /// Log filter used by the command line tool, before `RUST_LOG` is applied.
    pub default_log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            automatic_cache_size: 512,
            default_log_filter: crate::logging::DEFAULT_FILTER.to_owned(),
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults if the file is missing or
    /// malformed.
    pub fn read(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_read(path) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(path=%path.display(), error=%e, "using default settings");
                Settings::default()
            }
        }
    }

    pub fn try_read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Tile count of a layer's cache window.
    pub fn cache_tile_count(&self, cache: CacheSize) -> usize {
        cache.resolve(self.automatic_cache_size)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }
}


#[test]
fn test_settings_missing_file_defaults() {
    let settings = Settings::read("/nonexistent/tilemap.json");
    assert_eq!(settings.automatic_cache_size, 512);
}

#[test]
fn test_settings_partial_file() {
    let path = std::env::temp_dir().join(format!("tilemap_settings_{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "automatic_cache_size": 64 }"#).unwrap();
    let settings = Settings::try_read(&path).unwrap();
    assert_eq!(settings.automatic_cache_size, 64);
    assert_eq!(settings.default_log_filter, crate::logging::DEFAULT_FILTER);

    assert_eq!(settings.cache_tile_count(CacheSize::Automatic), 64);
    assert_eq!(settings.cache_tile_count(CacheSize::Cache16), 16);

    settings.write(&path).unwrap();
    assert_eq!(Settings::try_read(&path).unwrap().automatic_cache_size, 64);
    std::fs::remove_file(&path).unwrap();
}
