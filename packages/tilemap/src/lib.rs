//! Tile-grid storage and paging engine.
//!
//! A map is an ordered list of layers sharing one size. Each layer stores one
//! tile per cell in a byte store, laid out densely or in sparse blocks, and is
//! accessed through a fixed-size cache window paged in and out on demand.

#[macro_use]
extern crate tracing;

pub mod logging;
pub mod settings;
pub mod json;
pub mod block_size;
pub mod descriptor;
pub mod storage;
pub mod paging;
pub mod layer;
pub mod map;
pub mod loader;
pub mod grid;

#[cfg(test)]
mod tests;

pub use crate::{
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
        TileDataLoader,
        DirLoader,
    },
    settings::Settings,
};
