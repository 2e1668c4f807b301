//! Tile value encodings, in-memory tile pages, and the byte stores tile data
//! is paged to and from.

#[macro_use]
extern crate tracing;

pub mod tile;
pub mod page;
pub mod store;
pub mod file_store;

pub use crate::{
    tile::{
        Tile,
        TileKind,
    },
    page::TilePage,
    store::{
        ByteStore,
        VecStore,
    },
    file_store::FileStore,
};
