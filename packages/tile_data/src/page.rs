
use crate::tile::{
    Tile,
    TileKind,
};


/// A contiguous run of tiles held in memory in their encoded form.
///
/// The bytes are laid out exactly as in the backing store, so paging in and
/// out is a flat copy. Tiles are decoded on access.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TilePage {
    kind: TileKind,
    bytes: Vec<u8>,
}

impl TilePage {
    /// Construct with `len` tiles, all set to `fill`.
    pub fn new(fill: Tile, len: usize) -> Self {
        let mut page = TilePage {
            kind: fill.kind(),
            bytes: vec![0; len * fill.byte_size()],
        };
        page.fill(fill);
        page
    }

    pub fn kind(&self) -> TileKind {
        self.kind
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.byte_size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Get the tile at some index.
    pub fn get(&self, i: usize) -> Tile {
        Tile::decode(self.kind, self.tile_bytes(i))
    }

    /// Set the tile at some index. Panics if the tile is of another kind.
    pub fn set(&mut self, i: usize, tile: Tile) {
        assert_eq!(tile.kind(), self.kind, "tile kind does not match page");
        tile.encode(self.tile_bytes_mut(i));
    }

    /// Set every tile to `tile`.
    pub fn fill(&mut self, tile: Tile) {
        self.fill_from(0, tile);
    }

    /// Set every tile from index `start` onward to `tile`.
    pub fn fill_from(&mut self, start: usize, tile: Tile) {
        assert_eq!(tile.kind(), self.kind, "tile kind does not match page");
        let size = self.kind.byte_size();
        let mut encoded = [0; 4];
        tile.encode(&mut encoded[..size]);
        for chunk in self.bytes[start * size..].chunks_exact_mut(size) {
            chunk.copy_from_slice(&encoded[..size]);
        }
    }

    /// Encoded bytes of the tile at some index.
    pub fn tile_bytes(&self, i: usize) -> &[u8] {
        let size = self.kind.byte_size();
        &self.bytes[i * size..(i + 1) * size]
    }

    pub fn tile_bytes_mut(&mut self, i: usize) -> &mut [u8] {
        let size = self.kind.byte_size();
        &mut self.bytes[i * size..(i + 1) * size]
    }

    /// Encoded bytes of the whole page.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}


#[test]
fn test_page_get_set() {
    let fill = Tile::RenderDataUInt8 { index: 1, data: 9 };
    let mut page = TilePage::new(fill, 8);
    assert_eq!(page.len(), 8);
    assert_eq!(page.bytes().len(), 16);
    page.set(3, Tile::RenderDataUInt8 { index: 7, data: 2 });
    assert_eq!(page.get(3), Tile::RenderDataUInt8 { index: 7, data: 2 });
    assert_eq!(page.get(2), fill);
    assert_eq!(page.tile_bytes(3), &[7, 2]);
}

#[test]
fn test_page_fill_from() {
    let mut page = TilePage::new(Tile::DataSInt16 { data: 0 }, 4);
    page.fill_from(2, Tile::DataSInt16 { data: -1 });
    assert_eq!(page.bytes(), &[0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
}

#[test]
#[should_panic]
fn test_page_rejects_other_kind() {
    let mut page = TilePage::new(Tile::Render { index: 0 }, 4);
    page.set(0, Tile::DataUInt8 { data: 1 });
}
