//! The closed set of fixed-size tile encodings.
//!
//! Every tile carries some combination of a "palette index" (selects a
//! material for rendering) and a "data value" (an auxiliary integer such as
//! elevation). Each encoding has an exact byte size with no padding, and the
//! byte layout is little-endian:
//!
//! | kind                | bytes | index bits | data bits        |
//! |---------------------|-------|------------|------------------|
//! | `Render`            | 1     | 0..8       | -                |
//! | `RenderData*Int4`   | 1     | 0..4       | 4..8             |
//! | `RenderData*Int8`   | 2     | byte 0     | byte 1           |
//! | `RenderData*Int24`  | 4     | 0..8       | 8..32            |
//! | `Data*Int8`         | 1     | -          | 0..8             |
//! | `Data*Int16`        | 2     | -          | 0..16            |

use std::fmt::{self, Formatter, Display};
use serde::{Serialize, Deserialize};


/// Tile encoding tag.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Render,
    #[serde(rename = "Render_DataSInt4")]
    RenderDataSInt4,
    #[serde(rename = "Render_DataUInt4")]
    RenderDataUInt4,
    #[serde(rename = "Render_DataSInt8")]
    RenderDataSInt8,
    #[serde(rename = "Render_DataUInt8")]
    RenderDataUInt8,
    #[serde(rename = "Render_DataSInt24")]
    RenderDataSInt24,
    #[serde(rename = "Render_DataUInt24")]
    RenderDataUInt24,
    DataSInt8,
    DataUInt8,
    DataSInt16,
    DataUInt16,
}

impl TileKind {
    pub const ALL: [TileKind; 11] = [
        TileKind::Render,
        TileKind::RenderDataSInt4,
        TileKind::RenderDataUInt4,
        TileKind::RenderDataSInt8,
        TileKind::RenderDataUInt8,
        TileKind::RenderDataSInt24,
        TileKind::RenderDataUInt24,
        TileKind::DataSInt8,
        TileKind::DataUInt8,
        TileKind::DataSInt16,
        TileKind::DataUInt16,
    ];

    /// Encoded size of one tile of this kind.
    pub fn byte_size(self) -> usize {
        match self {
            TileKind::Render => 1,
            TileKind::RenderDataSInt4 | TileKind::RenderDataUInt4 => 1,
            TileKind::RenderDataSInt8 | TileKind::RenderDataUInt8 => 2,
            TileKind::RenderDataSInt24 | TileKind::RenderDataUInt24 => 4,
            TileKind::DataSInt8 | TileKind::DataUInt8 => 1,
            TileKind::DataSInt16 | TileKind::DataUInt16 => 2,
        }
    }

    pub fn has_render_component(self) -> bool {
        self.max_palette_index().is_some()
    }

    pub fn has_data_component(self) -> bool {
        self != TileKind::Render
    }

    /// Largest palette index the encoding can hold, or `None` for data-only kinds.
    pub fn max_palette_index(self) -> Option<u8> {
        match self {
            TileKind::RenderDataSInt4 | TileKind::RenderDataUInt4 => Some(0xf),
            TileKind::Render
            | TileKind::RenderDataSInt8
            | TileKind::RenderDataUInt8
            | TileKind::RenderDataSInt24
            | TileKind::RenderDataUInt24 => Some(0xff),
            TileKind::DataSInt8
            | TileKind::DataUInt8
            | TileKind::DataSInt16
            | TileKind::DataUInt16 => None,
        }
    }

    /// Inclusive `(min, max)` range of the data value, or `None` for `Render`.
    pub fn value_range(self) -> Option<(i32, i32)> {
        match self {
            TileKind::Render => None,
            TileKind::RenderDataSInt4 => Some((-8, 7)),
            TileKind::RenderDataUInt4 => Some((0, 15)),
            TileKind::RenderDataSInt8 | TileKind::DataSInt8 => Some((i8::MIN as i32, i8::MAX as i32)),
            TileKind::RenderDataUInt8 | TileKind::DataUInt8 => Some((0, u8::MAX as i32)),
            TileKind::RenderDataSInt24 => Some((-0x800000, 0x7fffff)),
            TileKind::RenderDataUInt24 => Some((0, 0xffffff)),
            TileKind::DataSInt16 => Some((i16::MIN as i32, i16::MAX as i32)),
            TileKind::DataUInt16 => Some((0, u16::MAX as i32)),
        }
    }

    /// The all-zero tile of this kind.
    pub fn default_tile(self) -> Tile {
        match self {
            TileKind::Render => Tile::Render { index: 0 },
            TileKind::RenderDataSInt4 => Tile::RenderDataSInt4 { index: 0, data: 0 },
            TileKind::RenderDataUInt4 => Tile::RenderDataUInt4 { index: 0, data: 0 },
            TileKind::RenderDataSInt8 => Tile::RenderDataSInt8 { index: 0, data: 0 },
            TileKind::RenderDataUInt8 => Tile::RenderDataUInt8 { index: 0, data: 0 },
            TileKind::RenderDataSInt24 => Tile::RenderDataSInt24 { index: 0, data: 0 },
            TileKind::RenderDataUInt24 => Tile::RenderDataUInt24 { index: 0, data: 0 },
            TileKind::DataSInt8 => Tile::DataSInt8 { data: 0 },
            TileKind::DataUInt8 => Tile::DataUInt8 { data: 0 },
            TileKind::DataSInt16 => Tile::DataSInt16 { data: 0 },
            TileKind::DataUInt16 => Tile::DataUInt16 { data: 0 },
        }
    }

    /// Name as used in persisted descriptors.
    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Render => "Render",
            TileKind::RenderDataSInt4 => "Render_DataSInt4",
            TileKind::RenderDataUInt4 => "Render_DataUInt4",
            TileKind::RenderDataSInt8 => "Render_DataSInt8",
            TileKind::RenderDataUInt8 => "Render_DataUInt8",
            TileKind::RenderDataSInt24 => "Render_DataSInt24",
            TileKind::RenderDataUInt24 => "Render_DataUInt24",
            TileKind::DataSInt8 => "DataSInt8",
            TileKind::DataUInt8 => "DataUInt8",
            TileKind::DataSInt16 => "DataSInt16",
            TileKind::DataUInt16 => "DataUInt16",
        }
    }
}

impl Display for TileKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// One tile value. Sub-byte fields (the 4-bit and 24-bit variants) always
/// hold values within their field width when produced by this module.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Tile {
    Render { index: u8 },
    RenderDataSInt4 { index: u8, data: i8 },
    RenderDataUInt4 { index: u8, data: u8 },
    RenderDataSInt8 { index: u8, data: i8 },
    RenderDataUInt8 { index: u8, data: u8 },
    RenderDataSInt24 { index: u8, data: i32 },
    RenderDataUInt24 { index: u8, data: u32 },
    DataSInt8 { data: i8 },
    DataUInt8 { data: u8 },
    DataSInt16 { data: i16 },
    DataUInt16 { data: u16 },
}

// sign-extend the low `bits` bits of `val`
fn sign_extend(val: i32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (val << shift) >> shift
}

impl Tile {
    pub fn kind(&self) -> TileKind {
        match self {
            Tile::Render { .. } => TileKind::Render,
            Tile::RenderDataSInt4 { .. } => TileKind::RenderDataSInt4,
            Tile::RenderDataUInt4 { .. } => TileKind::RenderDataUInt4,
            Tile::RenderDataSInt8 { .. } => TileKind::RenderDataSInt8,
            Tile::RenderDataUInt8 { .. } => TileKind::RenderDataUInt8,
            Tile::RenderDataSInt24 { .. } => TileKind::RenderDataSInt24,
            Tile::RenderDataUInt24 { .. } => TileKind::RenderDataUInt24,
            Tile::DataSInt8 { .. } => TileKind::DataSInt8,
            Tile::DataUInt8 { .. } => TileKind::DataUInt8,
            Tile::DataSInt16 { .. } => TileKind::DataSInt16,
            Tile::DataUInt16 { .. } => TileKind::DataUInt16,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.kind().byte_size()
    }

    /// Palette index, if this kind has one.
    pub fn try_get_palette_index(&self) -> Option<u8> {
        match *self {
            Tile::Render { index }
            | Tile::RenderDataSInt4 { index, .. }
            | Tile::RenderDataUInt4 { index, .. }
            | Tile::RenderDataSInt8 { index, .. }
            | Tile::RenderDataUInt8 { index, .. }
            | Tile::RenderDataSInt24 { index, .. }
            | Tile::RenderDataUInt24 { index, .. } => Some(index),
            Tile::DataSInt8 { .. }
            | Tile::DataUInt8 { .. }
            | Tile::DataSInt16 { .. }
            | Tile::DataUInt16 { .. } => None,
        }
    }

    /// Set the palette index, truncated to the field width. Returns false if
    /// this kind has no palette index.
    pub fn try_set_palette_index(&mut self, val: u8) -> bool {
        match self {
            Tile::RenderDataSInt4 { index, .. } | Tile::RenderDataUInt4 { index, .. } => {
                *index = val & 0xf;
                true
            }
            Tile::Render { index }
            | Tile::RenderDataSInt8 { index, .. }
            | Tile::RenderDataUInt8 { index, .. }
            | Tile::RenderDataSInt24 { index, .. }
            | Tile::RenderDataUInt24 { index, .. } => {
                *index = val;
                true
            }
            Tile::DataSInt8 { .. }
            | Tile::DataUInt8 { .. }
            | Tile::DataSInt16 { .. }
            | Tile::DataUInt16 { .. } => false,
        }
    }

    /// Data value, if this kind has one.
    pub fn try_get_data_value(&self) -> Option<i32> {
        match *self {
            Tile::Render { .. } => None,
            Tile::RenderDataSInt4 { data, .. } => Some(data as i32),
            Tile::RenderDataUInt4 { data, .. } => Some(data as i32),
            Tile::RenderDataSInt8 { data, .. } => Some(data as i32),
            Tile::RenderDataUInt8 { data, .. } => Some(data as i32),
            Tile::RenderDataSInt24 { data, .. } => Some(data),
            Tile::RenderDataUInt24 { data, .. } => Some(data as i32),
            Tile::DataSInt8 { data } => Some(data as i32),
            Tile::DataUInt8 { data } => Some(data as i32),
            Tile::DataSInt16 { data } => Some(data as i32),
            Tile::DataUInt16 { data } => Some(data as i32),
        }
    }

    /// Set the data value, truncated to the field width (two's complement
    /// wrap for signed fields). Returns false if this kind has no data value.
    pub fn try_set_data_value(&mut self, val: i32) -> bool {
        match self {
            Tile::Render { .. } => return false,
            Tile::RenderDataSInt4 { data, .. } => *data = sign_extend(val, 4) as i8,
            Tile::RenderDataUInt4 { data, .. } => *data = (val & 0xf) as u8,
            Tile::RenderDataSInt8 { data, .. } => *data = val as i8,
            Tile::RenderDataUInt8 { data, .. } => *data = val as u8,
            Tile::RenderDataSInt24 { data, .. } => *data = sign_extend(val, 24),
            Tile::RenderDataUInt24 { data, .. } => *data = (val as u32) & 0xffffff,
            Tile::DataSInt8 { data } => *data = val as i8,
            Tile::DataUInt8 { data } => *data = val as u8,
            Tile::DataSInt16 { data } => *data = val as i16,
            Tile::DataUInt16 { data } => *data = val as u16,
        }
        true
    }

    /// Data value mapped into `[0, 1]` over the kind's value range.
    pub fn normalized_data_value(&self) -> Option<f32> {
        let val = self.try_get_data_value()?;
        let (min, max) = self.kind().value_range()?;
        Some((val as f64 - min as f64) as f32 / (max as f64 - min as f64) as f32)
    }

    /// Write the encoded bytes into `dst`, which must be exactly `byte_size` long.
    pub fn encode(&self, dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), self.byte_size());
        match *self {
            Tile::Render { index } => dst[0] = index,
            Tile::RenderDataSInt4 { index, data } => dst[0] = (index & 0xf) | ((data as u8 & 0xf) << 4),
            Tile::RenderDataUInt4 { index, data } => dst[0] = (index & 0xf) | ((data & 0xf) << 4),
            Tile::RenderDataSInt8 { index, data } => {
                dst[0] = index;
                dst[1] = data as u8;
            }
            Tile::RenderDataUInt8 { index, data } => {
                dst[0] = index;
                dst[1] = data;
            }
            Tile::RenderDataSInt24 { index, data } => {
                let bits = index as u32 | ((data as u32 & 0xffffff) << 8);
                dst.copy_from_slice(&bits.to_le_bytes());
            }
            Tile::RenderDataUInt24 { index, data } => {
                let bits = index as u32 | ((data & 0xffffff) << 8);
                dst.copy_from_slice(&bits.to_le_bytes());
            }
            Tile::DataSInt8 { data } => dst[0] = data as u8,
            Tile::DataUInt8 { data } => dst[0] = data,
            Tile::DataSInt16 { data } => dst.copy_from_slice(&data.to_le_bytes()),
            Tile::DataUInt16 { data } => dst.copy_from_slice(&data.to_le_bytes()),
        }
    }

    /// Decode a tile of the given kind from `src`, which must be exactly
    /// `kind.byte_size()` long.
    pub fn decode(kind: TileKind, src: &[u8]) -> Tile {
        debug_assert_eq!(src.len(), kind.byte_size());
        match kind {
            TileKind::Render => Tile::Render { index: src[0] },
            TileKind::RenderDataSInt4 => Tile::RenderDataSInt4 {
                index: src[0] & 0xf,
                data: sign_extend((src[0] >> 4) as i32, 4) as i8,
            },
            TileKind::RenderDataUInt4 => Tile::RenderDataUInt4 {
                index: src[0] & 0xf,
                data: src[0] >> 4,
            },
            TileKind::RenderDataSInt8 => Tile::RenderDataSInt8 {
                index: src[0],
                data: src[1] as i8,
            },
            TileKind::RenderDataUInt8 => Tile::RenderDataUInt8 {
                index: src[0],
                data: src[1],
            },
            TileKind::RenderDataSInt24 => {
                let bits = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
                Tile::RenderDataSInt24 {
                    index: bits as u8,
                    data: (bits as i32) >> 8,
                }
            }
            TileKind::RenderDataUInt24 => {
                let bits = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
                Tile::RenderDataUInt24 {
                    index: bits as u8,
                    data: bits >> 8,
                }
            }
            TileKind::DataSInt8 => Tile::DataSInt8 { data: src[0] as i8 },
            TileKind::DataUInt8 => Tile::DataUInt8 { data: src[0] },
            TileKind::DataSInt16 => Tile::DataSInt16 { data: i16::from_le_bytes([src[0], src[1]]) },
            TileKind::DataUInt16 => Tile::DataUInt16 { data: u16::from_le_bytes([src[0], src[1]]) },
        }
    }

    /// The encoded bytes zero-padded to 32 bits, read as little-endian.
    pub fn to_bits(&self) -> u32 {
        let mut buf = [0; 4];
        self.encode(&mut buf[..self.byte_size()]);
        u32::from_le_bytes(buf)
    }

    /// Inverse of `to_bits`. Bits beyond the kind's byte size are ignored.
    pub fn from_bits(kind: TileKind, bits: u32) -> Tile {
        Tile::decode(kind, &bits.to_le_bytes()[..kind.byte_size()])
    }
}


#[test]
fn test_byte_sizes_match_encoding() {
    for kind in TileKind::ALL {
        let mut buf = [0xaa; 4];
        kind.default_tile().encode(&mut buf[..kind.byte_size()]);
        assert!(buf[..kind.byte_size()].iter().all(|&b| b == 0), "{} default not zero", kind);
        assert!(buf[kind.byte_size()..].iter().all(|&b| b == 0xaa), "{} wrote past its size", kind);
    }
}

#[test]
fn test_data_only_has_no_palette_index() {
    let mut tile = TileKind::DataSInt16.default_tile();
    assert_eq!(tile.try_get_palette_index(), None);
    assert!(!tile.try_set_palette_index(3));
    assert!(tile.try_set_data_value(-1234));
    assert_eq!(tile.try_get_data_value(), Some(-1234));

    let mut tile = TileKind::Render.default_tile();
    assert_eq!(tile.try_get_data_value(), None);
    assert!(!tile.try_set_data_value(1));
    assert!(tile.try_set_palette_index(200));
    assert_eq!(tile.try_get_palette_index(), Some(200));
}

#[test]
fn test_nibble_packing() {
    let mut tile = TileKind::RenderDataSInt4.default_tile();
    assert!(tile.try_set_palette_index(0xa));
    assert!(tile.try_set_data_value(-3));
    let mut buf = [0];
    tile.encode(&mut buf);
    assert_eq!(buf[0], 0xda);
    let back = Tile::decode(TileKind::RenderDataSInt4, &buf);
    assert_eq!(back, tile);
    assert_eq!(back.try_get_data_value(), Some(-3));
}

#[test]
fn test_sub_field_truncation() {
    let mut tile = TileKind::RenderDataUInt4.default_tile();
    tile.try_set_palette_index(0x1f);
    tile.try_set_data_value(17);
    assert_eq!(tile.try_get_palette_index(), Some(0xf));
    assert_eq!(tile.try_get_data_value(), Some(1));

    let mut tile = TileKind::RenderDataSInt24.default_tile();
    tile.try_set_data_value(0x800000);
    assert_eq!(tile.try_get_data_value(), Some(-0x800000));

    let mut tile = TileKind::DataSInt8.default_tile();
    tile.try_set_data_value(130);
    assert_eq!(tile.try_get_data_value(), Some(-126));
}

#[test]
fn test_24_bit_layout() {
    let mut tile = TileKind::RenderDataSInt24.default_tile();
    tile.try_set_palette_index(0x12);
    tile.try_set_data_value(-2);
    assert_eq!(tile.to_bits(), 0xfffffe12);
    assert_eq!(Tile::from_bits(TileKind::RenderDataSInt24, 0xfffffe12), tile);

    let tile = Tile::RenderDataUInt24 { index: 1, data: 0xabcdef };
    assert_eq!(tile.to_bits(), 0xabcdef01);
}

#[test]
fn test_normalized_data_value() {
    let tile = Tile::DataUInt8 { data: 255 };
    assert_eq!(tile.normalized_data_value(), Some(1.0));
    let tile = Tile::RenderDataSInt4 { index: 0, data: -8 };
    assert_eq!(tile.normalized_data_value(), Some(0.0));
    assert_eq!(Tile::Render { index: 4 }.normalized_data_value(), None);
}
