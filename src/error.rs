use thiserror::Error;

use crate::mode::Mode;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown mode \"{0}\"")]
    UnknownMode(String),

    #[error("{bpp} bpp not allowed for mode {mode}")]
    BppNotAllowed { bpp: u32, mode: Mode },

    #[error("{width}x{height} tiles not allowed for mode {mode}")]
    TileSizeNotAllowed { width: u32, height: u32, mode: Mode },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{0}")]
    FormatInvalid(String),

    #[error("tile with too many ({count} > {max}) unique colors at {x},{y} in source image")]
    CellTooColorful {
        x: u32,
        y: u32,
        count: usize,
        max: usize,
    },

    #[error("no matching palette for tile at {x},{y} in source image")]
    NoMatchingSubpalette { x: u32, y: u32 },

    #[error("color {color} not in subpalette for tile at {x},{y} in source image")]
    ColorNotInSubpalette { x: u32, y: u32, color: String },

    #[error("colors in image do not fit in {available} subpalettes ({needed} needed)")]
    PaletteOverflow { needed: usize, available: usize },

    #[error("tileset exceeds maximum size ({max} tiles)")]
    TilesetFull { max: usize },

    #[error("{0}")]
    DimensionInvalid(String),
}
