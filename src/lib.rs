#![forbid(unsafe_code)]

//! Convert RGBA raster images into the three coupled artifacts classic 2D
//! tile hardware consumes: a palette bank, a deduplicated tileset, and a
//! tilemap of (tile, subpalette, flip) references — plus the exact
//! bit-packed byte streams each target expects.
//!
//! The pipeline runs strictly forward:
//!
//! ```text
//! Image -> crops -> Palette -> remap -> Tileset -> Map -> native data
//! ```
//!
//! Each stage owns its output and is frozen before the next stage reads it,
//! so two runs over the same input produce byte-identical artifacts.

pub mod color;
pub mod error;
pub mod image;
pub mod map;
pub mod mode;
pub mod native;
pub mod palette;
pub mod tiles;

pub use color::TRANSPARENT;
pub use error::Error;
pub use image::Image;
pub use map::{Map, MapEntry};
pub use mode::Mode;
pub use palette::{Palette, Subpalette};
pub use tiles::{Flip, Tile, Tileset};

pub type Result<T> = std::result::Result<T, Error>;
