//! Image representation and slicing.
//!
//! An [`Image`] owns an RGBA pixel buffer and, when it originated from
//! indexed data (or from a palette remap), a parallel index buffer plus the
//! palette those indices refer to. Crops remember where in the source image
//! they came from so downstream diagnostics can point at pixels.

use std::collections::BTreeSet;

use crate::color::{self, Rgba8, TRANSPARENT};
use crate::error::Error;
use crate::mode::Mode;
use crate::palette::{Palette, Subpalette};
use crate::tiles::Tileset;

#[derive(Debug, Clone)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
    indexed: Vec<u8>,
    palette: Vec<u32>,
    src_x: u32,
    src_y: u32,
}

impl Image {
    /// Wrap an RGBA pixel buffer.
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self, Error> {
        if pixels.len() != (width * height) as usize {
            return Err(Error::DimensionInvalid(format!(
                "pixel buffer length {} does not match {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            indexed: Vec::new(),
            palette: Vec::new(),
            src_x: 0,
            src_y: 0,
        })
    }

    /// Build an image from indexed pixels and their palette. The RGBA buffer
    /// is derived by palette lookup.
    pub fn with_indexed(
        width: u32,
        height: u32,
        indexed: Vec<u8>,
        palette: Vec<u32>,
    ) -> Result<Self, Error> {
        if indexed.len() != (width * height) as usize {
            return Err(Error::DimensionInvalid(format!(
                "index buffer length {} does not match {width}x{height}",
                indexed.len()
            )));
        }
        let pixels = indexed
            .iter()
            .map(|&i| color::unpack(palette.get(i as usize).copied().unwrap_or(TRANSPARENT)))
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
            indexed,
            palette,
            src_x: 0,
            src_y: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Top-left corner of this image in the source it was cropped from.
    pub fn src_coords(&self) -> (u32, u32) {
        (self.src_x, self.src_y)
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    pub fn indexed_data(&self) -> &[u8] {
        &self.indexed
    }

    pub fn has_indexed_data(&self) -> bool {
        !self.indexed.is_empty()
    }

    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    pub fn rgba_at(&self, index: usize) -> u32 {
        color::pack(self.pixels[index])
    }

    pub fn rgba_data(&self) -> Vec<u32> {
        self.pixels.iter().map(|&px| color::pack(px)).collect()
    }

    /// Unique colors, ordered by their packed encoding.
    pub fn colors(&self) -> BTreeSet<u32> {
        self.pixels.iter().map(|&px| color::pack(px)).collect()
    }

    /// Extract a `width` x `height` rectangle at `(x, y)`. Pixels past the
    /// source bounds take the mode's fill color. The crop records its origin.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32, mode: Mode) -> Image {
        let fill = color::unpack(mode.crop_fill());
        let mut pixels = vec![fill; (width * height) as usize];
        let mut indexed = if self.indexed.is_empty() {
            Vec::new()
        } else {
            vec![0u8; (width * height) as usize]
        };

        if x < self.width && y < self.height {
            let blit_w = width.min(self.width - x);
            let blit_h = height.min(self.height - y);
            for iy in 0..blit_h {
                for ix in 0..blit_w {
                    let src = ((y + iy) * self.width + x + ix) as usize;
                    let dst = (iy * width + ix) as usize;
                    pixels[dst] = self.pixels[src];
                    if !indexed.is_empty() {
                        indexed[dst] = self.indexed[src];
                    }
                }
            }
        }

        Image {
            width,
            height,
            pixels,
            indexed,
            palette: self.palette.clone(),
            src_x: x,
            src_y: y,
        }
    }

    /// Slice into row-major cells of `tile_width` x `tile_height`.
    pub fn crops(&self, tile_width: u32, tile_height: u32, mode: Mode) -> Vec<Image> {
        let mut cells = Vec::new();
        let mut y = 0;
        while y < self.height {
            let mut x = 0;
            while x < self.width {
                cells.push(self.crop(x, y, tile_width, tile_height, mode));
                x += tile_width;
            }
            y += tile_height;
        }
        cells
    }

    /// Remap against a subpalette: each pixel is reduced and replaced by its
    /// palette index, with the normalized colors attached as the image
    /// palette. Transparent pixels always map to index 0.
    pub fn remapped(&self, subpalette: &Subpalette) -> Result<Image, Error> {
        let mode = subpalette.mode();
        let normalized = subpalette.normalized_colors();
        let size = (self.width * self.height) as usize;
        let mut indexed = vec![0u8; size];
        let mut pixels = vec![color::unpack(TRANSPARENT); size];

        for i in 0..size {
            let reduced = mode.reduce(self.rgba_at(i));
            if reduced == TRANSPARENT {
                continue;
            }
            match subpalette.index_of(reduced) {
                Some(pi) => {
                    indexed[i] = pi as u8;
                    pixels[i] = color::unpack(normalized[pi]);
                }
                None => {
                    return Err(Error::ColorNotInSubpalette {
                        x: self.src_x,
                        y: self.src_y,
                        color: color::to_hex(mode.normalize(reduced)),
                    });
                }
            }
        }

        Ok(Image {
            width: self.width,
            height: self.height,
            pixels,
            indexed,
            palette: normalized,
            src_x: self.src_x,
            src_y: self.src_y,
        })
    }

    /// Render a palette as a swatch sheet: one row per subpalette, one pixel
    /// per color slot.
    pub fn from_palette(palette: &Palette) -> Result<Image, Error> {
        let rows = palette.normalized_colors();
        if rows.is_empty() || rows[0].is_empty() {
            return Err(Error::ConfigInvalid("palette has no colors".into()));
        }
        let width = palette.max_colors_per_subpalette() as u32;
        let height = rows.len() as u32;
        let mut pixels = vec![color::unpack(TRANSPARENT); (width * height) as usize];
        for (y, row) in rows.iter().enumerate() {
            for (x, &c) in row.iter().enumerate() {
                pixels[y * width as usize + x] = color::unpack(c);
            }
        }
        Image::new(width, height, pixels)
    }

    /// Render a tileset as a sheet, `image_width` pixels wide. Both the RGBA
    /// view and the indexed view are produced so the sheet can round-trip
    /// through an indexed file.
    pub fn from_tileset(tileset: &Tileset, image_width: u32) -> Result<Image, Error> {
        let image_width = if image_width == 0 { 128 } else { image_width };
        let tile_w = tileset.tile_width();
        let tile_h = tileset.tile_height();
        let tiles_per_row = (image_width / tile_w).max(1);
        let rows = (tileset.len() as u32).div_ceil(tiles_per_row);

        let width = image_width;
        let height = (rows * tile_h).max(tile_h);
        let size = (width * height) as usize;
        let mut img = Image {
            width,
            height,
            pixels: vec![color::unpack(TRANSPARENT); size],
            indexed: vec![0u8; size],
            palette: tileset
                .tiles()
                .first()
                .map(|t| t.palette().to_vec())
                .unwrap_or_default(),
            src_x: 0,
            src_y: 0,
        };

        for (i, tile) in tileset.tiles().iter().enumerate() {
            let ox = (i as u32 % tiles_per_row) * tile_w;
            let oy = (i as u32 / tiles_per_row) * tile_h;
            let rgba = tile.rgba_data();
            for (j, &c) in rgba.iter().enumerate() {
                let x = ox + j as u32 % tile_w;
                let y = oy + j as u32 / tile_w;
                if x < width && y < height {
                    let dst = (y * width + x) as usize;
                    img.pixels[dst] = color::unpack(c);
                    img.indexed[dst] = tile.data()[j];
                }
            }
        }
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32, a: u32, b: u32) -> Image {
        let pixels = (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                color::unpack(if (x + y) % 2 == 0 { a } else { b })
            })
            .collect();
        Image::new(width, height, pixels).unwrap()
    }

    #[test]
    fn new_validates_dimensions() {
        assert!(matches!(
            Image::new(4, 4, vec![color::unpack(0); 3]),
            Err(Error::DimensionInvalid(_))
        ));
    }

    #[test]
    fn crops_are_row_major_with_source_coords() {
        let img = checker(16, 16, 0xff00_00ff, 0xffff_ffff);
        let cells = img.crops(8, 8, Mode::Snes);
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].src_coords(), (0, 0));
        assert_eq!(cells[1].src_coords(), (8, 0));
        assert_eq!(cells[2].src_coords(), (0, 8));
        assert_eq!(cells[3].src_coords(), (8, 8));
    }

    #[test]
    fn out_of_bounds_crop_takes_mode_fill() {
        let img = checker(4, 4, 0xff00_00ff, 0xff00_00ff);
        let cell = img.crop(0, 0, 8, 8, Mode::Snes);
        assert_eq!(cell.rgba_at(4), TRANSPARENT);
        assert_eq!(cell.rgba_at(0), 0xff00_00ff);

        let gray = img.crop(0, 0, 8, 8, Mode::Gb);
        assert_eq!(gray.rgba_at(4), 0xff00_0000);
    }

    #[test]
    fn color_set_is_sorted_and_unique() {
        let img = checker(4, 4, 0xffff_ffff, 0xff00_00ff);
        let colors: Vec<u32> = img.colors().into_iter().collect();
        assert_eq!(colors, vec![0xff00_00ff, 0xffff_ffff]);
    }

    #[test]
    fn indexed_image_preserves_indices() {
        let palette = vec![0xff00_0000, 0xffff_ffff];
        let img = Image::with_indexed(2, 2, vec![0, 1, 1, 0], palette).unwrap();
        assert!(img.has_indexed_data());
        assert_eq!(img.indexed_data(), &[0, 1, 1, 0]);
        assert_eq!(img.rgba_at(1), 0xffff_ffff);
    }
}
