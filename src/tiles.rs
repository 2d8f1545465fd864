//! Tiles and tilesets.
//!
//! A [`Tile`] is a cell of palette indices with its display palette and,
//! unless flipping is disabled, three precomputed mirror buffers. Tiles
//! compare equal when any stored orientation matches. The [`Tileset`]
//! deduplicates through a canonical-orientation index: each tile is keyed by
//! the lexicographically smallest of its four orientations, so lookup is a
//! hash probe confirmed by buffer compare instead of a scan over every tile.

use std::collections::HashMap;

use crate::color::{self, TRANSPARENT};
use crate::error::Error;
use crate::image::Image;
use crate::mode::Mode;
use crate::native;
use crate::palette::Palette;

/// Orientation of one tile occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flip {
    pub h: bool,
    pub v: bool,
}

/// Mirror an indexed buffer horizontally and/or vertically.
pub(crate) fn mirror(source: &[u8], width: usize, horizontal: bool, vertical: bool) -> Vec<u8> {
    let mut m = source.to_vec();
    let height = source.len() / width;
    debug_assert_eq!(source.len(), width * height);

    if horizontal {
        for row in m.chunks_exact_mut(width) {
            row.reverse();
        }
    }
    if vertical {
        let mut mv = Vec::with_capacity(m.len());
        for row in m.chunks_exact(width).rev() {
            mv.extend_from_slice(row);
        }
        m = mv;
    }
    m
}

#[derive(Debug, Clone, Default)]
pub struct Tile {
    mode: Option<Mode>,
    bpp: u32,
    width: u32,
    height: u32,
    data: Vec<u8>,
    mirrors: Vec<Vec<u8>>,
    palette: Vec<u32>,
}

impl Tile {
    /// Build a tile from an image carrying indexed data, masking indices to
    /// the color depth.
    pub fn from_image(image: &Image, mode: Mode, bpp: u32, no_flip: bool) -> Result<Self, Error> {
        if !image.has_indexed_data() {
            return Err(Error::ConfigInvalid(
                "can't create tile without indexed image data".into(),
            ));
        }
        let mask = color::bitmask_at_bpp(bpp);
        let data: Vec<u8> = image.indexed_data().iter().map(|&i| i & mask).collect();
        let mut tile = Tile {
            mode: Some(mode),
            bpp,
            width: image.width(),
            height: image.height(),
            data,
            mirrors: Vec::new(),
            palette: image.palette().to_vec(),
        };
        if !no_flip {
            tile.compute_mirrors();
        }
        Ok(tile)
    }

    /// Reconstruct a tile from native bytes. The palette becomes an evenly
    /// spaced grayscale ramp, which is what a round-tripped sheet shows.
    pub fn from_native(
        data: &[u8],
        mode: Mode,
        bpp: u32,
        no_flip: bool,
        width: u32,
        height: u32,
    ) -> Self {
        let size = color::palette_size_at_bpp(bpp);
        let step = (0x100 / size) as u8;
        let palette = (0..size)
            .map(|i| {
                let v = step.wrapping_mul(i as u8);
                color::pack(color::Rgba8 { r: v, g: v, b: v, a: 0xff })
            })
            .collect();
        let mut tile = Tile {
            mode: Some(mode),
            bpp,
            width,
            height,
            data: native::unpack_tile(data, mode, bpp, width, height),
            mirrors: Vec::new(),
            palette,
        };
        if !no_flip {
            tile.compute_mirrors();
        }
        tile
    }

    /// Assemble a larger tile from a row-major grid of 8x8 cells. Mirrors
    /// are computed after assembly, never inherited from the cells.
    pub fn from_metatile(cells: &[Tile], no_flip: bool, width: u32, height: u32) -> Self {
        let Some(first) = cells.first() else {
            return Tile::default();
        };
        let cell_dim = first.width as usize;
        let cells_h = width as usize / cell_dim;
        let cells_v = height as usize / cell_dim;

        let mut data = vec![0u8; (width * height) as usize];
        let mut cell_index = 0;
        for my in 0..cells_v {
            for mx in 0..cells_h {
                let cell = &cells[cell_index];
                for y in 0..cell_dim {
                    let dst = (my * cell_dim + y) * width as usize + mx * cell_dim;
                    data[dst..dst + cell_dim]
                        .copy_from_slice(&cell.data[y * cell_dim..(y + 1) * cell_dim]);
                }
                cell_index += 1;
            }
        }

        let mut tile = Tile {
            mode: first.mode,
            bpp: first.bpp,
            width,
            height,
            data,
            mirrors: Vec::new(),
            palette: first.palette.clone(),
        };
        if !no_flip {
            tile.compute_mirrors();
        }
        tile
    }

    fn empty(mode: Mode, bpp: u32, width: u32, height: u32) -> Self {
        Tile {
            mode: Some(mode),
            bpp,
            width,
            height,
            data: vec![0u8; (width * height) as usize],
            mirrors: Vec::new(),
            palette: vec![TRANSPARENT; color::palette_size_at_bpp(bpp)],
        }
    }

    fn compute_mirrors(&mut self) {
        let w = self.width as usize;
        self.mirrors = vec![
            mirror(&self.data, w, true, false),
            mirror(&self.data, w, false, true),
            mirror(&self.data, w, true, true),
        ];
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Equality under stored orientations.
    pub fn equivalent(&self, other: &Tile) -> bool {
        self.data == other.data || self.mirrors.iter().any(|m| *m == other.data)
    }

    /// Which of this tile's orientations reproduces `other`. Identity when
    /// no mirror matches (or none are stored).
    pub fn flipped_versus(&self, other: &Tile) -> Flip {
        if self.data == other.data {
            return Flip::default();
        }
        if self.mirrors.get(0).is_some_and(|m| *m == other.data) {
            Flip { h: true, v: false }
        } else if self.mirrors.get(1).is_some_and(|m| *m == other.data) {
            Flip { h: false, v: true }
        } else if self.mirrors.get(2).is_some_and(|m| *m == other.data) {
            Flip { h: true, v: true }
        } else {
            Flip::default()
        }
    }

    /// Extract a sub-rectangle, keeping bpp, palette and flip policy.
    pub fn crop(&self, x: u32, y: u32, crop_width: u32, crop_height: u32) -> Tile {
        let mut data = vec![0u8; (crop_width * crop_height) as usize];
        if x < self.width && y < self.height {
            let blit_w = crop_width.min(self.width - x) as usize;
            let blit_h = crop_height.min(self.height - y) as usize;
            for iy in 0..blit_h {
                let src = (x + (y + iy as u32) * self.width) as usize;
                let dst = iy * crop_width as usize;
                data[dst..dst + blit_w].copy_from_slice(&self.data[src..src + blit_w]);
            }
        }
        let mut tile = Tile {
            mode: self.mode,
            bpp: self.bpp,
            width: crop_width,
            height: crop_height,
            data,
            mirrors: Vec::new(),
            palette: self.palette.clone(),
        };
        if !self.mirrors.is_empty() {
            tile.compute_mirrors();
        }
        tile
    }

    /// Row-major grid of sub-tiles.
    pub fn crops(&self, tile_width: u32, tile_height: u32) -> Vec<Tile> {
        let mut tiles = Vec::new();
        let mut y = 0;
        while y < self.height {
            let mut x = 0;
            while x < self.width {
                tiles.push(self.crop(x, y, tile_width, tile_height));
                x += tile_width;
            }
            y += tile_height;
        }
        tiles
    }

    pub fn native_data(&self) -> Vec<u8> {
        let mode = self.mode.expect("tile carries a mode");
        native::pack_tile(&self.data, mode, self.bpp, self.width, self.height)
    }

    /// Pixels as packed colors, via the tile's palette.
    pub fn rgba_data(&self) -> Vec<u32> {
        self.data
            .iter()
            .map(|&i| self.palette.get(i as usize).copied().unwrap_or(TRANSPARENT))
            .collect()
    }

    /// The lexicographically smallest orientation, used as dedup key.
    fn canonical(&self, under_flips: bool) -> Vec<u8> {
        if !under_flips {
            return self.data.clone();
        }
        let w = self.width as usize;
        let mut best = self.data.clone();
        for (h, v) in [(true, false), (false, true), (true, true)] {
            let m = mirror(&self.data, w, h, v);
            if m < best {
                best = m;
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
pub struct Tileset {
    mode: Mode,
    bpp: u32,
    tile_width: u32,
    tile_height: u32,
    no_discard: bool,
    no_flip: bool,
    no_remap: bool,
    max_tiles: usize,
    tiles: Vec<Tile>,
    canonical_index: HashMap<Vec<u8>, usize>,
    discarded: usize,
}

impl Tileset {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: Mode,
        bpp: u32,
        tile_width: u32,
        tile_height: u32,
        no_discard: bool,
        no_flip: bool,
        no_remap: bool,
        max_tiles: usize,
    ) -> Self {
        Self {
            mode,
            bpp,
            tile_width,
            tile_height,
            no_discard,
            no_flip,
            no_remap,
            max_tiles,
            tiles: Vec::new(),
            canonical_index: HashMap::new(),
            discarded: 0,
        }
    }

    /// Deserialize a tileset from native bytes, reassembling larger tiles
    /// from the 8x8 cell layout when the geometry calls for it.
    pub fn from_native(
        data: &[u8],
        mode: Mode,
        bpp: u32,
        tile_width: u32,
        tile_height: u32,
        no_flip: bool,
    ) -> Result<Self, Error> {
        let mut set = Tileset::new(mode, bpp, tile_width, tile_height, false, no_flip, false, 0);

        let (cell_w, cell_h) = if mode == Mode::PceSprite {
            (tile_width, tile_height)
        } else {
            (8, 8)
        };
        let bytes_per_tile = native::bytes_per_tile(mode, bpp, cell_w, cell_h);
        if data.len() % bytes_per_tile != 0 {
            return Err(Error::FormatInvalid(format!(
                "tile data size {} is not a multiple of {bytes_per_tile} bytes per tile",
                data.len()
            )));
        }

        let mut tiles: Vec<Tile> = data
            .chunks_exact(bytes_per_tile)
            .map(|chunk| Tile::from_native(chunk, mode, bpp, no_flip, cell_w, cell_h))
            .collect();

        if mode != Mode::PceSprite && (tile_width != 8 || tile_height != 8) {
            tiles = set.layout_for_input(tiles);
        }

        for (i, tile) in tiles.iter().enumerate() {
            let key = tile.canonical(!no_flip);
            set.canonical_index.entry(key).or_insert(i);
        }
        set.tiles = tiles;
        Ok(set)
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.max_tiles > 0 && self.tiles.len() >= self.max_tiles
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Tiles dropped as duplicates so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Add one cell. Unless `no_remap`, the cell is remapped through the
    /// first matching subpalette; unless `no_discard`, a cell equal to an
    /// existing tile under the allowed orientations is dropped.
    pub fn add(&mut self, image: &Image, palette: Option<&Palette>) -> Result<(), Error> {
        let tile = if self.no_remap {
            Tile::from_image(image, self.mode, self.bpp, self.no_flip)?
        } else {
            let palette = palette.ok_or_else(|| {
                Error::ConfigInvalid("can't remap tile without a palette".into())
            })?;
            let subpalette = palette.subpalette_matching(image)?;
            let remapped = image.remapped(subpalette)?;
            Tile::from_image(&remapped, self.mode, self.bpp, self.no_flip)?
        };

        if !self.no_discard && self.index_of(&tile).is_some() {
            self.discarded += 1;
            return Ok(());
        }
        self.push(tile)
    }

    fn push(&mut self, tile: Tile) -> Result<(), Error> {
        let key = tile.canonical(!self.no_flip);
        let index = self.tiles.len();
        self.tiles.push(tile);
        self.canonical_index.entry(key).or_insert(index);
        if self.max_tiles > 0 && self.tiles.len() > self.max_tiles {
            return Err(Error::TilesetFull { max: self.max_tiles });
        }
        Ok(())
    }

    /// Index of the first tile equal to `tile` under the allowed
    /// orientations.
    pub fn index_of(&self, tile: &Tile) -> Option<usize> {
        let key = tile.canonical(!self.no_flip);
        let &candidate = self.canonical_index.get(&key)?;
        debug_assert!(
            self.tiles[candidate].equivalent(tile) || self.tiles[candidate].data() == tile.data()
        );
        Some(candidate)
    }

    /// Native tile bytes, re-laid-out into 8x8 cells for meta-tile modes.
    pub fn native_data(&self) -> Vec<u8> {
        let laid_out;
        let tiles: &[Tile] =
            if self.mode != Mode::PceSprite && (self.tile_width != 8 || self.tile_height != 8) {
                laid_out = self.layout_for_output();
                &laid_out
            } else {
                &self.tiles
            };

        let mut data = Vec::new();
        for tile in tiles {
            data.extend(tile.native_data());
        }
        data
    }

    /// Split tiles into 8x8 cells arranged in the mode's fixed-width rows:
    /// 16 cells wide for snes, a single column for the 8x16 layouts.
    fn layout_for_output(&self) -> Vec<Tile> {
        let cells_h = (self.tile_width / 8).max(1);
        let cells_v = (self.tile_height / 8).max(1);
        let cells_per_row = self.mode.metatile_row_cells().max(cells_h);
        let tiles_per_row = cells_per_row / cells_h;

        let cell_rows = (self.tiles.len() as u32).div_ceil(tiles_per_row) * cells_v;
        let mut out =
            vec![Tile::empty(self.mode, self.bpp, 8, 8); (cells_per_row * cell_rows) as usize];

        for (i, tile) in self.tiles.iter().enumerate() {
            let i = i as u32;
            let base =
                (i / tiles_per_row) * cells_v * cells_per_row + (i % tiles_per_row) * cells_h;
            let cells = tile.crops(8, 8);
            for cy in 0..cells_v {
                for cx in 0..cells_h {
                    out[(base + cy * cells_per_row + cx) as usize] =
                        cells[(cy * cells_h + cx) as usize].clone();
                }
            }
        }
        out
    }

    /// Inverse of [`Tileset::layout_for_output`].
    fn layout_for_input(&self, cells: Vec<Tile>) -> Vec<Tile> {
        let cells_h = (self.tile_width / 8).max(1);
        let cells_v = (self.tile_height / 8).max(1);
        let cells_per_row = self.mode.metatile_row_cells().max(cells_h);
        let tiles_per_row = cells_per_row / cells_h;

        let count = cells.len() / (cells_h * cells_v) as usize;
        let mut out = Vec::with_capacity(count);
        for i in 0..count as u32 {
            let base =
                (i / tiles_per_row) * cells_v * cells_per_row + (i % tiles_per_row) * cells_h;
            let mut group = Vec::with_capacity((cells_h * cells_v) as usize);
            for cy in 0..cells_v {
                for cx in 0..cells_h {
                    if let Some(cell) = cells.get((base + cy * cells_per_row + cx) as usize) {
                        group.push(cell.clone());
                    }
                }
            }
            if group.len() == (cells_h * cells_v) as usize {
                out.push(Tile::from_metatile(
                    &group,
                    self.no_flip,
                    self.tile_width,
                    self.tile_height,
                ));
            }
        }
        out
    }
}
