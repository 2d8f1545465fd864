//! Tilemap assembly and serialization.
//!
//! Assembly is lenient: a cell that matches no subpalette or no tile logs a
//! warning and leaves a zero entry, so a broken region of the source image
//! still produces a map the user can inspect. Base offsets are applied when
//! entries are read back, after the meta-tile layout correction, and clamp
//! at zero.

use log::warn;
use serde_json::json;

use crate::error::Error;
use crate::image::Image;
use crate::mode::Mode;
use crate::palette::Palette;
use crate::tiles::{Tile, Tileset};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapEntry {
    pub tile_index: u32,
    pub palette_index: u32,
    pub flip_h: bool,
    pub flip_v: bool,
}

/// Pack one map entry into the mode's native layout.
pub fn pack_native_mapentry(entry: &MapEntry, mode: Mode) -> Vec<u8> {
    let t = entry.tile_index;
    let p = entry.palette_index;
    let fh = entry.flip_h as u32;
    let fv = entry.flip_v as u32;

    match mode {
        Mode::Snes => vec![
            (t & 0xff) as u8,
            (((t >> 8) & 0x03) | ((p << 2) & 0x1c) | (fh << 6) | (fv << 7)) as u8,
        ],
        Mode::SnesMode7 | Mode::GbaAffine | Mode::Gb => vec![(t & 0xff) as u8],
        Mode::Gbc => vec![
            (t & 0xff) as u8,
            ((p & 0x07) | ((t >> 5) & 0x08) | (fh << 5) | (fv << 6)) as u8,
        ],
        Mode::Gba => {
            let word = (t & 0x3ff) | (fh << 10) | (fv << 11) | ((p & 0xf) << 12);
            (word as u16).to_le_bytes().to_vec()
        }
        Mode::Md => {
            let word = (t & 0x7ff) | (fh << 11) | (fv << 12) | ((p & 0x3) << 13);
            (word as u16).to_be_bytes().to_vec()
        }
        Mode::Pce | Mode::PceSprite => {
            let word = (t & 0xfff) | ((p & 0xf) << 12);
            (word as u16).to_le_bytes().to_vec()
        }
        Mode::Ws | Mode::Wsc | Mode::WscPacked => {
            let word = (t & 0x1ff) | ((p & 0xf) << 9) | (fh << 14) | (fv << 15);
            (word as u16).to_le_bytes().to_vec()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Map {
    mode: Mode,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    entries: Vec<MapEntry>,
    tile_base_offset: i32,
    palette_base_offset: i32,
}

impl Map {
    pub fn new(mode: Mode, width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            mode,
            width,
            height,
            tile_width,
            tile_height,
            entries: vec![MapEntry::default(); (width * height) as usize],
            tile_base_offset: 0,
            palette_base_offset: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_tile_base_offset(&mut self, offset: i32) {
        self.tile_base_offset = offset;
    }

    pub fn set_palette_base_offset(&mut self, offset: i32) {
        self.palette_base_offset = offset;
    }

    /// Locate the cell's (tile, subpalette, flip) triple and record it at
    /// `(pos_x, pos_y)`. Per-cell match failures warn and leave a zero
    /// entry; only positional misuse and remap inconsistencies are errors.
    pub fn add(
        &mut self,
        image: &Image,
        tileset: &Tileset,
        palette: &Palette,
        bpp: u32,
        pos_x: u32,
        pos_y: u32,
    ) -> Result<(), Error> {
        if pos_x >= self.width || pos_y >= self.height {
            return Err(Error::DimensionInvalid(format!(
                "map entry {pos_x},{pos_y} out of bounds for {}x{} map",
                self.width, self.height
            )));
        }
        let slot = (pos_y * self.width + pos_x) as usize;
        let (src_x, src_y) = image.src_coords();

        let candidates = match palette.subpalettes_matching(image) {
            Ok(c) => c,
            Err(e @ Error::CellTooColorful { .. }) => {
                warn!("{e}");
                self.entries[slot] = MapEntry::default();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut matched: Option<(usize, usize, Tile)> = None;
        for palette_index in candidates {
            let remapped = image.remapped(palette.subpalette_at(palette_index))?;
            let tile = Tile::from_image(&remapped, self.mode, bpp, true)?;
            if let Some(tile_index) = tileset.index_of(&tile) {
                matched = Some((tile_index, palette_index, tile));
                break;
            }
        }

        let Some((tile_index, palette_index, tile)) = matched else {
            warn!("no matching tile for position {src_x},{src_y} in source image");
            self.entries[slot] = MapEntry::default();
            return Ok(());
        };

        let cap = self.mode.max_tile_count();
        if cap > 0 && tile_index >= cap {
            warn!("mapped tile exceeds allowed map index at position {src_x},{src_y}");
            self.entries[slot] = MapEntry::default();
            return Ok(());
        }

        let flip = tileset.tiles()[tile_index].flipped_versus(&tile);
        self.entries[slot] = MapEntry {
            tile_index: tile_index as u32,
            palette_index: palette_index as u32,
            flip_h: flip.h,
            flip_v: flip.v,
        };
        Ok(())
    }

    /// Entry at a cell position, with the meta-tile layout correction and
    /// the base offsets applied (in that order).
    pub fn entry_at(&self, x: u32, y: u32) -> MapEntry {
        let mut entry = if x < self.width && y < self.height {
            self.entries[(y * self.width + x) as usize]
        } else {
            MapEntry::default()
        };

        if (self.tile_width != 8 || self.tile_height != 8) && self.mode != Mode::PceSprite {
            // rewrite the meta-tile slot into its top-left 8x8 cell index
            let cells_h = (self.tile_width / 8).max(1);
            let cells_v = (self.tile_height / 8).max(1);
            let cells_per_row = self.mode.metatile_row_cells().max(cells_h);
            let tiles_per_row = cells_per_row / cells_h;
            let col = entry.tile_index % tiles_per_row;
            let row = entry.tile_index / tiles_per_row;
            entry.tile_index = col * cells_h + row * cells_per_row * cells_v;
        }

        entry.tile_index =
            (entry.tile_index as i64 + self.tile_base_offset as i64).max(0) as u32;
        entry.palette_index =
            (entry.palette_index as i64 + self.palette_base_offset as i64).max(0) as u32;
        entry
    }

    /// Entries grouped into output blocks. With no split there is a single
    /// block of the whole map; otherwise blocks of `split_w` x `split_h`
    /// cells are emitted, columns of blocks first. `column_order` permutes
    /// each block's entries into column-major order.
    fn collect_entries(
        &self,
        column_order: bool,
        split_w: u32,
        split_h: u32,
    ) -> Vec<Vec<MapEntry>> {
        let split_w = if split_w == 0 || split_w > self.width {
            self.width
        } else {
            split_w
        };
        let split_h = if split_h == 0 || split_h > self.height {
            self.height
        } else {
            split_h
        };

        let mut blocks: Vec<Vec<MapEntry>> = Vec::new();
        if split_w == self.width && split_h == self.height {
            let mut block = Vec::with_capacity((self.width * self.height) as usize);
            for y in 0..self.height {
                for x in 0..self.width {
                    block.push(self.entry_at(x, y));
                }
            }
            blocks.push(block);
        } else {
            let columns = self.width.div_ceil(split_w).max(1);
            let rows = self.height.div_ceil(split_h).max(1);
            for col in 0..columns {
                for row in 0..rows {
                    let mut block = Vec::with_capacity((split_w * split_h) as usize);
                    for pos in 0..(split_w * split_h) {
                        block.push(
                            self.entry_at(col * split_w + pos % split_w, row * split_h + pos / split_w),
                        );
                    }
                    blocks.push(block);
                }
            }
        }

        if column_order {
            let len = (split_w * split_h) as usize;
            blocks = blocks
                .iter()
                .map(|block| {
                    (0..block.len())
                        .map(|pos| block[(pos * split_w as usize + pos / split_h as usize) % len])
                        .collect()
                })
                .collect();
        }
        blocks
    }

    pub fn native_data(&self, column_order: bool, split_w: u32, split_h: u32) -> Vec<u8> {
        let mut data = Vec::new();
        for block in self.collect_entries(column_order, split_w, split_h) {
            for entry in block {
                data.extend(pack_native_mapentry(&entry, self.mode));
            }
        }
        data
    }

    /// Interleave map and tile bytes: map data on even offsets, tile data on
    /// odd, the shorter stream padded with zeros.
    pub fn interleaved_data(&self, tileset: &Tileset) -> Vec<u8> {
        let map_data = self.native_data(false, 0, 0);
        let tile_data = tileset.native_data();

        let half = map_data.len().max(tile_data.len());
        let mut data = vec![0u8; half * 2];
        for (i, &b) in map_data.iter().enumerate() {
            data[i * 2] = b;
        }
        for (i, &b) in tile_data.iter().enumerate() {
            data[i * 2 + 1] = b;
        }
        data
    }

    /// Even-offset bytes first, then odd-offset bytes, for banked VRAM
    /// targets. Requires map dimensions in multiples of 32 cells.
    pub fn banked_data(&self) -> Result<Vec<u8>, Error> {
        if self.width % 32 != 0 || self.height % 32 != 0 {
            return Err(Error::DimensionInvalid(
                "banked output requires map dimensions to be multiples of 32".into(),
            ));
        }
        let linear = self.native_data(false, 0, 0);
        let half = linear.len() / 2;
        let mut banked = vec![0u8; linear.len()];
        for i in 0..half {
            banked[i] = linear[i * 2];
            banked[half + i] = linear[i * 2 + 1];
        }
        Ok(banked)
    }

    /// JSON document of entries. Palette and flip fields are omitted when
    /// the mode has a single palette or no flipping; split output produces
    /// a `maps` array instead of a single `map`.
    pub fn to_json(&self, column_order: bool, split_w: u32, split_h: u32) -> String {
        let with_palette = self.mode.default_palette_count() > 1;
        let with_flips = self.mode.tile_flipping_allowed();

        let blocks = self.collect_entries(column_order, split_w, split_h);
        let json_blocks: Vec<serde_json::Value> = blocks
            .iter()
            .map(|block| {
                let entries: Vec<serde_json::Value> = block
                    .iter()
                    .map(|e| match (with_flips, with_palette) {
                        (true, true) => json!({
                            "tile": e.tile_index,
                            "palette": e.palette_index,
                            "flip_h": e.flip_h as u8,
                            "flip_v": e.flip_v as u8,
                        }),
                        (true, false) => json!({
                            "tile": e.tile_index,
                            "flip_h": e.flip_h as u8,
                            "flip_v": e.flip_v as u8,
                        }),
                        (false, true) => json!({
                            "tile": e.tile_index,
                            "palette": e.palette_index,
                        }),
                        (false, false) => json!({ "tile": e.tile_index }),
                    })
                    .collect();
                serde_json::Value::Array(entries)
            })
            .collect();

        let doc = if json_blocks.len() > 1 {
            json!({ "maps": json_blocks })
        } else {
            json!({ "map": json_blocks.into_iter().next().unwrap_or(json!([])) })
        };
        serde_json::to_string_pretty(&doc).expect("map JSON serialization")
    }
}
