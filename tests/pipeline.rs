//! End-to-end conversions over synthetic images: palette optimization,
//! tileset deduplication and map assembly working together, per mode.

use rgb::RGBA;

use tilecast::color::{self, Rgba8};
use tilecast::{Image, Map, Mode, Palette, Tileset, TRANSPARENT};

fn px(c: u32) -> Rgba8 {
    color::unpack(c)
}

/// Image painted per-pixel from a closure over (x, y).
fn image_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u32) -> Image {
    let pixels: Vec<RGBA<u8>> = (0..width * height)
        .map(|i| px(f(i % width, i / width)))
        .collect();
    Image::new(width, height, pixels).unwrap()
}

const BLACK: u32 = 0xff00_0000;
const RED: u32 = 0xff00_00ff;
const GREEN: u32 = 0xff00_ff00;
const BLUE: u32 = 0xffff_0000;

/// 16x16 quadrants: black, red, green, blue.
fn quadrant_image() -> Image {
    image_from_fn(16, 16, |x, y| match (x < 8, y < 8) {
        (true, true) => BLACK,
        (false, true) => RED,
        (true, false) => GREEN,
        (false, false) => BLUE,
    })
}

fn build_palette(image: &Image, mode: Mode, palettes: usize, colors: usize) -> Palette {
    let mut palette = Palette::new(mode, palettes, colors);
    if mode.col0_is_shared() {
        palette.prime_col0(image.rgba_at(0));
    }
    palette
        .add_images(&image.crops(8, 8, mode))
        .expect("palette fits");
    palette.sort();
    palette
}

#[test]
fn snes_four_color_quadrants() {
    let mode = Mode::Snes;
    let image = quadrant_image();
    let palette = build_palette(&image, mode, 8, 16);

    // one subpalette, color zero first, remainder hue-sorted hot-first
    assert_eq!(palette.len(), 1);
    let hex: Vec<String> = palette.subpalette_at(0)
        .normalized_colors()
        .iter()
        .map(|&c| color::to_hex(c))
        .collect();
    assert_eq!(hex, vec!["#000000", "#0000ff", "#00ff00", "#ff0000"]);

    let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }
    assert!(tileset.len() <= 4);

    let mut map = Map::new(mode, 2, 2, 8, 8);
    for (i, cell) in image.crops(8, 8, mode).iter().enumerate() {
        map.add(cell, &tileset, &palette, 4, i as u32 % 2, i as u32 / 2)
            .unwrap();
    }
    for y in 0..2 {
        for x in 0..2 {
            assert_eq!(map.entry_at(x, y).palette_index, 0);
        }
    }
}

/// 16x8: the right half mirrors the left half horizontally.
fn mirrored_halves() -> Image {
    image_from_fn(16, 8, |x, y| {
        let mx = if x < 8 { x } else { 15 - x };
        if mx < 3 && y < 5 {
            RED
        } else {
            BLACK
        }
    })
}

#[test]
fn flip_dedup_collapses_mirrored_tiles() {
    let mode = Mode::Snes;
    let image = mirrored_halves();
    let palette = build_palette(&image, mode, 8, 16);

    let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }
    assert_eq!(tileset.len(), 1);
    assert_eq!(tileset.discarded(), 1);

    let mut map = Map::new(mode, 2, 1, 8, 8);
    for (i, cell) in image.crops(8, 8, mode).iter().enumerate() {
        map.add(cell, &tileset, &palette, 4, i as u32, 0).unwrap();
    }
    let left = map.entry_at(0, 0);
    let right = map.entry_at(1, 0);
    assert!(!left.flip_h && !left.flip_v);
    assert!(right.flip_h);
    assert!(!right.flip_v);
    assert_eq!(left.tile_index, right.tile_index);
}

#[test]
fn no_flip_keeps_mirrored_tiles_apart() {
    let mode = Mode::Snes;
    let image = mirrored_halves();
    let palette = build_palette(&image, mode, 8, 16);

    let mut tileset = Tileset::new(mode, 4, 8, 8, false, true, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }
    assert_eq!(tileset.len(), 2);
}

#[test]
fn mode7_one_big_palette_and_byte_map_entries() {
    let mode = Mode::SnesMode7;
    // 16x16 cells of 8x8, each a distinct solid color
    let image = image_from_fn(128, 128, |x, y| {
        let cell = (y / 8) * 16 + x / 8;
        0xff00_0000 | ((cell as u32 & 0x1f) << 3) | ((cell as u32 >> 5) << 11)
    });
    let palette = build_palette(&image, mode, 1, 256);
    assert_eq!(palette.len(), 1);
    assert_eq!(palette.subpalette_at(0).len(), 256);

    let mut tileset = Tileset::new(mode, 8, 8, 8, false, true, false, 0);
    let cells = image.crops(8, 8, mode);
    for cell in &cells {
        tileset.add(cell, Some(&palette)).unwrap();
    }
    assert_eq!(tileset.len(), 256);
    // linear 8bpp tiles: 64 bytes each
    assert_eq!(tileset.native_data().len(), 256 * 64);

    let mut map = Map::new(mode, 16, 16, 8, 8);
    for (i, cell) in cells.iter().enumerate() {
        map.add(cell, &tileset, &palette, 8, i as u32 % 16, i as u32 / 16)
            .unwrap();
    }
    // single byte per entry
    assert_eq!(map.native_data(false, 0, 0).len(), 256);

    // interleaved stream: twice the longer of the two
    let interleaved = map.interleaved_data(&tileset);
    assert_eq!(interleaved.len(), 2 * (256 * 64));
}

#[test]
fn gb_grayscale_palette_packs_lightest_first() {
    let mode = Mode::Gb;
    // rows of the four luma buckets
    let shades = [0x00u32, 0x55, 0xaa, 0xff];
    let image = image_from_fn(8, 8, |_, y| {
        let v = shades[(y / 2) as usize];
        0xff00_0000 | (v << 16) | (v << 8) | v
    });

    let palette = build_palette(&image, mode, 1, 4);
    assert_eq!(palette.len(), 1);
    let reduced: Vec<u32> = palette.subpalette_at(0).colors().to_vec();
    for &c in &reduced {
        assert!(c & 0xff <= 3, "reduced shade out of range: {c:08x}");
    }
    // full sort, lightest first, so native inversion yields 0b11100100
    assert_eq!(palette.native_data(), vec![0b1110_0100]);

    let mut tileset = Tileset::new(mode, 2, 8, 8, false, true, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }
    assert_eq!(tileset.len(), 1);
    assert_eq!(tileset.native_data().len(), 16);
}

#[test]
fn palette_overflow_reports_error() {
    let mode = Mode::Snes;
    // every 8x8 cell gets the shared background plus 15 colors disjoint
    // from every other cell's
    let image = image_from_fn(128, 128, |x, y| {
        let cell = (y / 8) * 16 + x / 8;
        let slot = (y % 8) * 8 + x % 8;
        if slot % 16 == 0 {
            return BLACK;
        }
        let u = cell * 15 + slot % 16;
        0xff00_0000 | ((u & 0x1f) << 3) | (((u >> 5) & 0x1f) << 11) | ((u >> 10) << 19)
    });
    let mut palette = Palette::new(mode, 8, 16);
    palette.prime_col0(image.rgba_at(0));
    let err = palette.add_images(&image.crops(8, 8, mode));
    assert!(matches!(err, Err(tilecast::Error::PaletteOverflow { .. })));
}

#[test]
fn overfull_cell_reports_coordinates() {
    let mode = Mode::Snes;
    // 20 distinct colors in the single 8x8 cell
    let image = image_from_fn(8, 8, |x, y| {
        let i = (y * 8 + x) % 20;
        0xff00_0000 | (i << 3) | ((i & 1) << 11)
    });
    let mut palette = Palette::new(mode, 8, 16);
    let err = palette.add_images(&image.crops(8, 8, mode));
    match err {
        Err(tilecast::Error::CellTooColorful { x: 0, y: 0, count, max: 16 }) => {
            assert!(count > 16);
        }
        other => panic!("expected CellTooColorful at 0,0, got {other:?}"),
    }
}

#[test]
fn lenient_map_zeroes_unmatchable_cells() {
    let mode = Mode::Snes;
    let image = quadrant_image();
    let palette = build_palette(&image, mode, 8, 16);

    let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }

    // a cell with a color the palette has never seen
    let alien = image_from_fn(8, 8, |_, _| 0xff12_9957);
    let mut map = Map::new(mode, 1, 1, 8, 8);
    map.add(&alien, &tileset, &palette, 4, 0, 0).unwrap();
    assert_eq!(map.entry_at(0, 0), tilecast::MapEntry::default());
}

/// Re-render each mapped cell through tileset and palette and compare with
/// the reduce/normalize-adjusted source pixels.
#[test]
fn map_roundtrip_reproduces_cells() {
    let mode = Mode::Snes;
    let image = mirrored_halves();
    let palette = build_palette(&image, mode, 8, 16);

    let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
    let cells = image.crops(8, 8, mode);
    for cell in &cells {
        tileset.add(cell, Some(&palette)).unwrap();
    }
    let mut map = Map::new(mode, 2, 1, 8, 8);
    for (i, cell) in cells.iter().enumerate() {
        map.add(cell, &tileset, &palette, 4, i as u32, 0).unwrap();
    }

    for (i, cell) in cells.iter().enumerate() {
        let entry = map.entry_at(i as u32, 0);
        let tile = &tileset.tiles()[entry.tile_index as usize];
        let subpalette = palette.subpalette_at(entry.palette_index as usize);
        let normalized = subpalette.normalized_colors();

        let mut rendered: Vec<u8> = tile.data().to_vec();
        if entry.flip_h || entry.flip_v {
            rendered = flip_buffer(&rendered, 8, entry.flip_h, entry.flip_v);
        }

        for (j, &index) in rendered.iter().enumerate() {
            let reduced = mode.reduce(cell.rgba_at(j));
            let expected = if reduced == TRANSPARENT {
                normalized[0]
            } else {
                mode.normalize(reduced)
            };
            assert_eq!(normalized[index as usize], expected, "cell {i} pixel {j}");
        }
    }
}

fn flip_buffer(data: &[u8], width: usize, h: bool, v: bool) -> Vec<u8> {
    let mut out = data.to_vec();
    if h {
        for row in out.chunks_exact_mut(width) {
            row.reverse();
        }
    }
    if v {
        let rows: Vec<Vec<u8>> = out.chunks_exact(width).rev().map(|r| r.to_vec()).collect();
        out = rows.concat();
    }
    out
}

#[test]
fn identical_runs_are_byte_identical() {
    let mode = Mode::Snes;
    let build = || {
        let image = quadrant_image();
        let palette = build_palette(&image, mode, 8, 16);
        let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
        let cells = image.crops(8, 8, mode);
        for cell in &cells {
            tileset.add(cell, Some(&palette)).unwrap();
        }
        let mut map = Map::new(mode, 2, 2, 8, 8);
        for (i, cell) in cells.iter().enumerate() {
            map.add(cell, &tileset, &palette, 4, i as u32 % 2, i as u32 / 2)
                .unwrap();
        }
        (
            palette.native_data(),
            tileset.native_data(),
            map.native_data(false, 0, 0),
            palette.to_json(),
            map.to_json(false, 0, 0),
        )
    };
    assert_eq!(build(), build());
}

#[test]
fn every_cell_is_covered_by_some_subpalette() {
    let mode = Mode::Gbc;
    // two cells with different two-color sets
    let image = image_from_fn(16, 8, |x, _| match (x < 8, x % 2 == 0) {
        (true, true) => RED,
        (true, false) => BLACK,
        (false, true) => GREEN,
        (false, false) => BLUE,
    });
    let mut palette = Palette::new(mode, 8, 4);
    let cells = image.crops(8, 8, mode);
    palette.add_images(&cells).unwrap();
    palette.sort();

    for cell in &cells {
        assert!(!palette.subpalettes_matching(cell).unwrap().is_empty());
    }
    assert!(palette.len() <= 8);
    for sp in palette.subpalettes() {
        assert!(sp.len() <= 4);
    }
}

#[test]
fn shared_col0_leads_every_subpalette() {
    let mode = Mode::Gba;
    let image = quadrant_image();
    let mut palette = Palette::new(mode, 16, 4);
    palette.prime_col0(0xffff_ffff); // white, not present in the image
    palette.add_images(&image.crops(8, 8, mode)).unwrap();
    palette.sort();

    let white_reduced = mode.reduce(0xffff_ffff);
    for sp in palette.subpalettes() {
        assert_eq!(sp.color_at(0), white_reduced);
    }
}

#[test]
fn tileset_has_no_duplicates_under_any_orientation() {
    let mode = Mode::Snes;
    let image = image_from_fn(32, 32, |x, y| {
        if (x / 3 + y / 5) % 2 == 0 {
            RED
        } else {
            BLACK
        }
    });
    let palette = build_palette(&image, mode, 8, 16);
    let mut tileset = Tileset::new(mode, 4, 8, 8, false, false, false, 0);
    for cell in image.crops(8, 8, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }

    let tiles = tileset.tiles();
    for a in 0..tiles.len() {
        for b in 0..tiles.len() {
            if a != b {
                assert!(!tiles[a].equivalent(&tiles[b]), "tiles {a} and {b} collide");
            }
        }
    }
}

#[test]
fn pce_sprite_tiles_pack_to_sprite_cells() {
    let mode = Mode::PceSprite;
    let image = image_from_fn(16, 16, |x, _| if x < 8 { RED } else { BLACK });
    let mut palette = Palette::new(mode, 16, 16);
    palette.prime_col0(TRANSPARENT);
    palette.add_images(&image.crops(16, 16, mode)).unwrap();

    let mut tileset = Tileset::new(mode, 4, 16, 16, false, true, false, 0);
    for cell in image.crops(16, 16, mode) {
        tileset.add(&cell, Some(&palette)).unwrap();
    }
    assert_eq!(tileset.len(), 1);
    // 16x16 at 4bpp: 128 bytes per sprite
    assert_eq!(tileset.native_data().len(), 128);
}
