//! Serialization surfaces: JSON palette documents, ACT files, and native
//! palette ingestion including the duplicate color-zero collapse.

use tilecast::color;
use tilecast::{Mode, Palette};

#[test]
fn palette_json_document_shape() {
    let mut palette = Palette::new(Mode::Snes, 8, 4);
    palette
        .add_colors(&[0xffff_ffff, 0xff00_00ff, 0xff00_ff00, 0xffff_0000], true)
        .unwrap();

    let doc: serde_json::Value = serde_json::from_str(&palette.to_json()).unwrap();
    let palettes = doc["palettes"].as_array().unwrap();
    assert_eq!(palettes.len(), 1);
    assert_eq!(palettes[0][0], "#ffffff");

    let native = doc["palettes_native_rgb"].as_array().unwrap();
    assert_eq!(native[0][0], serde_json::json!([31, 31, 31]));
}

#[test]
fn json_and_native_ingestion_agree() {
    let mut palette = Palette::new(Mode::Gbc, 8, 4);
    palette
        .add_colors(&[0xff10_2030, 0xff40_5060, 0xff70_8090, 0xffa0_b0c0], true)
        .unwrap();

    let from_json = Palette::from_json_str(&palette.to_json(), Mode::Gbc, 4).unwrap();
    let from_native = Palette::from_native(&palette.native_data(), Mode::Gbc, 4).unwrap();
    assert_eq!(from_json.colors(), from_native.colors());
    assert_eq!(from_json.colors(), palette.colors());
}

#[test]
fn native_ingestion_collapses_duplicate_color_zero() {
    // color zero duplicated at slot 2 of a shared-background mode
    let dup = Mode::Snes.reduce(0xff33_6699);
    let other = Mode::Snes.reduce(0xffff_0000);
    let mut palette = Palette::new(Mode::Snes, 8, 4);
    palette.add_colors(&[dup, other, dup, other], false).unwrap();

    let back = Palette::from_native(&palette.native_data(), Mode::Snes, 4).unwrap();
    let colors = back.subpalette_at(0).colors();
    assert_eq!(colors[0], dup & 0x00ff_ffff);
    assert_eq!(colors[2], dup);
}

#[test]
fn act_file_counts_all_subpalettes() {
    let mut palette = Palette::new(Mode::Snes, 8, 16);
    let reduced: Vec<u32> = (0..24u32)
        .map(|i| Mode::Snes.reduce(0xff00_0000 | (i << 3)))
        .collect();
    palette.add_colors(&reduced, false).unwrap();

    let act = palette.act_data();
    assert_eq!(act.len(), 772);
    // two subpalettes padded to 16 entries each
    assert_eq!(act[0x301], 32);
    // first entry is the normalized first color
    let first = color::unpack(Mode::Snes.normalize(reduced[0]));
    assert_eq!(&act[0..3], &[first.r, first.g, first.b]);
}

#[test]
fn gb_native_palette_is_one_packed_byte_per_subpalette() {
    let shades: Vec<u32> = (0..4u32).rev().map(|v| 0xff00_0000 | (v * 0x55_5555)).collect();
    let mut palette = Palette::new(Mode::Gb, 1, 4);
    palette.add_colors(&shades, true).unwrap();

    let data = palette.native_data();
    assert_eq!(data.len(), 1);

    let back = Palette::from_native(&data, Mode::Gb, 4).unwrap();
    assert_eq!(back.subpalette_at(0).len(), 4);
}

#[test]
fn ws_native_palette_packs_four_shades_per_word() {
    let shades: Vec<u32> = [7u32, 5, 2, 0]
        .iter()
        .map(|&v| 0xff00_0000 | (v * 0x0101_01))
        .collect();
    let mut palette = Palette::new(Mode::Ws, 1, 4);
    palette.add_colors(&shades, false).unwrap();
    assert_eq!(palette.native_data().len(), 2);
}
