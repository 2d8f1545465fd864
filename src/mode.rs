//! Hardware profiles.
//!
//! Each mode bundles the constraints of one target: color depth and the
//! transform into and out of it, tile geometry, palette geometry, flip
//! support and tile-count caps. The native byte layouts live in
//! [`crate::native`] and [`crate::map`], keyed on the same enum so the
//! compiler tracks unhandled variants.

use std::fmt;
use std::str::FromStr;

use crate::color::{self, Rgba8, TRANSPARENT};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// SNES/Super Famicom backgrounds and sprites.
    Snes,
    /// SNES mode 7: single 256 color palette, linear 8bpp tiles.
    SnesMode7,
    /// Game Boy: four shades of gray.
    Gb,
    /// Game Boy Color.
    Gbc,
    /// Game Boy Advance text backgrounds.
    Gba,
    /// Game Boy Advance affine backgrounds.
    GbaAffine,
    /// Sega Mega Drive / Genesis.
    Md,
    /// PC Engine / TurboGrafx-16 backgrounds.
    Pce,
    /// PC Engine 16x16 sprites.
    PceSprite,
    /// WonderSwan: eight shades of gray.
    Ws,
    /// WonderSwan Color, planar tile format.
    Wsc,
    /// WonderSwan Color, packed pixel tile format.
    WscPacked,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "snes" => Ok(Mode::Snes),
            "snes_mode7" => Ok(Mode::SnesMode7),
            "gb" => Ok(Mode::Gb),
            "gbc" => Ok(Mode::Gbc),
            "gba" => Ok(Mode::Gba),
            "gba_affine" => Ok(Mode::GbaAffine),
            "md" => Ok(Mode::Md),
            "pce" => Ok(Mode::Pce),
            "pce_sprite" => Ok(Mode::PceSprite),
            "ws" => Ok(Mode::Ws),
            "wsc" => Ok(Mode::Wsc),
            "wsc_packed" => Ok(Mode::WscPacked),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Snes => "snes",
            Mode::SnesMode7 => "snes_mode7",
            Mode::Gb => "gb",
            Mode::Gbc => "gbc",
            Mode::Gba => "gba",
            Mode::GbaAffine => "gba_affine",
            Mode::Md => "md",
            Mode::Pce => "pce",
            Mode::PceSprite => "pce_sprite",
            Mode::Ws => "ws",
            Mode::Wsc => "wsc",
            Mode::WscPacked => "wsc_packed",
        };
        f.write_str(s)
    }
}

impl Mode {
    pub fn default_bpp(self) -> u32 {
        match self {
            Mode::Snes | Mode::Gba | Mode::Md | Mode::Pce | Mode::PceSprite => 4,
            Mode::SnesMode7 | Mode::GbaAffine => 8,
            Mode::Gb | Mode::Gbc | Mode::Ws => 2,
            Mode::Wsc | Mode::WscPacked => 4,
        }
    }

    pub fn bpp_allowed(self, bpp: u32) -> bool {
        match self {
            Mode::Snes => matches!(bpp, 2 | 4 | 8),
            Mode::SnesMode7 | Mode::GbaAffine => bpp == 8,
            Mode::Gb | Mode::Gbc => bpp == 2,
            Mode::Gba => matches!(bpp, 4 | 8),
            Mode::Md | Mode::Pce | Mode::PceSprite => bpp == 4,
            Mode::Ws => matches!(bpp, 1 | 2),
            Mode::Wsc | Mode::WscPacked => bpp == 4,
        }
    }

    pub fn default_tile_width(self) -> u32 {
        match self {
            Mode::PceSprite => 16,
            _ => 8,
        }
    }

    pub fn default_tile_height(self) -> u32 {
        match self {
            Mode::PceSprite => 16,
            _ => 8,
        }
    }

    pub fn tile_width_allowed(self, width: u32) -> bool {
        match self {
            Mode::Snes => matches!(width, 8 | 16),
            Mode::PceSprite => width == 16,
            _ => width == 8,
        }
    }

    pub fn tile_height_allowed(self, height: u32) -> bool {
        match self {
            Mode::Snes => matches!(height, 8 | 16),
            Mode::Gb | Mode::Gbc => matches!(height, 8 | 16),
            Mode::PceSprite => height == 16,
            _ => height == 8,
        }
    }

    pub fn default_map_size(self) -> u32 {
        match self {
            Mode::SnesMode7 => 128,
            _ => 32,
        }
    }

    pub fn default_palette_count(self) -> usize {
        match self {
            Mode::Snes | Mode::Gbc => 8,
            Mode::SnesMode7 | Mode::Gb | Mode::GbaAffine => 1,
            Mode::Gba => 16,
            Mode::Md => 4,
            Mode::Pce | Mode::PceSprite => 16,
            Mode::Ws | Mode::Wsc | Mode::WscPacked => 16,
        }
    }

    /// Highest tile count a map entry can address. Zero means unbounded.
    pub fn max_tile_count(self) -> usize {
        match self {
            Mode::Snes | Mode::Gba => 1024,
            Mode::SnesMode7 | Mode::Gb | Mode::GbaAffine => 256,
            Mode::Gbc => 512,
            Mode::Md | Mode::Pce => 2048,
            Mode::PceSprite => 0,
            Mode::Ws | Mode::Wsc | Mode::WscPacked => 1024,
        }
    }

    pub fn tile_flipping_allowed(self) -> bool {
        match self {
            Mode::Snes | Mode::Gbc | Mode::Gba | Mode::Md => true,
            Mode::Ws | Mode::Wsc | Mode::WscPacked => true,
            Mode::SnesMode7 | Mode::Gb | Mode::GbaAffine | Mode::Pce | Mode::PceSprite => false,
        }
    }

    /// Whether every subpalette shares one background color at index 0.
    pub fn col0_is_shared(self) -> bool {
        match self {
            Mode::Snes | Mode::SnesMode7 | Mode::Gba | Mode::GbaAffine => true,
            Mode::Md | Mode::Pce | Mode::PceSprite => true,
            Mode::Gb | Mode::Gbc | Mode::Ws | Mode::Wsc | Mode::WscPacked => false,
        }
    }

    /// Whether index 0 must be transparent because the target is a sprite layer.
    pub fn col0_is_shared_for_sprites(self) -> bool {
        matches!(self, Mode::PceSprite)
    }

    pub fn is_grayscale(self) -> bool {
        matches!(self, Mode::Gb | Mode::Ws)
    }

    /// Fill color for crops extending past the source image.
    pub fn crop_fill(self) -> u32 {
        if self.is_grayscale() {
            0xff00_0000
        } else {
            TRANSPARENT
        }
    }

    /// How many low bits each channel drops in this mode's color space.
    /// Grayscale modes quantize via luminance instead.
    fn channel_shift(self) -> u32 {
        match self {
            Mode::Snes | Mode::SnesMode7 | Mode::Gbc | Mode::Gba | Mode::GbaAffine => 3,
            Mode::Wsc | Mode::WscPacked => 4,
            Mode::Md | Mode::Pce | Mode::PceSprite => 5,
            Mode::Gb | Mode::Ws => 0,
        }
    }

    /// Cells of 8x8 pixels per row when a tileset of larger tiles is laid
    /// out for native emission. One column for the vertical 8x16 layout.
    pub(crate) fn metatile_row_cells(self) -> u32 {
        match self {
            Mode::Snes => 16,
            _ => 1,
        }
    }

    /// Quantize an 8 bit per channel color to this mode's native resolution.
    pub fn reduce(self, rgba: u32) -> u32 {
        match self {
            Mode::Gb => {
                let v = gray_level(rgba);
                let bucket = match v {
                    0x00..=0x3f => 0u8,
                    0x40..=0x7f => 1,
                    0x80..=0xbf => 2,
                    _ => 3,
                };
                color::pack(Rgba8 {
                    r: bucket,
                    g: bucket,
                    b: bucket,
                    a: 0xff,
                })
            }
            Mode::Ws => {
                let v = gray_level(rgba) >> 5;
                color::pack(Rgba8 {
                    r: v,
                    g: v,
                    b: v,
                    a: 0xff,
                })
            }
            _ => {
                let px = color::unpack(rgba);
                if px.a < 0x80 {
                    return TRANSPARENT;
                }
                let shift = self.channel_shift();
                color::pack(Rgba8 {
                    r: px.r >> shift,
                    g: px.g >> shift,
                    b: px.b >> shift,
                    a: 0xff,
                })
            }
        }
    }

    /// Stretch a reduced color back to 8 bits per channel by left bit
    /// replication, so fully saturated channels land on 0xff.
    pub fn normalize(self, reduced: u32) -> u32 {
        match self {
            Mode::Gb => {
                let v = scale_up(color::unpack(reduced).r, 6);
                color::pack(Rgba8 {
                    r: v,
                    g: v,
                    b: v,
                    a: 0xff,
                })
            }
            Mode::Ws => {
                let v = scale_up(color::unpack(reduced).r, 5);
                color::pack(Rgba8 {
                    r: v,
                    g: v,
                    b: v,
                    a: 0xff,
                })
            }
            _ => {
                if reduced == TRANSPARENT {
                    return TRANSPARENT;
                }
                let shift = self.channel_shift();
                let px = color::unpack(reduced);
                color::pack(Rgba8 {
                    r: scale_up(px.r, shift),
                    g: scale_up(px.g, shift),
                    b: scale_up(px.b, shift),
                    a: 0xff,
                })
            }
        }
    }

    pub fn reduce_colors(self, colors: &[u32]) -> Vec<u32> {
        colors.iter().map(|&c| self.reduce(c)).collect()
    }

    pub fn normalize_colors(self, colors: &[u32]) -> Vec<u32> {
        colors.iter().map(|&c| self.normalize(c)).collect()
    }
}

/// Rec.601 luminance of a packed color. Low-alpha pixels count as black so
/// the grayscale targets treat them like the crop fill. Fixed point so a
/// uniform gray maps to exactly its channel value.
fn gray_level(rgba: u32) -> u8 {
    let px = color::unpack(rgba);
    if px.a < 0x80 {
        return 0;
    }
    let luma = (299 * px.r as u32 + 587 * px.g as u32 + 114 * px.b as u32) / 1000;
    luma.min(255) as u8
}

/// Scale a channel up by left bit replication.
pub(crate) fn scale_up(value: u8, shift: u32) -> u8 {
    match shift {
        7 => {
            if value != 0 {
                0xff
            } else {
                0x00
            }
        }
        6 => (value << 6) | ((value << 4) & 0x30) | ((value << 2) & 0x0c) | (value & 0x03),
        5 => (value << 5) | ((value << 2) & 0x1c) | ((value >> 1) & 0x03),
        4 => (value << 4) | (value & 0x0f),
        3 => (value << 3) | ((value >> 2) & 0x07),
        2 => (value << 2) | ((value >> 4) & 0x03),
        1 => (value << 1) | ((value >> 6) & 0x01),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [Mode; 12] = [
        Mode::Snes,
        Mode::SnesMode7,
        Mode::Gb,
        Mode::Gbc,
        Mode::Gba,
        Mode::GbaAffine,
        Mode::Md,
        Mode::Pce,
        Mode::PceSprite,
        Mode::Ws,
        Mode::Wsc,
        Mode::WscPacked,
    ];

    #[test]
    fn mode_names_roundtrip() {
        for mode in ALL_MODES {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!(matches!(
            "amiga".parse::<Mode>(),
            Err(Error::UnknownMode(_))
        ));
    }

    #[test]
    fn default_bpp_is_allowed() {
        for mode in ALL_MODES {
            assert!(mode.bpp_allowed(mode.default_bpp()), "{mode}");
            assert!(mode.tile_width_allowed(mode.default_tile_width()), "{mode}");
            assert!(
                mode.tile_height_allowed(mode.default_tile_height()),
                "{mode}"
            );
        }
    }

    #[test]
    fn low_alpha_reduces_to_transparent_in_color_modes() {
        for mode in ALL_MODES {
            let c = mode.reduce(0x7f12_3456);
            if mode.is_grayscale() {
                assert_eq!(c, 0xff00_0000, "{mode}");
            } else {
                assert_eq!(c, TRANSPARENT, "{mode}");
            }
        }
    }

    #[test]
    fn reduce_is_stable_over_normalize() {
        let samples = [
            0xffff_ffff,
            0xff00_0000,
            0xff12_3456,
            0xfffe_dcba,
            0xff80_8080,
            0x80ff_00ff,
        ];
        for mode in ALL_MODES {
            for &c in &samples {
                let r = mode.reduce(c);
                assert_eq!(mode.reduce(mode.normalize(r)), r, "{mode} {c:08x}");
            }
        }
    }

    #[test]
    fn normalize_keeps_high_bits() {
        for mode in [Mode::Snes, Mode::Wsc, Mode::Md] {
            let shift = match mode {
                Mode::Snes => 3,
                Mode::Wsc => 4,
                _ => 5,
            };
            for v in 0..(256u32 >> shift) {
                let n = scale_up(v as u8, shift);
                assert_eq!((n >> shift) as u32, v, "{mode}");
            }
        }
    }

    #[test]
    fn saturated_channels_normalize_to_ff() {
        assert_eq!(Mode::Snes.normalize(Mode::Snes.reduce(0xffff_ffff)), 0xffff_ffff);
        assert_eq!(Mode::Wsc.normalize(Mode::Wsc.reduce(0xffff_ffff)), 0xffff_ffff);
        assert_eq!(Mode::Pce.normalize(Mode::Pce.reduce(0xffff_ffff)), 0xffff_ffff);
        assert_eq!(Mode::Gb.normalize(Mode::Gb.reduce(0xffff_ffff)), 0xffff_ffff);
        assert_eq!(Mode::Ws.normalize(Mode::Ws.reduce(0xffff_ffff)), 0xffff_ffff);
    }

    #[test]
    fn transparent_roundtrips() {
        assert_eq!(Mode::Snes.reduce(TRANSPARENT), TRANSPARENT);
        assert_eq!(Mode::Snes.normalize(TRANSPARENT), TRANSPARENT);
    }

    #[test]
    fn gb_luma_buckets() {
        let gray = |v: u8| color::pack(Rgba8 { r: v, g: v, b: v, a: 0xff });
        assert_eq!(Mode::Gb.reduce(gray(0x00)) & 0xff, 0);
        assert_eq!(Mode::Gb.reduce(gray(0x3f)) & 0xff, 0);
        assert_eq!(Mode::Gb.reduce(gray(0x40)) & 0xff, 1);
        assert_eq!(Mode::Gb.reduce(gray(0x7f)) & 0xff, 1);
        assert_eq!(Mode::Gb.reduce(gray(0x80)) & 0xff, 2);
        assert_eq!(Mode::Gb.reduce(gray(0xbf)) & 0xff, 2);
        assert_eq!(Mode::Gb.reduce(gray(0xc0)) & 0xff, 3);
        assert_eq!(Mode::Gb.reduce(gray(0xff)) & 0xff, 3);
    }

    #[test]
    fn ws_luma_is_three_bits() {
        let gray = |v: u8| color::pack(Rgba8 { r: v, g: v, b: v, a: 0xff });
        for v in [0u8, 0x1f, 0x20, 0x7f, 0x80, 0xff] {
            assert_eq!(Mode::Ws.reduce(gray(v)) & 0xff, (v >> 5) as u32);
        }
    }
}
