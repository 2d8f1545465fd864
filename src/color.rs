//! Packed RGBA colors and ordering helpers.
//!
//! Colors travel through the pipeline as `u32` values in little-endian RGBA
//! byte order (red in the low byte). The `rgb` crate's pixel struct is used
//! at the image boundary; everything set-like operates on the packed form so
//! equality and iteration order are total over the full 32-bit encoding.

use crate::error::Error;

pub type Rgba8 = rgb::RGBA<u8>;

/// All-zero bits: fully transparent black.
pub const TRANSPARENT: u32 = 0x0000_0000;

#[inline]
pub fn pack(px: Rgba8) -> u32 {
    (px.r as u32) | ((px.g as u32) << 8) | ((px.b as u32) << 16) | ((px.a as u32) << 24)
}

#[inline]
pub fn unpack(color: u32) -> Rgba8 {
    Rgba8 {
        r: (color & 0xff) as u8,
        g: ((color >> 8) & 0xff) as u8,
        b: ((color >> 16) & 0xff) as u8,
        a: ((color >> 24) & 0xff) as u8,
    }
}

/// Swap between network order and little endian.
#[inline]
pub fn reverse_bytes(v: u32) -> u32 {
    v.swap_bytes()
}

pub fn palette_size_at_bpp(bpp: u32) -> usize {
    1usize << bpp
}

pub fn bitmask_at_bpp(bpp: u32) -> u8 {
    ((1u32 << bpp) - 1) as u8
}

/// CSS style hex string (`#rrggbb`) for a packed color.
pub fn to_hex(color: u32) -> String {
    format!("#{:06x}", reverse_bytes(color) >> 8)
}

/// CSS style hex string with alpha (`#rrggbbaa`).
pub fn to_hex_alpha(color: u32) -> String {
    format!("#{:08x}", reverse_bytes(color))
}

/// Parse a CSS style hex string into a packed color. Six digits imply an
/// opaque alpha channel; a leading `#` and surrounding quotes are tolerated.
pub fn from_hex(s: &str) -> Result<u32, Error> {
    let mut t: String = s
        .chars()
        .filter(|c| !matches!(c, '#' | '"' | '\''))
        .collect();
    if t.len() == 6 {
        t.push_str("ff");
    }
    if t.len() != 8 {
        return Err(Error::FormatInvalid(format!(
            "color \"{s}\" is not a 6 or 8 character hex string"
        )));
    }
    let v = u32::from_str_radix(&t, 16)
        .map_err(|_| Error::FormatInvalid(format!("failed to interpret color string \"{s}\"")))?;
    Ok(reverse_bytes(v))
}

/// Hue in degrees and value in 0..1 of a packed color.
fn hue_value(px: Rgba8) -> (f64, f64) {
    let r = px.r as f64 / 255.0;
    let g = px.g as f64 / 255.0;
    let b = px.b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut h = if delta > 0.0 {
        if max == r {
            60.0 * (((g - b) / delta) % 6.0)
        } else if max == g {
            60.0 * (((b - r) / delta) + 2.0)
        } else {
            60.0 * (((r - g) / delta) + 4.0)
        }
    } else {
        0.0
    };
    if h < 0.0 {
        h += 360.0;
    }
    (h, max)
}

/// Bucketed (hue, luma, value) ordering key. Eight buckets per component;
/// the luma term is the perceptual square-root weighting.
fn sort_key(color: u32) -> (i32, i32, i32) {
    const SEGMENTS: f64 = 8.0;
    let px = unpack(color);
    let (h, v) = hue_value(px);
    let luma = (0.241 * px.r as f64 + 0.691 * px.g as f64 + 0.068 * px.b as f64).sqrt();
    (
        (SEGMENTS * h) as i32,
        (SEGMENTS * luma) as i32,
        (SEGMENTS * v) as i32,
    )
}

/// Order colors for presentation, brighter and hotter first. Ties fall back
/// to the packed encoding so the order is total and runs are reproducible
/// byte for byte.
pub fn sort_colors(colors: &mut [u32]) {
    colors.sort_by(|a, b| sort_key(*b).cmp(&sort_key(*a)).then(b.cmp(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        for &c in &[0u32, 0xff00_00ff, 0x8040_20ff, 0xffff_ffff, 0x0100_0000] {
            assert_eq!(pack(unpack(c)), c);
        }
    }

    #[test]
    fn hex_parse_six_digits_implies_opaque() {
        assert_eq!(from_hex("#ff0000").unwrap(), 0xff00_00ff);
        assert_eq!(from_hex("00ff00").unwrap(), 0xff00_ff00);
        assert_eq!(from_hex("\"#0000ff\"").unwrap(), 0xffff_0000);
    }

    #[test]
    fn hex_parse_eight_digits_carries_alpha() {
        assert_eq!(from_hex("#11223380").unwrap(), 0x8033_2211);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(from_hex("#12345").is_err());
        assert!(from_hex("not-a-color").is_err());
    }

    #[test]
    fn hex_format_roundtrip() {
        assert_eq!(to_hex(0xff00_00ff), "#ff0000");
        assert_eq!(to_hex_alpha(0x8033_2211), "#11223380");
        let c = from_hex(&to_hex(0xffa0_b0c0)).unwrap();
        assert_eq!(c, 0xffa0_b0c0);
    }

    #[test]
    fn sort_is_deterministic_and_total() {
        let mut a = vec![0xff00_00ff, 0xffff_0000, 0xff00_ff00, 0xff00_00ff];
        let mut b = a.clone();
        b.reverse();
        sort_colors(&mut a);
        sort_colors(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn sort_groups_by_hue_first() {
        // Blue (hue 240) sorts ahead of green (120), which sorts ahead of
        // red (0).
        let mut colors = vec![0xff00_00ff, 0xff00_ff00, 0xffff_0000];
        sort_colors(&mut colors);
        assert_eq!(colors, vec![0xffff_0000, 0xff00_ff00, 0xff00_00ff]);
    }

    #[test]
    fn sort_puts_lighter_grays_first() {
        let gray = |v: u8| pack(Rgba8 { r: v, g: v, b: v, a: 0xff });
        let mut colors = vec![gray(0), gray(3), gray(1), gray(2)];
        sort_colors(&mut colors);
        assert_eq!(colors, vec![gray(3), gray(2), gray(1), gray(0)]);
    }
}
