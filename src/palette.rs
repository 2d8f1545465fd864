//! Palette construction and optimization.
//!
//! A [`Palette`] holds up to a mode-bound number of [`Subpalette`]s, each an
//! ordered list of reduced colors with a set mirror for containment tests.
//! Construction either runs the greedy optimizer over per-cell color sets
//! (`add_images`) or ingests colors verbatim (`add_colors`, native data,
//! JSON).

use std::collections::BTreeSet;

use log::warn;
use serde_json::json;

use crate::color::{self, TRANSPARENT};
use crate::error::Error;
use crate::image::Image;
use crate::mode::Mode;
use crate::native;

#[derive(Debug, Clone)]
pub struct Subpalette {
    mode: Mode,
    max_colors: usize,
    colors: Vec<u32>,
    set: BTreeSet<u32>,
}

impl Subpalette {
    pub fn new(mode: Mode, max_colors: usize) -> Self {
        Self {
            mode,
            max_colors,
            colors: Vec::new(),
            set: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn color_at(&self, index: usize) -> u32 {
        self.colors[index]
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.colors.len() >= self.max_colors
    }

    pub fn capacity_left(&self) -> usize {
        self.max_colors - self.colors.len()
    }

    pub fn contains(&self, color: u32) -> bool {
        self.set.contains(&color)
    }

    /// Position of a reduced color, scanning in palette order.
    pub fn index_of(&self, color: u32) -> Option<usize> {
        self.colors.iter().position(|&c| c == color)
    }

    /// Colors stretched back to 8 bits per channel for display.
    pub fn normalized_colors(&self) -> Vec<u32> {
        self.mode.normalize_colors(&self.colors)
    }

    /// Append a color. Duplicates are dropped unless `allow_duplicates`.
    pub fn add(&mut self, color: u32, allow_duplicates: bool) -> Result<(), Error> {
        if allow_duplicates || !self.set.contains(&color) {
            if self.is_full() {
                return Err(Error::PaletteOverflow {
                    needed: self.colors.len() + 1,
                    available: self.max_colors,
                });
            }
            self.colors.push(color);
        }
        self.set.insert(color);
        Ok(())
    }

    pub fn add_colors(&mut self, colors: &[u32], allow_duplicates: bool) -> Result<(), Error> {
        for &c in colors {
            self.add(c, allow_duplicates)?;
        }
        Ok(())
    }

    /// A copy padded with zero entries up to capacity.
    pub fn padded(&self) -> Subpalette {
        let mut sp = self.clone();
        while sp.colors.len() < sp.max_colors {
            sp.colors.push(TRANSPARENT);
        }
        sp.set.insert(TRANSPARENT);
        sp
    }

    /// Number of colors in `new_colors` missing from this subpalette.
    pub fn diff(&self, new_colors: &BTreeSet<u32>) -> usize {
        new_colors.difference(&self.set).count()
    }

    pub fn matches(&self, colors: &BTreeSet<u32>) -> bool {
        self.diff(colors) == 0
    }

    /// Order colors for presentation, brighter first. With `keep_first` the
    /// color at index 0 (the shared background slot) stays put.
    pub fn sort(&mut self, keep_first: bool) {
        if keep_first {
            if self.colors.len() >= 3 {
                color::sort_colors(&mut self.colors[1..]);
            }
        } else if self.colors.len() >= 2 {
            color::sort_colors(&mut self.colors);
        }
    }

    /// Collapse duplicates of color zero by making color zero transparent.
    fn check_col0_duplicates(&mut self) -> bool {
        if self.colors.len() <= 1 {
            return false;
        }
        if self.colors[1..].contains(&self.colors[0]) {
            self.colors[0] &= 0x00ff_ffff;
            self.set = self.colors.iter().copied().collect();
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct Palette {
    mode: Mode,
    max_subpalettes: usize,
    max_colors_per_subpalette: usize,
    subpalettes: Vec<Subpalette>,
    col0: Option<u32>,
}

impl Palette {
    pub fn new(mode: Mode, max_subpalettes: usize, max_colors_per_subpalette: usize) -> Self {
        Self {
            mode,
            max_subpalettes,
            max_colors_per_subpalette,
            subpalettes: Vec::new(),
            col0: None,
        }
    }

    /// Deserialize from native palette bytes.
    pub fn from_native(
        data: &[u8],
        mode: Mode,
        colors_per_subpalette: usize,
    ) -> Result<Self, Error> {
        let mut palette = Palette::new(mode, mode.default_palette_count(), colors_per_subpalette);
        let colors = native::unpack_colors(data, mode)?;
        palette.add_colors(&colors, false)?;
        palette.check_col0_duplicates();
        Ok(palette)
    }

    /// Deserialize from a JSON document with a `palettes` key holding arrays
    /// of hex color strings per subpalette.
    pub fn from_json_str(
        text: &str,
        mode: Mode,
        colors_per_subpalette: usize,
    ) -> Result<Self, Error> {
        let doc: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::FormatInvalid(format!("palette JSON malformed: {e}")))?;
        let entries = doc
            .get("palettes")
            .and_then(|p| p.as_array())
            .ok_or_else(|| Error::FormatInvalid("no \"palettes\" key in JSON".into()))?;

        let mut palette = Palette::new(mode, 64, colors_per_subpalette);
        for sub in entries {
            let mut colors = Vec::new();
            for item in sub.as_array().into_iter().flatten() {
                if let Some(s) = item.as_str() {
                    colors.push(mode.reduce(color::from_hex(s)?));
                }
            }
            if colors.len() > colors_per_subpalette {
                return Err(Error::FormatInvalid(format!(
                    "palette in JSON doesn't match color depth ({} > {} colors)",
                    colors.len(),
                    colors_per_subpalette
                )));
            }
            let sp = palette.add_subpalette()?;
            sp.add_colors(&colors, false)?;
        }
        if palette.subpalettes.is_empty() {
            return Err(Error::FormatInvalid("no palette data in JSON".into()));
        }
        Ok(palette)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn max_colors_per_subpalette(&self) -> usize {
        self.max_colors_per_subpalette
    }

    pub fn subpalettes(&self) -> &[Subpalette] {
        &self.subpalettes
    }

    pub fn subpalette_at(&self, index: usize) -> &Subpalette {
        &self.subpalettes[index]
    }

    pub fn len(&self) -> usize {
        self.subpalettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subpalettes.is_empty()
    }

    /// Total number of colors across subpalettes.
    pub fn color_count(&self) -> usize {
        self.subpalettes.iter().map(|sp| sp.len()).sum()
    }

    /// Set the color reserved at index 0 of every subpalette built from
    /// here on. A color that reduces to transparent primes transparency.
    pub fn prime_col0(&mut self, color: u32) {
        self.col0 = Some(if self.mode.reduce(color) == TRANSPARENT {
            TRANSPARENT
        } else {
            color
        });
    }

    pub fn col0(&self) -> Option<u32> {
        self.col0
    }

    pub fn col0_is_shared(&self) -> bool {
        self.col0.is_some()
    }

    /// Build optimized subpalettes covering the color set of every cell.
    ///
    /// Cells whose reduced color set cannot fit one subpalette fail early;
    /// overflowing the mode's palette count fails after optimization.
    pub fn add_images(&mut self, cells: &[Image]) -> Result<(), Error> {
        let mut sets: Vec<BTreeSet<u32>> = Vec::with_capacity(cells.len());
        for cell in cells {
            let mut colors = cell.colors();
            if let Some(c0) = self.col0 {
                colors.insert(c0);
            }
            let reduced: BTreeSet<u32> = colors.iter().map(|&c| self.mode.reduce(c)).collect();
            if reduced.len() > self.max_colors_per_subpalette {
                let (x, y) = cell.src_coords();
                return Err(Error::CellTooColorful {
                    x,
                    y,
                    count: reduced.len(),
                    max: self.max_colors_per_subpalette,
                });
            }
            sets.push(reduced);
        }

        let optimized = optimized_palettes(sets, self.max_colors_per_subpalette);
        if optimized.len() > self.subpalettes_free() {
            return Err(Error::PaletteOverflow {
                needed: optimized.len(),
                available: self.subpalettes_free(),
            });
        }

        let col0 = self.col0.map(|c| self.mode.reduce(c));
        for set in optimized {
            let mut colors: Vec<u32> = set.into_iter().collect();
            if let Some(c0) = col0 {
                if let Some(pos) = colors.iter().position(|&c| c == c0) {
                    colors.swap(0, pos);
                }
            }
            let sp = self.add_subpalette()?;
            sp.add_colors(&colors, false)?;
        }
        Ok(())
    }

    /// Append colors verbatim, split into subpalettes of the maximum size.
    /// Used by the no-remap path and by native/JSON ingestion.
    pub fn add_colors(&mut self, colors: &[u32], reduce: bool) -> Result<(), Error> {
        let colors = if reduce {
            self.mode.reduce_colors(colors)
        } else {
            colors.to_vec()
        };
        for chunk in colors.chunks(self.max_colors_per_subpalette) {
            let sp = self.add_subpalette()?;
            sp.add_colors(chunk, true)?;
        }
        Ok(())
    }

    fn add_subpalette(&mut self) -> Result<&mut Subpalette, Error> {
        if self.subpalettes_free() == 0 {
            return Err(Error::PaletteOverflow {
                needed: self.subpalettes.len() + 1,
                available: self.max_subpalettes,
            });
        }
        self.subpalettes
            .push(Subpalette::new(self.mode, self.max_colors_per_subpalette));
        Ok(self.subpalettes.last_mut().expect("just pushed"))
    }

    fn subpalettes_free(&self) -> usize {
        self.max_subpalettes - self.subpalettes.len()
    }

    /// Reduced color set of a cell as used for matching: transparency is
    /// covered by the shared color zero when one exists.
    fn match_set(&self, image: &Image) -> Result<BTreeSet<u32>, Error> {
        let mut set: BTreeSet<u32> = image
            .rgba_data()
            .iter()
            .map(|&c| self.mode.reduce(c))
            .collect();
        if self.mode.col0_is_shared() {
            set.remove(&TRANSPARENT);
        }
        if set.len() > self.max_colors_per_subpalette {
            let (x, y) = image.src_coords();
            return Err(Error::CellTooColorful {
                x,
                y,
                count: set.len(),
                max: self.max_colors_per_subpalette,
            });
        }
        Ok(set)
    }

    /// First subpalette containing every color of the image.
    pub fn subpalette_matching(&self, image: &Image) -> Result<&Subpalette, Error> {
        let set = self.match_set(image)?;
        self.subpalettes
            .iter()
            .find(|sp| sp.matches(&set))
            .ok_or_else(|| {
                let (x, y) = image.src_coords();
                Error::NoMatchingSubpalette { x, y }
            })
    }

    /// Indices of all subpalettes containing every color of the image.
    pub fn subpalettes_matching(&self, image: &Image) -> Result<Vec<usize>, Error> {
        let set = self.match_set(image)?;
        Ok(self
            .subpalettes
            .iter()
            .enumerate()
            .filter(|(_, sp)| sp.matches(&set))
            .map(|(i, _)| i)
            .collect())
    }

    pub fn index_of(&self, subpalette: &Subpalette) -> Option<usize> {
        self.subpalettes
            .iter()
            .position(|sp| sp.colors() == subpalette.colors())
    }

    /// Sort every subpalette for presentation. When a shared color zero is
    /// in play the reserved slot never moves.
    pub fn sort(&mut self) {
        let keep_first = self.col0.is_some() || self.mode.col0_is_shared();
        for sp in &mut self.subpalettes {
            sp.sort(keep_first);
        }
    }

    /// Collapse duplicated color-zero entries to transparent. Relevant when
    /// re-reading native data from modes with a shared background slot.
    pub fn check_col0_duplicates(&mut self) {
        if !self.mode.col0_is_shared() {
            return;
        }
        let mut fixed = false;
        for sp in &mut self.subpalettes {
            fixed |= sp.check_col0_duplicates();
        }
        if fixed {
            warn!("palette contains duplicates of color zero, treating color zero as transparent");
        }
    }

    pub fn colors(&self) -> Vec<Vec<u32>> {
        self.subpalettes
            .iter()
            .map(|sp| sp.colors().to_vec())
            .collect()
    }

    pub fn normalized_colors(&self) -> Vec<Vec<u32>> {
        self.subpalettes
            .iter()
            .map(|sp| sp.normalized_colors())
            .collect()
    }

    /// Native palette bytes: each subpalette padded to capacity, packed in
    /// the mode's color format.
    pub fn native_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for sp in &self.subpalettes {
            data.extend(native::pack_colors(sp.padded().colors(), self.mode));
        }
        data
    }

    /// Photoshop ACT palette: 768 bytes of RGB, then a four byte trailer
    /// carrying the color count.
    pub fn act_data(&self) -> Vec<u8> {
        let mut data = vec![0u8; 256 * 3 + 4];
        let mut count = 0usize;

        'fill: for sp in &self.subpalettes {
            for &c in sp.padded().normalized_colors().iter() {
                let px = color::unpack(c);
                data[count * 3] = px.r;
                data[count * 3 + 1] = px.g;
                data[count * 3 + 2] = px.b;
                count += 1;
                if count >= 256 {
                    break 'fill;
                }
            }
        }

        data[0x300] = 0x00;
        data[0x301] = (count & 0xff) as u8;
        data[0x302] = 0xff;
        data[0x303] = 0xff;
        data
    }

    /// JSON document with display colors and native channel triples.
    pub fn to_json(&self) -> String {
        let hex: Vec<Vec<String>> = self
            .normalized_colors()
            .iter()
            .map(|row| row.iter().map(|&c| color::to_hex(c)).collect())
            .collect();
        let native_rgb: Vec<Vec<[u8; 3]>> = self
            .colors()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&c| {
                        let px = color::unpack(c);
                        [px.r, px.g, px.b]
                    })
                    .collect()
            })
            .collect();
        let doc = json!({
            "palettes": hex,
            "palettes_native_rgb": native_rgb,
        });
        serde_json::to_string_pretty(&doc).expect("palette JSON serialization")
    }

    /// Short human description, e.g. `24 colors [16,8]`.
    pub fn description(&self) -> String {
        let sizes: Vec<String> = self
            .subpalettes
            .iter()
            .map(|sp| sp.len().to_string())
            .collect();
        let total = self.color_count();
        match sizes.len() {
            0 => "zero colors".into(),
            1 => format!("{total} colors"),
            _ => format!("{total} colors [{}]", sizes.join(",")),
        }
    }
}

/// Greedy superset-merge optimizer.
///
/// Deduplicate the input sets, drop proper subsets, then repeatedly take the
/// largest remaining set and merge it into the last output bin it fits in
/// (union size within `max_colors`), appending a new bin otherwise. Cheap,
/// and effective because neighboring cells share most of their colors.
fn optimized_palettes(sets: Vec<BTreeSet<u32>>, max_colors: usize) -> Vec<BTreeSet<u32>> {
    let mut unique: Vec<BTreeSet<u32>> = Vec::new();
    for set in sets {
        if !set.is_empty() && !unique.contains(&set) {
            unique.push(set);
        }
    }

    let mut work: Vec<BTreeSet<u32>> = unique
        .iter()
        .filter(|s| !unique.iter().any(|t| t.len() > s.len() && s.is_subset(t)))
        .cloned()
        .collect();
    work.sort_by_key(|s| s.len());

    let mut opt: Vec<BTreeSet<u32>> = Vec::new();
    while let Some(set) = work.pop() {
        let mut best = None;
        for (i, bin) in opt.iter().enumerate() {
            if set.difference(bin).count() + bin.len() <= max_colors {
                best = Some(i);
            }
        }
        match best {
            Some(i) => opt[i].extend(set),
            None => opt.push(set),
        }
    }

    opt.sort_by(|a, b| b.len().cmp(&a.len()));
    opt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(colors: &[u32]) -> BTreeSet<u32> {
        colors.iter().copied().collect()
    }

    #[test]
    fn optimizer_merges_subsets_into_supersets() {
        let sets = vec![
            set(&[1, 2]),
            set(&[1, 2, 3, 4]),
            set(&[5, 6]),
            set(&[1, 2]),
        ];
        let opt = optimized_palettes(sets, 4);
        assert_eq!(opt.len(), 2);
        assert_eq!(opt[0], set(&[1, 2, 3, 4]));
        assert_eq!(opt[1], set(&[5, 6]));
    }

    #[test]
    fn optimizer_merges_overlapping_sets_when_they_fit() {
        let sets = vec![set(&[1, 2, 3]), set(&[3, 4])];
        let opt = optimized_palettes(sets, 4);
        assert_eq!(opt, vec![set(&[1, 2, 3, 4])]);
    }

    #[test]
    fn optimizer_splits_when_union_exceeds_capacity() {
        let sets = vec![set(&[1, 2, 3]), set(&[4, 5, 6])];
        let opt = optimized_palettes(sets, 4);
        assert_eq!(opt.len(), 2);
    }

    #[test]
    fn optimizer_orders_bins_largest_first() {
        let sets = vec![set(&[1]), set(&[10, 11, 12, 13, 14]), set(&[20, 21])];
        let opt = optimized_palettes(sets, 8);
        for pair in opt.windows(2) {
            assert!(pair[0].len() >= pair[1].len());
        }
    }

    #[test]
    fn subpalette_rejects_overflow() {
        let mut sp = Subpalette::new(Mode::Snes, 2);
        sp.add(1, false).unwrap();
        sp.add(1, false).unwrap(); // duplicate, dropped
        sp.add(2, false).unwrap();
        assert!(sp.add(3, false).is_err());
        assert_eq!(sp.len(), 2);
    }

    #[test]
    fn subpalette_sort_keeps_index_zero() {
        let mut sp = Subpalette::new(Mode::Snes, 16);
        let reduced: Vec<u32> = [0xffff_ffffu32, 0xff00_00ff, 0xff00_ff00, 0xffff_0000]
            .iter()
            .map(|&c| Mode::Snes.reduce(c))
            .collect();
        sp.add_colors(&reduced, false).unwrap();
        sp.sort(true);
        assert_eq!(sp.color_at(0), reduced[0]);
        let rest: BTreeSet<u32> = sp.colors()[1..].iter().copied().collect();
        assert_eq!(rest, reduced[1..].iter().copied().collect());
    }

    #[test]
    fn col0_duplicates_collapse_to_transparent() {
        let mut sp = Subpalette::new(Mode::Snes, 4);
        sp.add_colors(&[0xff00_0000, 0xff00_0000, 0xff00_001f], true)
            .unwrap();
        assert!(sp.check_col0_duplicates());
        assert_eq!(sp.color_at(0), 0x0000_0000);
    }

    #[test]
    fn prime_col0_of_transparent_reducing_color_is_transparent() {
        let mut palette = Palette::new(Mode::Snes, 8, 16);
        palette.prime_col0(0x1000_00ff);
        assert_eq!(palette.col0(), Some(TRANSPARENT));
        palette.prime_col0(0xffff_ffff);
        assert_eq!(palette.col0(), Some(0xffff_ffff));
    }

    #[test]
    fn json_roundtrip_keeps_subpalette_shape() {
        let mut palette = Palette::new(Mode::Snes, 8, 4);
        palette
            .add_colors(&[0xffff_ffff, 0xff00_00ff, 0xff00_ff00, 0xffff_0000], true)
            .unwrap();
        let text = palette.to_json();
        let back = Palette::from_json_str(&text, Mode::Snes, 4).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(
            back.subpalette_at(0).colors(),
            palette.subpalette_at(0).colors()
        );
    }

    #[test]
    fn json_without_palettes_key_is_rejected() {
        assert!(matches!(
            Palette::from_json_str("{\"maps\":[]}", Mode::Snes, 16),
            Err(Error::FormatInvalid(_))
        ));
    }

    #[test]
    fn native_roundtrip_with_padding() {
        let mut palette = Palette::new(Mode::Snes, 8, 4);
        palette
            .add_colors(&[0xffff_ffff, 0xff00_00ff], true)
            .unwrap();
        let data = palette.native_data();
        assert_eq!(data.len(), 4 * 2);
        let back = Palette::from_native(&data, Mode::Snes, 4).unwrap();
        let reduced_white = Mode::Snes.reduce(0xffff_ffff);
        assert_eq!(back.subpalette_at(0).color_at(0), reduced_white);
    }

    #[test]
    fn act_layout() {
        let mut palette = Palette::new(Mode::Snes, 8, 4);
        palette.add_colors(&[0xffff_ffff], true).unwrap();
        let act = palette.act_data();
        assert_eq!(act.len(), 772);
        assert_eq!(&act[0..3], &[0xff, 0xff, 0xff]);
        assert_eq!(act[0x301], 4); // one padded subpalette
        assert_eq!(&act[0x302..], &[0xff, 0xff]);
    }
}
