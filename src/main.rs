//! Command line front end: `palette`, `tiles` and `map` subcommands plus a
//! shorthand mode that produces all three artifacts in one pass.

mod pngio;

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use tilecast::color::{self, palette_size_at_bpp, TRANSPARENT};
use tilecast::{Image, Map, Mode, Palette, Tileset};

#[derive(Parser)]
#[command(
    name = "tilecast",
    version,
    about = "Convert images to retro hardware palette, tile and map data",
    subcommand_negates_reqs = true,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    shorthand: ShorthandArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Create palette data from an image
    Palette(PaletteArgs),
    /// Create tile data from an image or native data
    Tiles(TilesArgs),
    /// Create map data from an image, palette and tileset
    Map(MapArgs),
}

#[derive(Args)]
struct ShorthandArgs {
    /// Input: image
    #[arg(short = 'i', long)]
    in_image: Option<PathBuf>,
    /// Output: palette data
    #[arg(short = 'p', long)]
    out_palette: Option<PathBuf>,
    /// Output: tile data
    #[arg(short = 't', long)]
    out_tiles: Option<PathBuf>,
    /// Output: map data
    #[arg(short = 'm', long)]
    out_map: Option<PathBuf>,
    /// Output: palette image
    #[arg(long)]
    out_palette_image: Option<PathBuf>,
    /// Output: act palette
    #[arg(long)]
    out_palette_act: Option<PathBuf>,
    /// Output: tileset image
    #[arg(long)]
    out_tiles_image: Option<PathBuf>,

    #[command(flatten)]
    settings: CommonSettings,

    /// Map width in tiles (default: inferred)
    #[arg(long)]
    map_width: Option<u32>,
    /// Map height in tiles (default: inferred)
    #[arg(long)]
    map_height: Option<u32>,
    /// Don't discard redundant tiles
    #[arg(long)]
    no_discard: bool,
    /// Don't discard using tile flipping
    #[arg(long)]
    no_flip: bool,
}

#[derive(Args)]
struct CommonSettings {
    /// Mode
    #[arg(short = 'M', long, default_value = "snes")]
    mode: String,
    /// Bits per pixel
    #[arg(short = 'B', long)]
    bpp: Option<u32>,
    /// Tile width
    #[arg(short = 'W', long)]
    tile_width: Option<u32>,
    /// Tile height
    #[arg(short = 'H', long)]
    tile_height: Option<u32>,
    /// Set color #0 (default: color at 0,0 for shared-color modes)
    #[arg(short = '0', long)]
    color_zero: Option<String>,
    /// Apply sprite output settings (transparent color #0)
    #[arg(short = 'S', long)]
    sprite_mode: bool,
}

#[derive(Args)]
struct PaletteArgs {
    /// Input: image
    #[arg(short = 'i', long, required = true)]
    in_image: PathBuf,
    /// Output: native data
    #[arg(short = 'd', long)]
    out_data: Option<PathBuf>,
    /// Output: act palette
    #[arg(short = 'a', long)]
    out_act: Option<PathBuf>,
    /// Output: json
    #[arg(short = 'j', long)]
    out_json: Option<PathBuf>,
    /// Output: image
    #[arg(short = 'o', long)]
    out_image: Option<PathBuf>,

    #[command(flatten)]
    settings: CommonSettings,

    /// Number of subpalettes
    #[arg(short = 'P', long)]
    palettes: Option<usize>,
    /// Colors per subpalette
    #[arg(short = 'C', long)]
    colors: Option<usize>,
    /// Don't remap colors (use the image palette verbatim)
    #[arg(short = 'R', long)]
    no_remap: bool,
}

#[derive(Args)]
struct TilesArgs {
    /// Input: image
    #[arg(short = 'i', long)]
    in_image: Option<PathBuf>,
    /// Input: native tile data
    #[arg(short = 'n', long)]
    in_data: Option<PathBuf>,
    /// Input: palette (json/native)
    #[arg(short = 'p', long)]
    in_palette: Option<PathBuf>,
    /// Output: native data
    #[arg(short = 'd', long)]
    out_data: Option<PathBuf>,
    /// Output: image
    #[arg(short = 'o', long)]
    out_image: Option<PathBuf>,

    #[command(flatten)]
    settings: CommonSettings,

    /// Don't discard redundant tiles
    #[arg(short = 'D', long)]
    no_discard: bool,
    /// Don't discard using tile flipping
    #[arg(short = 'F', long)]
    no_flip: bool,
    /// Don't remap colors (requires an indexed color image)
    #[arg(short = 'R', long)]
    no_remap: bool,
    /// Maximum number of tiles
    #[arg(short = 'T', long)]
    max_tiles: Option<usize>,
}

#[derive(Args)]
struct MapArgs {
    /// Input: image
    #[arg(short = 'i', long, required = true)]
    in_image: PathBuf,
    /// Input: palette (json/native)
    #[arg(short = 'p', long, required = true)]
    in_palette: PathBuf,
    /// Input: tiles (native)
    #[arg(short = 't', long, required = true)]
    in_tiles: PathBuf,
    /// Output: native data
    #[arg(short = 'd', long)]
    out_data: Option<PathBuf>,
    /// Output: json
    #[arg(short = 'j', long)]
    out_json: Option<PathBuf>,
    /// Output: interleaved map/tile data
    #[arg(short = '7', long)]
    out_m7_data: Option<PathBuf>,
    /// Output: banked map data (even bytes, then odd bytes)
    #[arg(long)]
    out_gbc_bank: Option<PathBuf>,

    #[command(flatten)]
    settings: CommonSettings,

    /// Don't use flipped tiles
    #[arg(short = 'F', long)]
    no_flip: bool,
    /// Map width in tiles (default: inferred)
    #[arg(long)]
    map_width: Option<u32>,
    /// Map height in tiles (default: inferred)
    #[arg(long)]
    map_height: Option<u32>,
    /// Split output into blocks of <tiles> width
    #[arg(long)]
    split_width: Option<u32>,
    /// Split output into blocks of <tiles> height
    #[arg(long)]
    split_height: Option<u32>,
    /// Output data in column-major order
    #[arg(long)]
    column_order: bool,
    /// Added to each tile index (clamped at zero)
    #[arg(long)]
    tile_base_offset: Option<i32>,
    /// Added to each palette index (clamped at zero)
    #[arg(long)]
    palette_base_offset: Option<i32>,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .format_timestamp(None)
    .init();

    let result = match cli.command {
        Some(Command::Palette(args)) => run_palette(args),
        Some(Command::Tiles(args)) => run_tiles(args),
        Some(Command::Map(args)) => run_map(args),
        None => run_shorthand(cli.shorthand),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Geometry and mode settings resolved against what the mode allows.
struct Resolved {
    mode: Mode,
    bpp: u32,
    tile_w: u32,
    tile_h: u32,
}

fn resolve_settings(settings: &CommonSettings) -> Result<Resolved> {
    let mode: Mode = settings.mode.parse::<Mode>()?;

    let mut bpp = settings.bpp.unwrap_or_else(|| mode.default_bpp());
    if !mode.bpp_allowed(bpp) {
        if matches!(mode, Mode::SnesMode7 | Mode::GbaAffine) {
            info!("{bpp} bpp not available for {mode}: defaulting to 8");
            bpp = mode.default_bpp();
        } else {
            bail!(tilecast::Error::BppNotAllowed { bpp, mode });
        }
    }

    let mut tile_w = settings.tile_width.unwrap_or_else(|| mode.default_tile_width());
    if !mode.tile_width_allowed(tile_w) {
        tile_w = mode.default_tile_width();
        info!("tile width not allowed for {mode}, using default ({tile_w})");
    }
    let mut tile_h = settings.tile_height.unwrap_or_else(|| mode.default_tile_height());
    if !mode.tile_height_allowed(tile_h) {
        tile_h = mode.default_tile_height();
        info!("tile height not allowed for {mode}, using default ({tile_h})");
    }

    Ok(Resolved { mode, bpp, tile_w, tile_h })
}

/// Color primed at subpalette index 0, if the settings or the mode call for
/// one: an explicit color, transparent for sprite output, or the source
/// image's top-left pixel for shared-background modes.
fn resolve_color_zero(
    settings: &CommonSettings,
    mode: Mode,
    image: &Image,
) -> Result<Option<u32>> {
    if let Some(hex) = &settings.color_zero {
        return Ok(Some(color::from_hex(hex)?));
    }
    if settings.sprite_mode || mode.col0_is_shared_for_sprites() {
        return Ok(Some(TRANSPARENT));
    }
    if mode.col0_is_shared() {
        let c = image.crop(0, 0, 1, 1, mode).rgba_at(0);
        return Ok(Some(c));
    }
    Ok(None)
}

fn check_sprite_dimensions(mode: Mode, image: &Image, tile_w: u32, tile_h: u32) -> Result<()> {
    if mode.col0_is_shared_for_sprites()
        && (image.width() % tile_w != 0 || image.height() % tile_h != 0)
    {
        bail!(tilecast::Error::DimensionInvalid(format!(
            "{mode} requires image dimensions to be multiples of {tile_w}x{tile_h}"
        )));
    }
    Ok(())
}

fn load_image(path: &Path) -> Result<Image> {
    let image = pngio::load(path)?;
    info!(
        "loaded image from \"{}\" ({}x{}px, {})",
        path.display(),
        image.width(),
        image.height(),
        if image.has_indexed_data() {
            "indexed color"
        } else {
            "rgb color"
        }
    );
    Ok(image)
}

/// Load a palette from JSON (a `palettes` array of hex strings) or from raw
/// native palette bytes.
fn load_palette(path: &Path, mode: Mode, colors_per_subpalette: usize) -> Result<Palette> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("file \"{}\" could not be opened", path.display()))?;
    let palette = match std::str::from_utf8(&bytes) {
        Ok(text) if serde_json::from_str::<serde_json::Value>(text).is_ok() => {
            Palette::from_json_str(text, mode, colors_per_subpalette)?
        }
        _ => Palette::from_native(&bytes, mode, colors_per_subpalette)?,
    };
    info!(
        "loaded palette from \"{}\" ({})",
        path.display(),
        palette.description()
    );
    Ok(palette)
}

fn write_file(path: &Path, data: &[u8], what: &str) -> Result<()> {
    std::fs::write(path, data)
        .with_context(|| format!("could not write \"{}\"", path.display()))?;
    info!("saved {what} to \"{}\"", path.display());
    Ok(())
}

fn run_palette(args: PaletteArgs) -> Result<()> {
    let Resolved { mode, bpp, tile_w, tile_h } = resolve_settings(&args.settings)?;

    let colors = args.colors.unwrap_or_else(|| palette_size_at_bpp(bpp));
    let mut palettes = args.palettes.unwrap_or_else(|| mode.default_palette_count());
    if mode.default_palette_count() == 1 && palettes > 1 {
        palettes = 1;
        info!("multiple palettes not available for {mode}: defaulting to 1");
    }

    let image = load_image(&args.in_image)?;

    let mut palette;
    if args.no_remap {
        ensure!(
            image.has_indexed_data(),
            "--no-remap requires an indexed color image"
        );
        info!("mapping palette straight from indexed color image");
        palette = Palette::new(mode, 1, image.palette().len());
        palette.add_colors(image.palette(), true)?;
    } else {
        info!(
            "mapping optimized palette ({palettes}x{colors} color palettes, {tile_w}x{tile_h} tiles)"
        );
        palette = Palette::new(mode, palettes, colors);
        if let Some(c0) = resolve_color_zero(&args.settings, mode, &image)? {
            info!("setting color zero to {}", color::to_hex(c0));
            palette.prime_col0(c0);
        }
        let cells = image.crops(tile_w, tile_h, mode);
        palette.add_images(&cells)?;
        palette.sort();
    }
    info!("generated palette with {}", palette.description());

    if let Some(path) = &args.out_data {
        write_file(path, &palette.native_data(), "native palette data")?;
    }
    if let Some(path) = &args.out_act {
        write_file(path, &palette.act_data(), "act palette")?;
    }
    if let Some(path) = &args.out_json {
        write_file(path, palette.to_json().as_bytes(), "json palette data")?;
    }
    if let Some(path) = &args.out_image {
        pngio::save_rgba(path, &Image::from_palette(&palette)?)?;
        info!("saved palette image to \"{}\"", path.display());
    }
    Ok(())
}

fn run_tiles(args: TilesArgs) -> Result<()> {
    let Resolved { mode, bpp, tile_w, tile_h } = resolve_settings(&args.settings)?;

    let mut no_flip = args.no_flip;
    if !mode.tile_flipping_allowed() && !no_flip {
        no_flip = true;
        info!("tile flipping not available for {mode}: converting with no-flip enabled");
    }

    let from_native = args.in_data.is_some();
    let tileset = if let Some(in_data) = &args.in_data {
        let data = std::fs::read(in_data)
            .with_context(|| format!("file \"{}\" could not be opened", in_data.display()))?;
        let tileset = Tileset::from_native(&data, mode, bpp, tile_w, tile_h, no_flip)?;
        info!(
            "loaded tiles from \"{}\" ({} tiles)",
            in_data.display(),
            tileset.len()
        );
        tileset
    } else {
        let in_image = args
            .in_image
            .as_ref()
            .context("input image or native data required")?;
        let image = load_image(in_image)?;
        check_sprite_dimensions(mode, &image, tile_w, tile_h)?;

        let cells = image.crops(tile_w, tile_h, mode);
        info!("image sliced into {} {tile_w}x{tile_h} tiles", cells.len());

        let mut tileset = Tileset::new(
            mode,
            bpp,
            tile_w,
            tile_h,
            args.no_discard,
            no_flip,
            args.no_remap,
            args.max_tiles.unwrap_or(0),
        );

        let palette = if args.no_remap {
            ensure!(
                image.has_indexed_data(),
                "--no-remap requires an indexed color image"
            );
            info!("creating tile data straight from color indices");
            None
        } else {
            let in_palette = args
                .in_palette
                .as_ref()
                .context("input palette required (except in --no-remap mode)")?;
            Some(load_palette(in_palette, mode, palette_size_at_bpp(bpp))?)
        };

        for cell in &cells {
            tileset.add(cell, palette.as_ref())?;
        }
        if args.no_discard {
            info!("created tileset with {} tiles", tileset.len());
        } else {
            info!(
                "created optimized tileset with {} tiles (discarded {} redundant tiles)",
                tileset.len(),
                tileset.discarded()
            );
        }
        tileset
    };

    if let Some(path) = &args.out_data {
        write_file(path, &tileset.native_data(), "native tile data")?;
    }
    if let Some(path) = &args.out_image {
        let sheet = Image::from_tileset(&tileset, 128)?;
        if from_native {
            pngio::save_indexed(path, &sheet)?;
        } else {
            pngio::save_rgba(path, &sheet)?;
        }
        info!("saved tileset image to \"{}\"", path.display());
    }
    Ok(())
}

fn run_map(args: MapArgs) -> Result<()> {
    let Resolved { mode, bpp, tile_w, tile_h } = resolve_settings(&args.settings)?;

    let split_w = args.split_width.unwrap_or_else(|| mode.default_map_size());
    let split_h = args.split_height.unwrap_or_else(|| mode.default_map_size());

    let mut image = load_image(&args.in_image)?;
    check_sprite_dimensions(mode, &image, tile_w, tile_h)?;

    let map_w = args.map_width.unwrap_or_else(|| image.width().div_ceil(tile_w));
    let map_h = args.map_height.unwrap_or_else(|| image.height().div_ceil(tile_h));
    if map_w * tile_w != image.width() || map_h * tile_h != image.height() {
        image = image.crop(0, 0, map_w * tile_w, map_h * tile_h, mode);
    }

    let palette = load_palette(&args.in_palette, mode, palette_size_at_bpp(bpp))?;

    let tile_data = std::fs::read(&args.in_tiles)
        .with_context(|| format!("file \"{}\" could not be opened", args.in_tiles.display()))?;
    let tileset = Tileset::from_native(&tile_data, mode, bpp, tile_w, tile_h, args.no_flip)?;
    info!(
        "loaded tiles from \"{}\" ({} tiles)",
        args.in_tiles.display(),
        tileset.len()
    );

    let cells = image.crops(tile_w, tile_h, mode);
    info!("mapping {} {tile_w}x{tile_h} image slices", cells.len());

    let mut map = Map::new(mode, map_w, map_h, tile_w, tile_h);
    for (i, cell) in cells.iter().enumerate() {
        map.add(
            cell,
            &tileset,
            &palette,
            bpp,
            i as u32 % map_w,
            i as u32 / map_w,
        )?;
    }
    map.set_tile_base_offset(args.tile_base_offset.unwrap_or(0));
    map.set_palette_base_offset(args.palette_base_offset.unwrap_or(0));

    if args.column_order {
        info!("using column-major order for output");
    }

    if let Some(path) = &args.out_data {
        write_file(
            path,
            &map.native_data(args.column_order, split_w, split_h),
            "native map data",
        )?;
    }
    if let Some(path) = &args.out_json {
        write_file(
            path,
            map.to_json(args.column_order, split_w, split_h).as_bytes(),
            "json map data",
        )?;
    }
    if let Some(path) = &args.out_m7_data {
        write_file(path, &map.interleaved_data(&tileset), "interleaved data")?;
    }
    if let Some(path) = &args.out_gbc_bank {
        write_file(path, &map.banked_data()?, "banked map data")?;
    }
    Ok(())
}

fn run_shorthand(args: ShorthandArgs) -> Result<()> {
    let in_image = args.in_image.as_ref().context("input image required")?;
    let Resolved { mode, bpp, tile_w, tile_h } = resolve_settings(&args.settings)?;

    let mut no_flip = args.no_flip;
    if !mode.tile_flipping_allowed() && !no_flip {
        no_flip = true;
        info!("tile flipping not available for {mode}: converting with no-flip enabled");
    }

    let mut image = load_image(in_image)?;
    check_sprite_dimensions(mode, &image, tile_w, tile_h)?;

    // palette
    let palette_count = mode.default_palette_count();
    let colors = palette_size_at_bpp(bpp);
    info!(
        "mapping optimized palette ({palette_count}x{colors} color palettes, {tile_w}x{tile_h} tiles)"
    );
    let mut palette = Palette::new(mode, palette_count, colors);
    if let Some(c0) = resolve_color_zero(&args.settings, mode, &image)? {
        info!("setting color zero to {}", color::to_hex(c0));
        palette.prime_col0(c0);
    }
    let cells = image.crops(tile_w, tile_h, mode);
    palette.add_images(&cells)?;
    palette.sort();
    info!("generated palette with {}", palette.description());

    // tileset
    let mut tileset = Tileset::new(mode, bpp, tile_w, tile_h, args.no_discard, no_flip, false, 0);
    for cell in &cells {
        tileset.add(cell, Some(&palette))?;
    }
    if args.no_discard {
        info!("created tileset with {} tiles", tileset.len());
    } else {
        info!(
            "created optimized tileset with {} tiles (discarded {} redundant tiles)",
            tileset.len(),
            tileset.discarded()
        );
    }

    // map
    let map_w = args.map_width.unwrap_or_else(|| image.width().div_ceil(tile_w));
    let map_h = args.map_height.unwrap_or_else(|| image.height().div_ceil(tile_h));
    if map_w * tile_w != image.width() || map_h * tile_h != image.height() {
        image = image.crop(0, 0, map_w * tile_w, map_h * tile_h, mode);
    }
    let map_cells = image.crops(tile_w, tile_h, mode);
    info!("mapping {} {tile_w}x{tile_h} image slices", map_cells.len());

    let mut map = Map::new(mode, map_w, map_h, tile_w, tile_h);
    for (i, cell) in map_cells.iter().enumerate() {
        map.add(
            cell,
            &tileset,
            &palette,
            bpp,
            i as u32 % map_w,
            i as u32 / map_w,
        )?;
    }

    if let Some(path) = &args.out_palette {
        write_file(path, &palette.native_data(), "native palette data")?;
    }
    if let Some(path) = &args.out_tiles {
        write_file(path, &tileset.native_data(), "native tile data")?;
    }
    if let Some(path) = &args.out_map {
        write_file(path, &map.native_data(false, 0, 0), "native map data")?;
    }
    if let Some(path) = &args.out_palette_image {
        pngio::save_rgba(path, &Image::from_palette(&palette)?)?;
        info!("saved palette image to \"{}\"", path.display());
    }
    if let Some(path) = &args.out_palette_act {
        write_file(path, &palette.act_data(), "act palette")?;
    }
    if let Some(path) = &args.out_tiles_image {
        pngio::save_rgba(path, &Image::from_tileset(&tileset, 128)?)?;
        info!("saved tileset image to \"{}\"", path.display());
    }
    Ok(())
}
