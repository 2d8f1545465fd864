//! PNG decode and encode for the command line front end.
//!
//! Indexed files are decoded without palette expansion so the embedded
//! palette and per-pixel indices survive into the [`Image`] — the no-remap
//! paths depend on them. Everything else is normalized to 8-bit RGBA.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use tilecast::color::{self, Rgba8};
use tilecast::Image;

pub fn load(path: &Path) -> Result<Image> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("file \"{}\" could not be opened", path.display()))?;

    let mut decoder = png::Decoder::new(bytes.as_slice());
    decoder.set_transformations(png::Transformations::IDENTITY);
    let reader = decoder
        .read_info()
        .with_context(|| format!("\"{}\" is not a readable PNG", path.display()))?;
    let info = reader.info();

    if info.color_type == png::ColorType::Indexed {
        load_indexed(reader)
    } else {
        // second decoder pass with expansion to 8 bit channels
        let mut decoder = png::Decoder::new(bytes.as_slice());
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let reader = decoder.read_info()?;
        load_direct(reader)
    }
}

fn load_indexed(mut reader: png::Reader<&[u8]>) -> Result<Image> {
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let out = reader.next_frame(&mut buf)?;
    let (width, height) = (out.width, out.height);
    let info = reader.info();

    let plte = info
        .palette
        .as_ref()
        .context("indexed PNG without a palette chunk")?;
    let trns = info.trns.as_deref().unwrap_or(&[]);
    let palette: Vec<u32> = plte
        .chunks_exact(3)
        .enumerate()
        .map(|(i, rgb)| {
            color::pack(Rgba8 {
                r: rgb[0],
                g: rgb[1],
                b: rgb[2],
                a: trns.get(i).copied().unwrap_or(0xff),
            })
        })
        .collect();

    // unpack sub-byte indices row by row (rows are byte aligned)
    let depth = out.bit_depth as u32;
    let mut indexed = Vec::with_capacity((width * height) as usize);
    if depth == 8 {
        indexed.extend_from_slice(&buf[..(width * height) as usize]);
    } else {
        let row_bytes = (width * depth).div_ceil(8) as usize;
        let mask = ((1u16 << depth) - 1) as u8;
        for y in 0..height as usize {
            let row = &buf[y * row_bytes..(y + 1) * row_bytes];
            for x in 0..width as usize {
                let bit = x as u32 * depth;
                let shift = 8 - depth - (bit % 8);
                indexed.push((row[(bit / 8) as usize] >> shift) & mask);
            }
        }
    }

    Ok(Image::with_indexed(width, height, indexed, palette)?)
}

fn load_direct(mut reader: png::Reader<&[u8]>) -> Result<Image> {
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let out = reader.next_frame(&mut buf)?;
    let (width, height) = (out.width, out.height);
    let data = &buf[..out.buffer_size()];

    let pixels: Vec<Rgba8> = match out.color_type {
        png::ColorType::Rgba => data
            .chunks_exact(4)
            .map(|p| Rgba8 { r: p[0], g: p[1], b: p[2], a: p[3] })
            .collect(),
        png::ColorType::Rgb => data
            .chunks_exact(3)
            .map(|p| Rgba8 { r: p[0], g: p[1], b: p[2], a: 0xff })
            .collect(),
        png::ColorType::GrayscaleAlpha => data
            .chunks_exact(2)
            .map(|p| Rgba8 { r: p[0], g: p[0], b: p[0], a: p[1] })
            .collect(),
        png::ColorType::Grayscale => data
            .iter()
            .map(|&v| Rgba8 { r: v, g: v, b: v, a: 0xff })
            .collect(),
        png::ColorType::Indexed => anyhow::bail!("unexpected indexed output"),
    };

    Ok(Image::new(width, height, pixels)?)
}

pub fn save_rgba(path: &Path, image: &Image) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("could not create \"{}\"", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    let mut data = Vec::with_capacity(image.pixels().len() * 4);
    for px in image.pixels() {
        data.extend_from_slice(&[px.r, px.g, px.b, px.a]);
    }
    writer.write_image_data(&data)?;
    Ok(())
}

/// Write the image's index buffer as an indexed PNG with its palette
/// embedded. Falls back to an evenly spaced grayscale ramp when the image
/// carries indices but no palette.
pub fn save_indexed(path: &Path, image: &Image) -> Result<()> {
    anyhow::ensure!(
        image.has_indexed_data(),
        "indexed output requires indexed image data"
    );

    let palette: Vec<u32> = if image.palette().is_empty() {
        let size = usize::from(image.indexed_data().iter().copied().max().unwrap_or(0)) + 1;
        let step = (0x100 / size) as u8;
        (0..size)
            .map(|i| {
                let v = step.wrapping_mul(i as u8);
                color::pack(Rgba8 { r: v, g: v, b: v, a: 0xff })
            })
            .collect()
    } else {
        image.palette().to_vec()
    };

    let mut plte = Vec::with_capacity(palette.len() * 3);
    let mut trns = Vec::with_capacity(palette.len());
    for &c in &palette {
        let px = color::unpack(c);
        plte.extend_from_slice(&[px.r, px.g, px.b]);
        trns.push(px.a);
    }

    let file = File::create(path)
        .with_context(|| format!("could not create \"{}\"", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width(), image.height());
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(plte);
    if trns.iter().any(|&a| a != 0xff) {
        encoder.set_trns(trns);
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.indexed_data())?;
    Ok(())
}
