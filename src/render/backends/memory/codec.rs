//! Codec registry of the in-memory engine.

use std::collections::HashMap;

use anyhow::{bail, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// 8-bit RGBA PNG.
    Png32,
    /// Palette PNG, at most 256 entries.
    Png8,
    Jpeg { quality: u8 },
}

impl Codec {
    /// Resolves a format name such as `png256`, `png32` or `jpeg80`.
    ///
    /// Codec options after a `:` (`png8:z=1`) are accepted and ignored.
    pub fn from_name(format: &str) -> Result<Codec> {
        let base = format.split(':').next().unwrap_or("");
        match base {
            "png" | "png32" => return Ok(Codec::Png32),
            "png8" | "png256" => return Ok(Codec::Png8),
            "jpeg" | "jpg" => return Ok(Codec::Jpeg { quality: DEFAULT_JPEG_QUALITY }),
            _ => {}
        }

        if let Some(q) = base.strip_prefix("jpeg") {
            if let Ok(quality) = q.parse::<u8>() {
                if quality <= 100 {
                    return Ok(Codec::Jpeg { quality });
                }
            }
        }

        bail!("unknown file type: {format}")
    }

    /// Codec for an output path, guessed from its extension.
    pub fn from_extension(ext: &str) -> Option<Codec> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Codec::Png8),
            "jpg" | "jpeg" => Some(Codec::Jpeg { quality: DEFAULT_JPEG_QUALITY }),
            _ => None,
        }
    }

    /// Encodes straight-alpha RGBA8 pixels.
    pub fn encode(self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        match self {
            Codec::Png32 => encode_png_rgba(rgba, width, height),
            Codec::Png8 => encode_png_indexed(rgba, width, height),
            Codec::Jpeg { quality } => encode_jpeg(rgba, width, height, quality),
        }
    }
}

fn encode_png_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
        writer.finish()?;
    }
    Ok(out)
}

fn encode_png_indexed(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (palette, indices) = match exact_palette(rgba) {
        Some(found) => found,
        None => reduced_palette(rgba),
    };

    let mut rgb = Vec::with_capacity(palette.len() * 3);
    let mut alpha = Vec::with_capacity(palette.len());
    for [r, g, b, a] in &palette {
        rgb.extend_from_slice(&[*r, *g, *b]);
        alpha.push(*a);
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(rgb);
        if alpha.iter().any(|a| *a != 255) {
            encoder.set_trns(alpha);
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indices)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Palette holding every distinct colour, if there are at most 256 of them.
fn exact_palette(rgba: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(rgba.len() / 4);

    for px in rgba.chunks_exact(4) {
        let color = [px[0], px[1], px[2], px[3]];
        let index = match lookup.get(&color) {
            Some(i) => *i,
            None => {
                if palette.len() == 256 {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, i);
                i
            }
        };
        indices.push(index);
    }

    if palette.is_empty() {
        palette.push([0, 0, 0, 0]);
    }
    Some((palette, indices))
}

/// Fixed 256-entry palette: one alpha bit and 2-3-2 bits of red, green and blue.
fn reduced_palette(rgba: &[u8]) -> (Vec<[u8; 4]>, Vec<u8>) {
    let palette = (0..=255u8)
        .map(|i| {
            let a = if i & 0x80 != 0 { 255 } else { 0 };
            let r = ((i >> 5) & 0x03) * 85;
            let g = (((i >> 2) & 0x07) as u16 * 255 / 7) as u8;
            let b = (i & 0x03) * 85;
            [r, g, b, a]
        })
        .collect();

    let indices = rgba
        .chunks_exact(4)
        .map(|px| {
            let a = if px[3] >= 128 { 0x80 } else { 0 };
            a | ((px[0] >> 6) << 5) | ((px[1] >> 5) << 2) | (px[2] >> 6)
        })
        .collect();

    (palette, indices)
}

fn encode_jpeg(rgba: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let rgb: Vec<u8> = rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.max(1)).write_image(&rgb, width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}
