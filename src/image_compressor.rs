//! Size-targeted raster image compression.
//!
//! Quality drops in coarse steps first; once it reaches the coarse floor the
//! image shrinks by a fixed factor per pass instead. Every pass re-encodes in
//! memory and only the final encoding touches the disk.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ColorType, DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::config::ImageOptions;
use crate::error::{CompressError, Result};
use crate::request::{
    AspectRatio, CompressionReport, CompressionRequest, OutputFormat, ReportDetail,
};
use crate::workspace::Scratch;

/// A single encode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeCandidate {
    pub quality: u8,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

pub struct ImageCompressor {
    options: ImageOptions,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new(ImageOptions::default())
    }
}

impl ImageCompressor {
    pub fn new(options: ImageOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    pub fn compress(&self, request: &CompressionRequest) -> Result<CompressionReport> {
        request.validate()?;
        let (img, format) = load_source(request.source())?;
        log::info!(
            "Compressing {:?} ({}x{}) to {} as {:?}, target {} KB",
            request.source(),
            img.width(),
            img.height(),
            request.output().display(),
            format,
            request.target_kb()
        );

        let img = match request.aspect_ratio() {
            Some(ratio) => apply_aspect_ratio(&img, ratio, &self.options),
            None => img,
        };
        let base = prepare_for(img, format);

        let (bytes, candidate) = self.descend(&base, format, request)?;

        let scratch = Scratch::beside(request.output())?;
        let written = scratch
            .write_bytes("image-", &bytes)?
            .promote(request.output())?;
        let within_target = written <= request.target_bytes();
        log::info!(
            "Wrote {} bytes at quality {} ({}x{}){}",
            written,
            candidate.quality,
            candidate.width,
            candidate.height,
            if within_target { "" } else { ", above target" }
        );

        Ok(CompressionReport {
            output: request.output().to_path_buf(),
            bytes: written,
            detail: ReportDetail::Image {
                format,
                quality: candidate.quality,
                width: candidate.width,
                height: candidate.height,
                within_target,
            },
        })
    }

    /// Run the descent and return the encoding to keep.
    fn descend(
        &self,
        base: &DynamicImage,
        format: OutputFormat,
        request: &CompressionRequest,
    ) -> Result<(Vec<u8>, EncodeCandidate)> {
        let opts = &self.options;
        let target = request.target_bytes();
        let step = opts.quality_step.max(1);
        let min_dimension = opts.min_dimension.max(1);

        let mut quality = opts.initial_quality.clamp(1, 100);
        let (base_width, base_height) = base.dimensions();
        let (mut width, mut height) = (base_width, base_height);
        let mut resized: Option<DynamicImage> = None;

        loop {
            let current = resized.as_ref().unwrap_or(base);
            let bytes = encode(current, format, quality)?;
            let candidate = EncodeCandidate {
                quality,
                size: bytes.len() as u64,
                width,
                height,
            };
            log::debug!(
                "q={} {}x{} -> {} bytes",
                quality,
                width,
                height,
                candidate.size
            );

            let fits = candidate.size <= target;
            if fits || quality <= opts.quality_floor {
                if !fits && opts.strict {
                    return Err(request.unreachable(format!(
                        "quality floor {} still gives {} bytes",
                        opts.quality_floor, candidate.size
                    )));
                }
                return Ok((bytes, candidate));
            }

            if quality > opts.coarse_floor {
                quality = quality.saturating_sub(step).max(1);
                continue;
            }

            let next_width = (width as f64 * opts.shrink_factor) as u32;
            let next_height = (height as f64 * opts.shrink_factor) as u32;
            if next_width < min_dimension || next_height < min_dimension {
                return Err(request.unreachable(format!(
                    "shrinking {}x{} would cross the {} px floor",
                    width, height, min_dimension
                )));
            }
            let scale_floor_width = base_width as f64 * opts.min_scale;
            let scale_floor_height = base_height as f64 * opts.min_scale;
            if (next_width as f64) < scale_floor_width || (next_height as f64) < scale_floor_height {
                return Err(request.unreachable(format!(
                    "shrinking {}x{} would go below {}% of the {}x{} source",
                    width,
                    height,
                    opts.min_scale * 100.0,
                    base_width,
                    base_height
                )));
            }
            if (next_width, next_height) == (width, height) {
                return Err(request.unreachable(format!(
                    "shrink factor {} makes no progress at {}x{}",
                    opts.shrink_factor, width, height
                )));
            }
            width = next_width;
            height = next_height;
            // Resample from the full-size base so error does not accumulate.
            resized = Some(base.resize_exact(width, height, opts.filter));
        }
    }
}

fn load_source(path: &Path) -> Result<(DynamicImage, OutputFormat)> {
    let data = std::fs::read(path).map_err(|e| CompressError::decode(path, e))?;
    let input_format = image::guess_format(&data).map_err(|e| CompressError::decode(path, e))?;
    let img = image::load_from_memory_with_format(&data, input_format)
        .map_err(|e| CompressError::decode(path, e))?;
    Ok((img, OutputFormat::for_source(input_format)))
}

/// Stretch the height to `ratio`, keeping the width.
pub fn apply_aspect_ratio(
    img: &DynamicImage,
    ratio: AspectRatio,
    options: &ImageOptions,
) -> DynamicImage {
    let width = img.width();
    let height = ratio.height_for(width);
    log::debug!(
        "Aspect {}: {}x{} -> {}x{}",
        ratio,
        width,
        img.height(),
        width,
        height
    );
    img.resize_exact(width, height, options.filter)
}

/// Convert to a pixel layout the output encoder accepts.
fn prepare_for(img: DynamicImage, format: OutputFormat) -> DynamicImage {
    match format {
        OutputFormat::Png => img,
        OutputFormat::Jpeg => match img.color() {
            ColorType::L8 | ColorType::Rgb8 => img,
            ColorType::L16 => DynamicImage::ImageLuma8(img.to_luma8()),
            c if c.has_alpha() => DynamicImage::ImageRgb8(flatten_alpha(&img)),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
    }
}

/// Composite over a white background.
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode at `quality`. For PNG the quality picks the deflate effort.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))?;
        }
        OutputFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buffer, png_compression(quality), PngFilter::Adaptive);
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(buffer)
}

fn png_compression(quality: u8) -> CompressionType {
    match quality {
        90..=u8::MAX => CompressionType::Fast,
        70..=89 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}
