//! Tunables for both pipelines.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use image::imageops::FilterType;

/// Image pipeline settings.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Quality of the first encode.
    pub initial_quality: u8,
    /// Quality decrement per coarse-descent step.
    pub quality_step: u8,
    /// Below or at this quality, dimensions shrink instead.
    pub coarse_floor: u8,
    /// Reaching this quality ends the search.
    pub quality_floor: u8,
    /// Linear factor applied to both sides per shrink step.
    pub shrink_factor: f64,
    /// Smallest side allowed while shrinking. One pixel means only a side
    /// that truncates to zero stops the descent.
    pub min_dimension: u32,
    /// Smallest linear scale, relative to the source, the descent may shrink
    /// to before the target counts as unreachable.
    pub min_scale: f64,
    pub filter: FilterType,
    /// Fail instead of writing an oversized file at the quality floor.
    pub strict: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            initial_quality: 95,
            quality_step: 5,
            coarse_floor: 60,
            quality_floor: 10,
            shrink_factor: 0.9,
            min_dimension: 1,
            min_scale: 0.1,
            filter: FilterType::Lanczos3,
            strict: false,
        }
    }
}

/// PDF pipeline settings.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// JPEG quality used when recompressing embedded images in place.
    pub recompress_quality: u8,
    /// Linear render scale for the rasterizing fallback.
    pub raster_scale: f32,
    /// Qualities searched by the rasterizing fallback.
    pub quality_range: RangeInclusive<u8>,
    /// Directory holding the PDFium shared library, if not on the system path.
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            recompress_quality: 85,
            raster_scale: 0.8,
            quality_range: 30..=99,
            pdfium_dir: None,
        }
    }
}
