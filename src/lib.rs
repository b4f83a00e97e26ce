//! Compress images and PDF documents toward a target file size.
//!
//! Images go through a monotonic descent: JPEG/PNG quality drops first, then
//! the dimensions shrink until the encoding fits. PDFs first have their
//! embedded images recompressed in place; if that is not enough every page is
//! rasterized and the document rebuilt at the highest JPEG quality that fits.
//!
//! Each call is synchronous and self-contained. Trial files live in a
//! per-call scratch directory next to the output and are removed on every
//! exit path, so independent calls may run on separate threads.
//!
//! ```no_run
//! let result = filesqueeze::compress_image("photo.jpg", "photo_resized.jpg", 100, None);
//! if let Some(report) = result.report() {
//!     println!("{} ({:.2} KB)", report.output.display(), report.size_kb());
//! }
//! ```

pub mod config;
pub mod error;
pub mod image_compressor;
pub mod pdf;
pub mod request;
pub mod search;
pub mod workspace;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

pub use config::{ImageOptions, PdfOptions};
pub use error::{CompressError, FailureKind, Result};
pub use image_compressor::{EncodeCandidate, ImageCompressor};
pub use pdf::{PageRasterizer, PdfCompressor, RasterPage};
pub use request::{
    default_output_path, AspectRatio, CompressionReport, CompressionRequest, CompressionResult,
    FileKind, OutputFormat, PdfStrategy, ReportDetail,
};

/// Compress a raster image to at most `target_kb` kilobytes.
///
/// `aspect_ratio` is a `(width, height)` pair; when given, the height is
/// stretched to that ratio before compressing.
pub fn compress_image(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_kb: u64,
    aspect_ratio: Option<(u32, u32)>,
) -> CompressionResult {
    guarded(|| {
        let aspect_ratio = aspect_ratio
            .map(|(w, h)| AspectRatio::new(w, h))
            .transpose()?;
        let request = CompressionRequest::new(source.as_ref(), output.as_ref(), target_kb)
            .with_aspect_ratio(aspect_ratio);
        ImageCompressor::default().compress(&request)
    })
}

/// Compress a PDF to at most `target_kb` kilobytes.
pub fn compress_pdf(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_kb: u64,
) -> CompressionResult {
    guarded(|| {
        let request = CompressionRequest::new(source.as_ref(), output.as_ref(), target_kb);
        PdfCompressor::default().compress(&request)
    })
}

/// Run one pipeline, turning errors and panics into a failure result.
pub fn guarded<F>(run: F) -> CompressionResult
where
    F: FnOnce() -> Result<CompressionReport>,
{
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => {
            if let Err(e) = &result {
                log::error!("{}", e);
            }
            result.into()
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Compression panicked: {}", message);
            Err(CompressError::Internal(message)).into()
        }
    }
}
