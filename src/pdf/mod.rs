//! Size-targeted PDF compression.
//!
//! A document that already fits is copied through. Otherwise embedded images
//! are recompressed in place, which keeps text and vector content. Only if
//! that is still too large are the pages rasterized and the whole document
//! rebuilt from page images, with a binary search over their shared JPEG
//! quality.

mod assemble;
mod image_object;
mod optimize;
mod rasterize;
mod recompress;

use std::path::Path;

use lopdf::Document;

pub use assemble::{encode_page, image_document};
pub use image_object::{decode_image, recompress_image, ImageOutcome};
pub use optimize::{dedup_images, optimize, save_optimized};
#[cfg(feature = "pdfium")]
pub use rasterize::PdfiumRasterizer;
pub use rasterize::{default_rasterizer, PageRasterizer, RasterPage, Unavailable};
pub use recompress::{page_images, recompress_images, RecompressStats};

use crate::config::PdfOptions;
use crate::error::{CompressError, Result};
use crate::request::{CompressionReport, CompressionRequest, PdfStrategy, ReportDetail};
use crate::search::search_quality;
use crate::workspace::Scratch;

fn load_document(path: &Path) -> Result<Document> {
    let mut doc = Document::load(path).map_err(|e| CompressError::decode(path, format!("{:?}", e)))?;
    if doc.is_encrypted() {
        log::info!("PDF is encrypted. Attempting to decrypt with empty password...");
        if let Err(e) = doc.decrypt(b"") {
            log::warn!("Failed to decrypt with empty password: {:?}", e);
        }
    }
    Ok(doc)
}

pub struct PdfCompressor {
    options: PdfOptions,
    rasterizer: Box<dyn PageRasterizer>,
}

impl Default for PdfCompressor {
    fn default() -> Self {
        Self::new(PdfOptions::default())
    }
}

impl PdfCompressor {
    /// Uses the compiled-in rasterizer, pointed at `options.pdfium_dir`.
    pub fn new(options: PdfOptions) -> Self {
        let rasterizer = default_rasterizer(options.pdfium_dir.as_deref());
        Self {
            options,
            rasterizer,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: impl PageRasterizer + 'static) -> Self {
        self.rasterizer = Box::new(rasterizer);
        self
    }

    pub fn options(&self) -> &PdfOptions {
        &self.options
    }

    pub fn compress(&self, request: &CompressionRequest) -> Result<CompressionReport> {
        request.validate()?;
        let source = request.source();
        let target = request.target_bytes();
        let source_size = std::fs::metadata(source)
            .map_err(|e| CompressError::decode(source, e))?
            .len();
        let mut doc = load_document(source)?;
        let pages = doc.get_pages().len();
        log::info!(
            "Compressing {:?} ({} pages, {} bytes) to {}, target {} KB",
            source,
            pages,
            source_size,
            request.output().display(),
            request.target_kb()
        );

        let scratch = Scratch::beside(request.output())?;

        if source_size <= target {
            log::info!("Source already within target, copying unchanged");
            let bytes = scratch.copy_of("source-", source)?.promote(request.output())?;
            return Ok(report(request, bytes, PdfStrategy::Passthrough, pages));
        }

        let stats = recompress_images(&mut doc, self.options.recompress_quality);
        let pass1 = save_optimized(&mut doc, &scratch, "pass1-")?;
        drop(doc);
        log::info!(
            "In-place recompression: {} images recompressed, {} kept, {} skipped, {} bytes",
            stats.recompressed,
            stats.kept,
            stats.skipped,
            pass1.size()
        );
        if pass1.size() <= target {
            let bytes = pass1.promote(request.output())?;
            let strategy = PdfStrategy::Recompressed {
                images_recompressed: stats.recompressed,
                images_skipped: stats.skipped,
            };
            return Ok(report(request, bytes, strategy, pages));
        }
        drop(pass1);

        log::info!("Still above target, rasterizing pages");
        let rasters = self.rasterizer.rasterize(source, self.options.raster_scale)?;
        if rasters.is_empty() {
            return Err(CompressError::decode(source, "document has no pages"));
        }

        let outcome = search_quality(self.options.quality_range.clone(), target, |quality| {
            let mut trial = image_document(&rasters, quality)?;
            let artifact = save_optimized(&mut trial, &scratch, "pass2-")?;
            Ok((artifact.size(), artifact))
        })?;

        match outcome.best {
            Some(best) => {
                log::info!(
                    "Rasterized at quality {} after {} trials ({} bytes)",
                    best.quality,
                    outcome.trials,
                    best.size
                );
                let bytes = best.artifact.promote(request.output())?;
                let strategy = PdfStrategy::Rasterized {
                    quality: best.quality,
                    trials: outcome.trials,
                };
                Ok(report(request, bytes, strategy, rasters.len()))
            }
            None => Err(request.unreachable(format!(
                "rasterized pages exceed the target even at quality {}",
                self.options.quality_range.start()
            ))),
        }
    }
}

fn report(
    request: &CompressionRequest,
    bytes: u64,
    strategy: PdfStrategy,
    pages: usize,
) -> CompressionReport {
    CompressionReport {
        output: request.output().to_path_buf(),
        bytes,
        detail: ReportDetail::Pdf { strategy, pages },
    }
}
