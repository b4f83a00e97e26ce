//! Page rasterization backends for the fallback pass.

use std::path::Path;
#[cfg(feature = "pdfium")]
use std::path::PathBuf;

use image::RgbImage;

use crate::error::{CompressError, Result};

/// One rendered page without alpha.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image: RgbImage,
    /// Page size in PDF points, kept for the rebuilt document.
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Renders every page of a PDF file at a linear `scale` of its natural size.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, source: &Path, scale: f32) -> Result<Vec<RasterPage>>;
}

/// Rasterizer used when no backend was compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl PageRasterizer for Unavailable {
    fn rasterize(&self, _source: &Path, _scale: f32) -> Result<Vec<RasterPage>> {
        Err(CompressError::Rasterize(
            "built without a rasterization backend (enable the `pdfium` feature)".to_string(),
        ))
    }
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::*;
    use image::{DynamicImage, RgbaImage};
    use lazy_static::lazy_static;
    use pdfium_render::prelude::*;

    use crate::image_compressor::flatten_alpha;

    lazy_static! {
        /// Process-wide binding. Dropping a `Pdfium` shuts the library down
        /// for every thread, so once bound it lives until exit.
        static ref PDFIUM: Mutex<Option<Pdfium>> = Mutex::new(None);
    }

    fn bind(library_dir: Option<&Path>) -> Result<Pdfium> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .or_else(|_| Pdfium::bind_to_system_library()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| CompressError::Rasterize(format!("PDFium library not available: {:?}", e)))?;
        log::debug!("Bound PDFium library");
        Ok(Pdfium::new(bindings))
    }

    /// Renders with the PDFium shared library.
    ///
    /// All instances share one binding and render one document at a time.
    /// Only the first successful bind in a process looks at `library_dir`.
    #[derive(Debug, Default, Clone)]
    pub struct PdfiumRasterizer {
        library_dir: Option<PathBuf>,
    }

    impl PdfiumRasterizer {
        /// Look for the library in `library_dir` before the system path.
        pub fn new(library_dir: Option<PathBuf>) -> Self {
            Self { library_dir }
        }

        fn shared(&self) -> Result<MutexGuard<'static, Option<Pdfium>>> {
            let mut slot = PDFIUM.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(bind(self.library_dir.as_deref())?);
            }
            Ok(slot)
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(&self, source: &Path, scale: f32) -> Result<Vec<RasterPage>> {
            let slot = self.shared()?;
            let pdfium = slot
                .as_ref()
                .ok_or_else(|| CompressError::Rasterize("PDFium binding missing".to_string()))?;
            let document = pdfium
                .load_pdf_from_file(source, None)
                .map_err(|e| CompressError::decode(source, format!("{:?}", e)))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);

            let mut pages = Vec::new();
            for (index, page) in document.pages().iter().enumerate() {
                let bitmap = page.render_with_config(&config).map_err(|e| {
                    CompressError::Rasterize(format!("page {}: {:?}", index + 1, e))
                })?;
                let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
                let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(
                    || CompressError::Rasterize(format!("page {}: bitmap size mismatch", index + 1)),
                )?;
                pages.push(RasterPage {
                    image: flatten_alpha(&DynamicImage::ImageRgba8(rgba)),
                    width_pt: page.width().value,
                    height_pt: page.height().value,
                });
            }
            log::debug!("Rasterized {} pages at scale {}", pages.len(), scale);
            Ok(pages)
        }
    }
}

/// The compiled-in backend configured with `pdfium_dir`.
#[cfg(feature = "pdfium")]
pub fn default_rasterizer(pdfium_dir: Option<&Path>) -> Box<dyn PageRasterizer> {
    Box::new(PdfiumRasterizer::new(pdfium_dir.map(Path::to_path_buf)))
}

#[cfg(not(feature = "pdfium"))]
pub fn default_rasterizer(_pdfium_dir: Option<&Path>) -> Box<dyn PageRasterizer> {
    Box::new(Unavailable)
}
