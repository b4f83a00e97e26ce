//! Request and result values exchanged with the caller.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::error::{CompressError, FailureKind, Result};

/// Bytes per kilobyte used for every target comparison.
pub const KB: u64 = 1024;

/// Width:height ratio applied by distorting the image height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// Both terms must be positive.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidRequest(format!(
                "aspect ratio terms must be positive, got {}:{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Height for a fixed `width` under this ratio, never below one pixel.
    pub fn height_for(&self, width: u32) -> u32 {
        let h = (width as f64 * self.height as f64 / self.width as f64).round();
        (h as u32).max(1)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// One compression call's inputs.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    source: PathBuf,
    output: PathBuf,
    target_kb: u64,
    aspect_ratio: Option<AspectRatio>,
}

impl CompressionRequest {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>, target_kb: u64) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            target_kb,
            aspect_ratio: None,
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: Option<AspectRatio>) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn target_kb(&self) -> u64 {
        self.target_kb
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_kb.saturating_mul(KB)
    }

    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.aspect_ratio
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.target_kb == 0 {
            return Err(CompressError::InvalidRequest(
                "target size must be at least 1 KB".to_string(),
            ));
        }
        if self.source.as_os_str().is_empty() || self.output.as_os_str().is_empty() {
            return Err(CompressError::InvalidRequest(
                "source and output paths must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn unreachable(&self, reason: impl Into<String>) -> CompressError {
        CompressError::UnreachableTarget {
            target_kb: self.target_kb,
            reason: reason.into(),
        }
    }
}

/// Encoded raster format written by the image pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Format written for a source decoded as `input`: PNG stays PNG,
    /// everything else becomes JPEG.
    pub fn for_source(input: ImageFormat) -> Self {
        match input {
            ImageFormat::Png => OutputFormat::Png,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// How the PDF pipeline reached its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfStrategy {
    /// The source already fit and was copied unchanged.
    Passthrough,
    /// Embedded images were recompressed in place.
    Recompressed {
        images_recompressed: usize,
        images_skipped: usize,
    },
    /// Pages were rasterized and searched over JPEG quality.
    Rasterized { quality: u8, trials: usize },
}

/// Pipeline-specific part of a successful report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDetail {
    Image {
        format: OutputFormat,
        quality: u8,
        width: u32,
        height: u32,
        /// False when the quality floor ended the search above target.
        within_target: bool,
    },
    Pdf { strategy: PdfStrategy, pages: usize },
}

/// What a successful call wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionReport {
    pub output: PathBuf,
    pub bytes: u64,
    pub detail: ReportDetail,
}

impl CompressionReport {
    pub fn size_kb(&self) -> f64 {
        self.bytes as f64 / KB as f64
    }
}

/// Terminal value handed to the calling shell.
#[derive(Debug)]
pub enum CompressionResult {
    Success(CompressionReport),
    Failure { kind: FailureKind, reason: String },
}

impl CompressionResult {
    pub fn success(&self) -> bool {
        matches!(self, CompressionResult::Success(_))
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            CompressionResult::Success(report) => Some(&report.output),
            CompressionResult::Failure { .. } => None,
        }
    }

    pub fn report(&self) -> Option<&CompressionReport> {
        match self {
            CompressionResult::Success(report) => Some(report),
            CompressionResult::Failure { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            CompressionResult::Success(_) => None,
            CompressionResult::Failure { reason, .. } => Some(reason),
        }
    }
}

impl From<Result<CompressionReport>> for CompressionResult {
    fn from(result: Result<CompressionReport>) -> Self {
        match result {
            Ok(report) => CompressionResult::Success(report),
            Err(e) => CompressionResult::Failure {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }
}

/// Kind of file the shell is asking to compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
}

/// Sniff the output format from the first bytes of `source`.
fn sniffed_format(source: &Path) -> Option<OutputFormat> {
    let mut head = Vec::with_capacity(64);
    File::open(source).ok()?.take(64).read_to_end(&mut head).ok()?;
    image::guess_format(&head).ok().map(OutputFormat::for_source)
}

/// `<stem>_resized.<ext>` inside `dir`.
///
/// For images the extension follows the format the image pipeline will
/// write, sniffed from the file content like the pipeline does. Unreadable
/// sources fall back to their own extension.
pub fn default_output_path(source: &Path, kind: FileKind, dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = match kind {
        FileKind::Pdf => "pdf",
        FileKind::Image => sniffed_format(source)
            .unwrap_or_else(|| {
                let is_png = source
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("png"))
                    .unwrap_or(false);
                if is_png {
                    OutputFormat::Png
                } else {
                    OutputFormat::Jpeg
                }
            })
            .extension(),
    };
    dir.join(format!("{}_resized.{}", stem, ext))
}
