//! Fixture builders shared by the integration tests.
//!
//! Everything is generated from fixed seeds so sizes are reproducible.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use filesqueeze::{PageRasterizer, RasterPage, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Uniform RGB noise.
pub fn noise_rgb(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    rng.fill(pixels.as_mut_slice());
    pixels
}

/// A gradient with mild noise, photo-like enough for JPEG to compress well.
pub fn photo_like(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |x, y| {
        let jitter: i32 = rng.random_range(-12..=12);
        let r = (x * 255 / width.max(1)) as i32 + jitter;
        let g = (y * 255 / height.max(1)) as i32 - jitter;
        let b = ((x + y) * 127 / (width + height).max(1)) as i32 + jitter;
        Rgb([
            r.clamp(0, 255) as u8,
            g.clamp(0, 255) as u8,
            b.clamp(0, 255) as u8,
        ])
    })
}

pub fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    RgbImage::from_raw(width, height, noise_rgb(width, height, seed)).unwrap()
}

pub fn write_jpeg(path: &Path, img: &RgbImage, quality: u8) {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(img)
        .unwrap();
    std::fs::write(path, buffer).unwrap();
}

pub fn write_png(path: &Path, img: &DynamicImage) {
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Names in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// A page holding one uncompressed RGB image and a line of text.
pub struct FixturePage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub text: String,
}

impl FixturePage {
    pub fn noise(width: u32, height: u32, seed: u64, text: &str) -> Self {
        Self {
            width,
            height,
            pixels: noise_rgb(width, height, seed),
            text: text.to_string(),
        }
    }

    pub fn from_image(img: RgbImage, text: &str) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            pixels: img.into_raw(),
            text: text.to_string(),
        }
    }
}

/// Page size in points for every fixture page.
pub const PAGE_PT: i64 = 200;

/// Write a PDF with one page per `FixturePage`, without stream compression.
pub fn write_pdf(path: &Path, pages: Vec<FixturePage>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let mut kids: Vec<Object> = Vec::new();

    for page in pages {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            page.pixels,
        ));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![PAGE_PT.into(), 0.into(), 0.into(), PAGE_PT.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![20.into(), 20.into()]),
                Operation::new("Tj", vec![Object::string_literal(page.text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_PT.into(), PAGE_PT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Stands in for PDFium: one noise image per page, sized from the page box.
#[derive(Clone, Default)]
pub struct NoiseRasterizer {
    calls: Arc<AtomicUsize>,
}

impl NoiseRasterizer {
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl PageRasterizer for NoiseRasterizer {
    fn rasterize(&self, source: &Path, scale: f32) -> Result<Vec<RasterPage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let doc = Document::load(source).unwrap();
        let side = (PAGE_PT as f32 * scale) as u32;
        Ok(doc
            .get_pages()
            .keys()
            .map(|&n| RasterPage {
                image: noise_image(side, side, n as u64),
                width_pt: PAGE_PT as f32,
                height_pt: PAGE_PT as f32,
            })
            .collect())
    }
}

/// Text-bearing page content of `page` (1-based) in `path`.
pub fn page_content(path: &Path, page: u32) -> Vec<u8> {
    let doc = Document::load(path).unwrap();
    let page_id = doc.get_pages()[&page];
    doc.get_page_content(page_id).unwrap()
}

pub fn page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}
