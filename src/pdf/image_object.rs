//! Decoding and re-encoding of a single image XObject.

use std::io::Read;

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};

/// What happened to one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// New JPEG bytes replaced the stream.
    Replaced { before: usize, after: usize },
    /// The re-encode was not smaller; the stream is unchanged.
    Kept { before: usize, after: usize },
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut buffer = Vec::new();
    decoder
        .read_to_end(&mut buffer)
        .context("Manual zlib failed")?;
    Ok(buffer)
}

fn decompress_stream(stream: &Stream) -> Result<Vec<u8>> {
    match stream.decompressed_content() {
        Ok(c) => Ok(c),
        Err(e) => match stream.dict.get(b"Filter") {
            Ok(Object::Name(name)) if name == b"FlateDecode" => inflate(&stream.content),
            Ok(_) => Err(anyhow!("Decompression failed: {:?}", e)),
            // No filter: the content is the raw sample data.
            Err(_) => Ok(stream.content.clone()),
        },
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Filter names in application order, with indirect entries resolved.
fn filters(doc: &Document, stream: &Stream) -> Result<Vec<Vec<u8>>> {
    let filter = match stream.dict.get(b"Filter") {
        Ok(f) => resolve(doc, f),
        Err(_) => return Ok(Vec::new()),
    };
    match filter {
        Object::Name(name) => Ok(vec![name.clone()]),
        Object::Array(items) => items
            .iter()
            .map(|item| match resolve(doc, item) {
                Object::Name(name) => Ok(name.clone()),
                other => Err(anyhow!("Unexpected filter entry {:?}", other)),
            })
            .collect(),
        other => Err(anyhow!("Unexpected Filter {:?}", other)),
    }
}

/// Number of color components, or an error for spaces that cannot be
/// re-encoded as plain gray or RGB.
fn components(doc: &Document, stream: &Stream) -> Result<u32> {
    let cs = stream
        .dict
        .get(b"ColorSpace")
        .map(|o| resolve(doc, o))
        .map_err(|_| anyhow!("Missing ColorSpace"))?;
    match cs {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" => Ok(4),
            other => bail!("Unsupported color space {}", String::from_utf8_lossy(other)),
        },
        Object::Array(items) => {
            let family = items.first().and_then(|o| o.as_name().ok());
            match family {
                Some(b"ICCBased") => {
                    let profile = items
                        .get(1)
                        .map(|o| resolve(doc, o))
                        .ok_or_else(|| anyhow!("ICCBased without profile"))?;
                    let n = match profile {
                        Object::Stream(s) => s.dict.get(b"N").and_then(|n| n.as_i64()).ok(),
                        _ => None,
                    };
                    match n {
                        Some(1) => Ok(1),
                        Some(3) => Ok(3),
                        Some(4) => Ok(4),
                        other => bail!("Unsupported ICC component count {:?}", other),
                    }
                }
                Some(b"CalGray") => Ok(1),
                Some(b"CalRGB") => Ok(3),
                Some(other) => bail!("Unsupported color space {}", String::from_utf8_lossy(other)),
                None => bail!("Empty color space array"),
            }
        }
        other => bail!("Unexpected ColorSpace {:?}", other),
    }
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let k = 1.0 - cmyk[3] as f32 / 255.0;
            let channel = |v: u8| ((1.0 - v as f32 / 255.0) * k * 255.0).round() as u8;
            [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
        })
        .collect()
}

fn decode_samples(width: u32, height: u32, components: u32, content: Vec<u8>) -> Result<DynamicImage> {
    let expected = width as usize * height as usize * components as usize;
    if content.len() != expected {
        bail!(
            "Sample data is {} bytes, expected {} for {}x{}x{}",
            content.len(),
            expected,
            width,
            height,
            components
        );
    }
    let img = match components {
        1 => DynamicImage::ImageLuma8(
            GrayImage::from_raw(width, height, content).ok_or(anyhow!("Failed Gray"))?,
        ),
        3 => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, content).ok_or(anyhow!("Failed RGB"))?,
        ),
        4 => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, cmyk_to_rgb(&content))
                .ok_or(anyhow!("Failed CMYK->RGB"))?,
        ),
        n => bail!("Unsupported components {}", n),
    };
    Ok(img)
}

/// Decode the image stream `object_id` into gray or RGB pixels.
pub fn decode_image(doc: &Document, object_id: ObjectId) -> Result<DynamicImage> {
    let stream = match doc.objects.get(&object_id) {
        Some(Object::Stream(s)) => s,
        _ => bail!("Object not a stream"),
    };
    let dict = &stream.dict;

    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        bail!("Stencil mask");
    }
    if dict.get(b"Decode").is_ok() {
        bail!("Custom Decode array");
    }

    let filters = filters(doc, stream)?;
    let is_jpeg = filters.last().map(|f| f == b"DCTDecode").unwrap_or(false);
    let leading = if is_jpeg {
        &filters[..filters.len() - 1]
    } else {
        &filters[..]
    };
    if let Some(f) = leading.iter().find(|f| f.as_slice() != b"FlateDecode") {
        bail!("Unsupported filter {}", String::from_utf8_lossy(f));
    }

    let img = if is_jpeg {
        let data = if leading.is_empty() {
            stream.content.clone()
        } else {
            leading
                .iter()
                .try_fold(stream.content.clone(), |data, _| inflate(&data))?
        };
        image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
            .context("Failed to decode JPEG image")?
    } else {
        let bits = dict.get(b"BitsPerComponent").and_then(|o| o.as_i64()).unwrap_or(0);
        if bits != 8 {
            bail!("Unsupported BitsPerComponent {}", bits);
        }
        let width = dict.get(b"Width").and_then(|o| o.as_i64()).unwrap_or(0) as u32;
        let height = dict.get(b"Height").and_then(|o| o.as_i64()).unwrap_or(0) as u32;
        if width == 0 || height == 0 {
            bail!("Invalid dimensions {}x{}", width, height);
        }
        let components = components(doc, stream)?;
        let content = decompress_stream(stream)?;
        decode_samples(width, height, components, content)?
    };

    // JPEG decodes can still yield alpha or 16-bit layouts.
    Ok(match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    })
}

/// Re-encode `object_id` as JPEG at `quality`, replacing its data if smaller.
///
/// The object keeps its id, so every page using it sees the new bytes.
pub fn recompress_image(doc: &mut Document, object_id: ObjectId, quality: u8) -> Result<ImageOutcome> {
    let img = decode_image(doc, object_id)?;
    let (color_space, jpeg) = {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        img.write_with_encoder(encoder)
            .context("Failed to encode JPEG")?;
        let cs: &[u8] = match img {
            DynamicImage::ImageLuma8(_) => b"DeviceGray",
            _ => b"DeviceRGB",
        };
        (cs, buffer)
    };

    let stream = match doc.objects.get_mut(&object_id) {
        Some(Object::Stream(s)) => s,
        _ => bail!("Object not a stream"),
    };
    let before = stream.content.len();
    let after = jpeg.len();
    if after >= before {
        return Ok(ImageOutcome::Kept { before, after });
    }

    stream.set_content(jpeg);
    stream.allows_compression = false;
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("Width", Object::Integer(img.width() as i64));
    stream.dict.set("Height", Object::Integer(img.height() as i64));
    stream
        .dict
        .set("ColorSpace", Object::Name(color_space.to_vec()));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    Ok(ImageOutcome::Replaced { before, after })
}
