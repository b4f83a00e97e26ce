//! In-place recompression of every image reachable from the page tree.

use std::collections::{BTreeSet, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::image_object::{recompress_image, ImageOutcome};

/// Limit on Parent hops when looking up inherited page resources.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecompressStats {
    /// Images whose data was replaced.
    pub recompressed: usize,
    /// Images that re-encoded larger and were left alone.
    pub kept: usize,
    /// Images that could not be decoded or converted.
    pub skipped: usize,
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Resources of a page, following inheritance through the page tree.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Some(res) = node.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)) {
            return Some(res);
        }
        node = node.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p))?;
    }
    None
}

fn collect_from_resources(
    doc: &Document,
    resources: &Dictionary,
    images: &mut BTreeSet<ObjectId>,
    forms: &mut HashSet<ObjectId>,
) {
    let xobjects = match resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) {
        Some(x) => x,
        None => return,
    };
    for (_, value) in xobjects.iter() {
        let id = match value {
            Object::Reference(id) => *id,
            _ => continue,
        };
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(s)) => s,
            _ => continue,
        };
        match stream.dict.get(b"Subtype").and_then(|s| s.as_name()) {
            Ok(b"Image") => {
                images.insert(id);
            }
            Ok(b"Form") => {
                if forms.insert(id) {
                    if let Some(res) = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|r| resolve_dict(doc, r))
                    {
                        collect_from_resources(doc, res, images, forms);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Distinct image objects used by any page, including inside Form XObjects.
pub fn page_images(doc: &Document) -> BTreeSet<ObjectId> {
    let mut images = BTreeSet::new();
    let mut forms = HashSet::new();
    for (_, page_id) in doc.get_pages() {
        if let Some(resources) = page_resources(doc, page_id) {
            collect_from_resources(doc, resources, &mut images, &mut forms);
        }
    }
    images
}

/// Recompress every page image at `quality`. Failures are logged and skipped.
pub fn recompress_images(doc: &mut Document, quality: u8) -> RecompressStats {
    let mut stats = RecompressStats::default();
    for object_id in page_images(doc) {
        match recompress_image(doc, object_id, quality) {
            Ok(ImageOutcome::Replaced { before, after }) => {
                log::debug!("Image {}: {} -> {} bytes", object_id.0, before, after);
                stats.recompressed += 1;
            }
            Ok(ImageOutcome::Kept { before, after }) => {
                log::debug!(
                    "Image {}: kept {} bytes (re-encode was {})",
                    object_id.0,
                    before,
                    after
                );
                stats.kept += 1;
            }
            Err(e) => {
                log::warn!("Skipping image {}: {:#}", object_id.0, e);
                stats.skipped += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn raw_image(doc: &mut Document, w: i64, h: i64, fill: u8) -> ObjectId {
        let data: Vec<u8> = (0..w * h * 3).map(|i| (i as u8).wrapping_add(fill)).collect();
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            data,
        ))
    }

    /// Two pages sharing `shared`; the second also draws `nested` through a form.
    fn fixture() -> (Document, ObjectId, ObjectId, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let shared = raw_image(&mut doc, 64, 64, 0);
        let nested = raw_image(&mut doc, 64, 64, 7);
        let broken = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "JBIG2Decode",
            },
            vec![1, 2, 3],
        ));
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                "Resources" => dictionary! { "XObject" => dictionary! { "Im2" => nested } },
            },
            b"/Im2 Do".to_vec(),
        ));

        let page1 = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => shared, "Bad" => broken },
            },
        });
        let page2_resources = doc.add_object(dictionary! {
            "XObject" => dictionary! { "Im1" => shared, "Fm1" => form },
        });
        let page2 = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => page2_resources,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page1.into(), page2.into()],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        (doc, shared, nested, broken)
    }

    #[test]
    fn shared_and_nested_images_are_found_once() {
        let (doc, shared, nested, broken) = fixture();
        let images = page_images(&doc);
        assert_eq!(images.len(), 3);
        assert!(images.contains(&shared));
        assert!(images.contains(&nested));
        assert!(images.contains(&broken));
    }

    #[test]
    fn inherited_resources_are_used() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let img = raw_image(&mut doc, 8, 8, 0);
        let page = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page.into()],
                "Count" => 1,
                "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => img } },
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);

        assert!(page_images(&doc).contains(&img));
    }

    #[test]
    fn broken_image_is_skipped_not_fatal() {
        let (mut doc, shared, _, broken) = fixture();
        let before_broken = doc.get_object(broken).unwrap().as_stream().unwrap().content.clone();

        let stats = recompress_images(&mut doc, 85);
        assert_eq!(stats.recompressed, 2);
        assert_eq!(stats.skipped, 1);

        let shared_stream = doc.get_object(shared).unwrap().as_stream().unwrap();
        assert_eq!(
            shared_stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"DCTDecode"
        );
        let broken_stream = doc.get_object(broken).unwrap().as_stream().unwrap();
        assert_eq!(broken_stream.content, before_broken);
    }
}
