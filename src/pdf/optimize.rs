//! Structural clean-up applied before every PDF save.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{CompressError, Result};
use crate::workspace::{Artifact, Scratch};

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype").and_then(|s| s.as_name()), Ok(b"Image"))
}

fn remap_dict(dict: &mut Dictionary, remap: &HashMap<ObjectId, ObjectId>) {
    for (_, value) in dict.iter_mut() {
        remap_object(value, remap);
    }
}

fn remap_object(obj: &mut Object, remap: &HashMap<ObjectId, ObjectId>) {
    match obj {
        Object::Reference(id) => {
            if let Some(target) = remap.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                remap_object(item, remap);
            }
        }
        Object::Dictionary(dict) => remap_dict(dict, remap),
        Object::Stream(stream) => remap_dict(&mut stream.dict, remap),
        _ => {}
    }
}

/// Point every reference to a byte-identical image at one copy.
///
/// Returns the number of duplicates redirected; they become unreachable and
/// are removed by the following prune.
pub fn dedup_images(doc: &mut Document) -> usize {
    let mut buckets: HashMap<(u64, String), Vec<ObjectId>> = HashMap::new();
    let mut remap = HashMap::new();

    for (id, object) in doc.objects.iter() {
        let stream = match object {
            Object::Stream(s) if is_image(&s.dict) => s,
            _ => continue,
        };
        let mut hasher = DefaultHasher::new();
        stream.content.hash(&mut hasher);
        let key = (hasher.finish(), format!("{:?}", stream.dict));
        let bucket = buckets.entry(key).or_default();
        let original = bucket.iter().copied().find(|other| {
            matches!(doc.objects.get(other), Some(Object::Stream(s)) if s.content == stream.content)
        });
        match original {
            Some(original) => {
                remap.insert(*id, original);
            }
            None => bucket.push(*id),
        }
    }

    if !remap.is_empty() {
        for object in doc.objects.values_mut() {
            remap_object(object, &remap);
        }
        remap_dict(&mut doc.trailer, &remap);
    }
    remap.len()
}

/// Deduplicate, drop empty streams and unreachable objects, renumber and
/// Flate-compress.
pub fn optimize(doc: &mut Document) {
    let duplicates = dedup_images(doc);
    let empty = doc.delete_zero_length_streams();
    let pruned = doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    log::debug!(
        "Optimized document: {} duplicate images, {} empty streams, {} unused objects removed",
        duplicates,
        empty.len(),
        pruned.len()
    );
}

/// Optimize `doc` and save it as a new artifact in `scratch`.
pub fn save_optimized(doc: &mut Document, scratch: &Scratch, label: &str) -> Result<Artifact> {
    optimize(doc);
    scratch.write_with(label, |w| {
        doc.save_to(w)
            .map_err(|e| CompressError::Encode(format!("Failed to save PDF: {:?}", e)))
    })
}
