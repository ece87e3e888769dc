//! Fixture builders shared by the workspace's tests
//!
//! Enabled for this crate's own tests and, through the `fixtures` feature,
//! for dependants' dev-dependencies.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, Stream};

/// Create a simple PDF with N pages whose content streams carry `{label}-Page-{n}`
pub fn sample_pdf(num_pages: u32, label: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let catalog_id = doc.new_object_id();

    let mut page_ids = Vec::new();

    for page_num in 0..num_pages {
        let content = format!(
            "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
            label,
            page_num + 1
        );
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        // 8.5 x 11 inches at 72 DPI
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );

        let page_id = doc.add_object(Object::Dictionary(page_dict));
        page_ids.push(Object::Reference(page_id));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(num_pages as i64));
    pages_dict.set("Kids", Object::Array(page_ids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog_dict.set("Pages", Object::Reference(pages_id));
    doc.objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .expect("in-memory save of a fixture PDF cannot fail");
    buffer
}

/// Labels of every page in document order, as written by [`sample_pdf`]
///
/// Panics if `bytes` is not a loadable PDF.
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("fixture should be a valid PDF");
    document_page_labels(&doc)
}

/// Same as [`page_labels`] for an already loaded document
pub fn document_page_labels(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = doc.get_page_content(page_id).unwrap_or_default();
            let text = String::from_utf8_lossy(&content);
            match (text.find('('), text.find(')')) {
                (Some(start), Some(end)) if start < end => text[start + 1..end].to_string(),
                _ => String::new(),
            }
        })
        .collect()
}

/// Width, height and decoded RGB bytes of the first page's `Im0` image
pub fn embedded_image(bytes: &[u8]) -> Option<(u32, u32, Vec<u8>)> {
    let doc = Document::load_mem(bytes).ok()?;
    let page_id = *doc.get_pages().values().next()?;
    let resources = doc
        .get_dictionary(page_id)
        .ok()?
        .get(b"Resources")
        .ok()?
        .as_dict()
        .ok()?;
    let image_id = resources
        .get(b"XObject")
        .ok()?
        .as_dict()
        .ok()?
        .get(b"Im0")
        .ok()?
        .as_reference()
        .ok()?;
    let stream = doc.get_object(image_id).ok()?.as_stream().ok()?;
    let width = stream.dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = stream.dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    // lopdf refuses to decompress image streams, so inflate the raw bytes here
    let mut pixels = Vec::new();
    ZlibDecoder::new(&stream.content[..])
        .read_to_end(&mut pixels)
        .ok()?;
    Some((width, height, pixels))
}
