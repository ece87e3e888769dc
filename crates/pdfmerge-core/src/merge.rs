//! PDF Merge algorithm
//!
//! Combines multiple PDFs into a single document, keeping the caller's order.

use crate::error::PdfMergeError;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against malformed page trees whose `Parent` links form a cycle
const MAX_TREE_DEPTH: usize = 64;

/// Merge multiple PDFs into one
///
/// The algorithm:
/// 1. If empty, return error
/// 2. Load every document (any unreadable input fails the whole merge)
/// 3. If single document, return it as-is
/// 4. Flatten each page tree so pages carry their inherited attributes
/// 5. For each source document after the first:
///    a. Calculate ID offset to avoid conflicts
///    b. Import all objects with remapped IDs
///    c. Append pages to the destination
/// 6. Rebuild a single flat page tree, prune, compress and return
///
/// Order is caller-authoritative: no reordering or deduplication happens.
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>, PdfMergeError> {
    if documents.is_empty() {
        return Err(PdfMergeError::OperationError("No documents to merge".into()));
    }

    let mut loaded_docs = Vec::with_capacity(documents.len());
    for (i, doc_bytes) in documents.iter().enumerate() {
        let doc = Document::load_mem(doc_bytes).map_err(|e| {
            PdfMergeError::ParseError(format!("Failed to load document {}: {}", i, e))
        })?;
        if doc.is_encrypted() {
            return Err(PdfMergeError::ParseError(format!(
                "Document {} is password protected",
                i
            )));
        }
        loaded_docs.push(doc);
    }

    // Single document - return as-is
    if let [_] = loaded_docs.as_slice() {
        return Ok(documents.into_iter().next().unwrap_or_default());
    }

    let mut loaded_docs = loaded_docs.into_iter();
    let Some(mut dest) = loaded_docs.next() else {
        return Err(PdfMergeError::OperationError("No documents to merge".into()));
    };
    let mut dest_page_refs = flatten_page_tree(&mut dest);
    let mut dest_max_id = dest.max_id;

    for mut source in loaded_docs {
        let source_pages = flatten_page_tree(&mut source);

        let id_offset = dest_max_id;

        let mut remapped_objects = BTreeMap::new();
        for (old_id, object) in source.objects.into_iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            remapped_objects.insert(new_id, remap_object_refs(object, id_offset));
        }
        dest.objects.extend(remapped_objects);

        dest_page_refs.extend(
            source_pages
                .into_iter()
                .map(|(num, generation)| (num + id_offset, generation)),
        );

        dest_max_id = (source.max_id + id_offset).max(dest_max_id);
    }

    dest.max_id = dest_max_id;
    update_page_tree(&mut dest, &dest_page_refs)?;

    // Source catalogs and page tree nodes are unreachable now
    dest.prune_objects();
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| PdfMergeError::OperationError(format!("Failed to save merged PDF: {}", e)))?;

    Ok(buffer)
}

/// Copy inherited attributes onto every page and return the pages in order
fn flatten_page_tree(doc: &mut Document) -> Vec<ObjectId> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for &page_id in &page_ids {
        let inherited: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter_map(|&key| {
                let page = doc.get_dictionary(page_id).ok()?;
                if page.has(key) {
                    return None;
                }
                inherited_attribute(doc, page_id, key).map(|value| (key, value))
            })
            .collect();

        if inherited.is_empty() {
            continue;
        }
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in inherited {
                page.set(key.to_vec(), value);
            }
        }
    }

    page_ids
}

/// Walk up the `Parent` chain looking for `key`
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                let taken = std::mem::replace(value, Object::Null);
                *value = remap_object_refs(taken, offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                let taken = std::mem::replace(value, Object::Null);
                *value = remap_object_refs(taken, offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the destination's root page node at `page_refs` and re-parent every page
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<(), PdfMergeError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfMergeError::OperationError("No Root in trailer".into()))?;

    let pages_id = doc
        .get_dictionary(catalog_id)
        .map_err(|_| PdfMergeError::OperationError("Invalid catalog".into()))?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| PdfMergeError::OperationError("No Pages in catalog".into()))?;

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages_dict)) => {
            let kids = page_refs
                .iter()
                .map(|&id| Object::Reference(id))
                .collect::<Vec<_>>();
            pages_dict.set("Kids", Object::Array(kids));
            pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
        }
        _ => {
            return Err(PdfMergeError::OperationError(
                "Invalid pages dictionary".into(),
            ))
        }
    }

    for page_id in page_refs {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{page_labels, sample_pdf};
    use lopdf::{Dictionary, Stream};
    use pretty_assertions::assert_eq;

    /// Two-level page tree whose leaves inherit MediaBox and Resources
    fn nested_tree_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let root_pages_id = doc.new_object_id();
        let inner_pages_id = doc.new_object_id();
        let catalog_id = doc.new_object_id();

        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            b"BT /F1 12 Tf 50 700 Td (Nested-Page-1) Tj ET".to_vec(),
        )));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(inner_pages_id));
        page.set("Contents", Object::Reference(content_id));
        let page_id = doc.add_object(Object::Dictionary(page));

        let mut inner = Dictionary::new();
        inner.set("Type", Object::Name(b"Pages".to_vec()));
        inner.set("Parent", Object::Reference(root_pages_id));
        inner.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        inner.set("Count", Object::Integer(1));
        doc.objects.insert(inner_pages_id, Object::Dictionary(inner));

        let mut root = Dictionary::new();
        root.set("Type", Object::Name(b"Pages".to_vec()));
        root.set("Kids", Object::Array(vec![Object::Reference(inner_pages_id)]));
        root.set("Count", Object::Integer(1));
        root.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(300),
                Object::Integer(400),
            ]),
        );
        root.set("Resources", Object::Dictionary(Dictionary::new()));
        doc.objects.insert(root_pages_id, Object::Dictionary(root));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(root_pages_id));
        doc.objects.insert(catalog_id, Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_merge_empty_fails() {
        let result = merge_documents(vec![]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("No documents to merge"));
    }

    #[test]
    fn test_merge_single_document_returns_same() {
        let pdf = sample_pdf(2, "Single");

        let result = merge_documents(vec![pdf.clone()]).unwrap();

        assert_eq!(result, pdf);
    }

    #[test]
    fn test_merge_single_invalid_document_fails() {
        let result = merge_documents(vec![b"not a pdf".to_vec()]);
        assert!(matches!(result, Err(PdfMergeError::ParseError(_))));
    }

    #[test]
    fn test_merge_two_documents_combines_pages() {
        let doc_a = sample_pdf(2, "DocA");
        let doc_b = sample_pdf(3, "DocB");

        let merged = merge_documents(vec![doc_a, doc_b]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 5, "Merged document should have 5 pages");
    }

    #[test]
    fn test_merge_preserves_page_order() {
        let first = sample_pdf(2, "First");
        let second = sample_pdf(1, "Second");
        let third = sample_pdf(2, "Third");

        let merged = merge_documents(vec![first, second, third]).unwrap();

        assert_eq!(
            page_labels(&merged),
            vec![
                "First-Page-1",
                "First-Page-2",
                "Second-Page-1",
                "Third-Page-1",
                "Third-Page-2",
            ]
        );
    }

    #[test]
    fn test_merge_follows_caller_order_for_every_permutation() {
        let fixtures = [
            ("A", sample_pdf(1, "A")),
            ("B", sample_pdf(2, "B")),
            ("C", sample_pdf(3, "C")),
        ];
        let permutations = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in permutations {
            let inputs = order.iter().map(|&i| fixtures[i].1.clone()).collect();
            let expected: Vec<String> = order
                .iter()
                .flat_map(|&i| page_labels(&fixtures[i].1))
                .collect();

            let merged = merge_documents(inputs).unwrap();

            assert_eq!(page_labels(&merged), expected, "order {:?}", order);
        }
    }

    #[test]
    fn test_merge_does_not_deduplicate() {
        let doc = sample_pdf(1, "Same");

        let merged = merge_documents(vec![doc.clone(), doc]).unwrap();

        assert_eq!(page_labels(&merged), vec!["Same-Page-1", "Same-Page-1"]);
    }

    #[test]
    fn test_merge_handles_different_sizes() {
        let doc1 = sample_pdf(10, "Large");
        let doc2 = sample_pdf(1, "Small");
        let doc3 = sample_pdf(5, "Medium");

        let merged = merge_documents(vec![doc1, doc2, doc3]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 16, "Merged document should have 16 pages");
    }

    #[test]
    fn test_merge_fails_on_invalid_input() {
        let good = sample_pdf(1, "Good");

        let result = merge_documents(vec![good, b"%PDF-1.4 garbage".to_vec()]);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("document 1"), "unexpected error: {}", err);
    }

    #[test]
    fn test_merge_flattens_inherited_attributes() {
        let nested = nested_tree_pdf();
        let flat = sample_pdf(1, "Flat");

        let merged = merge_documents(vec![flat, nested]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let nested_page = doc.get_dictionary(pages[&2]).unwrap();
        let media_box = nested_page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_i64().unwrap(), 300);
        assert!(nested_page.has(b"Resources"));
        assert_eq!(
            page_labels(&merged),
            vec!["Flat-Page-1", "Nested-Page-1"]
        );
    }

    #[test]
    fn test_merged_pages_share_one_parent() {
        let merged = merge_documents(vec![sample_pdf(2, "X"), sample_pdf(2, "Y")]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        let parents: Vec<ObjectId> = doc
            .get_pages()
            .values()
            .map(|&id| {
                doc.get_dictionary(id)
                    .unwrap()
                    .get(b"Parent")
                    .unwrap()
                    .as_reference()
                    .unwrap()
            })
            .collect();
        assert!(parents.windows(2).all(|w| w[0] == w[1]));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Property: the merged page count is the sum of the inputs
            #[test]
            fn merged_page_count_is_sum(counts in proptest::collection::vec(1u32..4, 1..5)) {
                let docs = counts
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| sample_pdf(n, &format!("D{}", i)))
                    .collect();

                let merged = merge_documents(docs).unwrap();

                let total = counts.iter().sum::<u32>();
                prop_assert_eq!(crate::get_page_count(&merged).unwrap(), total);
            }
        }
    }
}
