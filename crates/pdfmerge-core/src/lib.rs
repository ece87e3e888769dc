//! PDF assembly operations
//!
//! Byte-level building blocks for the merge workspace, all on top of lopdf:
//! - `merge_documents`: concatenate PDFs in caller order
//! - `image_to_pdf`: wrap a JPEG/PNG into a single page
//! - `protect_document` / `unlock_document`: Standard Security Handler (RC4, 128-bit)
//! - `get_page_count` / `page_count_or_zero`: page counting

pub mod error;
pub mod merge;
pub mod protect;
pub mod raster;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use error::PdfMergeError;
pub use merge::merge_documents;
pub use protect::{is_protected, protect_document, unlock_document};
pub use raster::{image_to_pdf, DEFAULT_DPI};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfMergeError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| PdfMergeError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

/// Best-effort page count: an unreadable document counts as zero pages
pub fn page_count_or_zero(bytes: &[u8]) -> u32 {
    get_page_count(bytes).unwrap_or(0)
}
