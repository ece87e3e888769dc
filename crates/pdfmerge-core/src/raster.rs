//! Image to PDF conversion
//!
//! Wraps a decoded JPEG/PNG into a single-page PDF. Transparent pixels are
//! composited onto white so the page is always opaque, and the pixel data is
//! stored losslessly with FlateDecode.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, Rgba, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::PdfMergeError;

/// Resolution used to size the page: 100 dpi keeps prints legible
pub const DEFAULT_DPI: f32 = 100.0;

/// Convert encoded image bytes into a one-page PDF sized at `dpi`
pub fn image_to_pdf(bytes: &[u8], dpi: f32) -> Result<Vec<u8>, PdfMergeError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PdfMergeError::ImageError(e.to_string()))?;
    let rgb = flatten_onto_white(&decoded);
    let (width_px, height_px) = rgb.dimensions();
    if width_px == 0 || height_px == 0 {
        return Err(PdfMergeError::ImageError("Image has no pixels".into()));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(rgb.as_raw())
        .map_err(|e| PdfMergeError::OperationError(format!("Compressing pixels: {}", e)))?;
    let pixels = encoder
        .finish()
        .map_err(|e| PdfMergeError::OperationError(format!("Compressing pixels: {}", e)))?;

    let width_pt = width_px as f32 * 72.0 / dpi;
    let height_pt = height_px as f32 * 72.0 / dpi;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image_dict = Dictionary::new();
    image_dict.set("Type", Object::Name(b"XObject".to_vec()));
    image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
    image_dict.set("Width", Object::Integer(width_px as i64));
    image_dict.set("Height", Object::Integer(height_px as i64));
    image_dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    image_dict.set("BitsPerComponent", Object::Integer(8));
    image_dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    let image_id = doc.add_object(Object::Stream(Stream::new(image_dict, pixels)));

    // Scale the unit square to the page and paint the image over it
    let content = format!(
        "q {:.4} 0 0 {:.4} 0 0 cm /Im0 Do Q",
        width_pt, height_pt
    );
    let content_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        content.into_bytes(),
    )));

    let mut xobjects = Dictionary::new();
    xobjects.set("Im0", Object::Reference(image_id));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(pages_id));
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width_pt),
            Object::Real(height_pt),
        ]),
    );
    let page_id = doc.add_object(Object::Dictionary(page_dict));

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages_dict.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog_dict.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog_dict));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PdfMergeError::OperationError(format!("Failed to save image PDF: {}", e)))?;

    Ok(buffer)
}

/// Drop the alpha channel by compositing every pixel onto opaque white
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        image::Rgb([blend(r, a), blend(g, a), blend(b, a)])
    })
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let channel = channel as u32;
    let alpha = alpha as u32;
    ((channel * alpha + 255 * (255 - alpha) + 127) / 255) as u8
}
