//! # Document Assembly
//!
//! Turns the ordered page images of a run into one PDF.
//!
//! ## Pipeline
//!
//! ```text
//! page_0001.png ─┐
//! page_0002.png ─┼─▶ decode ─▶ flatten on white ─▶ JPEG ─▶ PDF page (100 DPI)
//! page_NNNN.png ─┘
//! ```
//!
//! Pages are sorted by index; the caller's slice is left untouched. Every
//! page is decoded and encoded before anything is written, and the PDF goes
//! to a temporary file next to the output that is renamed into place, so a
//! failed assembly never leaves a partial document behind.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as PdfDocument, Object, Stream, dictionary};
use tracing::{debug, info};

use crate::core::page::Page;
use crate::error::{CaptureError, CaptureResult};

/// Resolution tag used to size PDF pages from pixel dimensions.
pub const OUTPUT_DPI: f32 = 100.0;

const JPEG_QUALITY: u8 = 90;
const POINTS_PER_INCH: f32 = 72.0;

/// The written output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub page_count: usize,
}

/// One page ready for the PDF writer.
struct EncodedPage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

/// Flatten an image to opaque RGB. Pixels with transparency are blended onto
/// white using their alpha as the mask; images without alpha are converted
/// directly.
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (out, px) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = px[3] as u32;
        for channel in 0..3 {
            let blended = (px[channel] as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            out[channel] = blended as u8;
        }
    }
    rgb
}

fn points(pixels: u32) -> f32 {
    pixels as f32 * POINTS_PER_INCH / OUTPUT_DPI
}

fn encode_page(page: &Page) -> CaptureResult<EncodedPage> {
    let image = image::open(page.path()).map_err(|e| {
        CaptureError::assembly_at(page.path(), format!("cannot decode page {}: {e}", page.index()))
    })?;
    let rgb = flatten_onto_white(&image);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| {
            CaptureError::assembly_at(page.path(), format!("cannot encode page {}: {e}", page.index()))
        })?;
    Ok(EncodedPage {
        width: rgb.width(),
        height: rgb.height(),
        jpeg,
    })
}

fn pdf_error(e: lopdf::Error) -> CaptureError {
    CaptureError::assembly(format!("PDF writer: {e}"))
}

fn render_pdf(pages: Vec<EncodedPage>) -> CaptureResult<Vec<u8>> {
    let count = pages.len();
    let mut doc = PdfDocument::with_version("1.4");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(count);

    for page in pages {
        let (width, height) = (points(page.width), points(page.height));
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            page.jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        height.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().map_err(pdf_error)?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Cursor::new(Vec::new());
    doc.save_to(&mut bytes)
        .map_err(|e| CaptureError::assembly(format!("PDF writer: {e}")))?;
    Ok(bytes.into_inner())
}

/// Assemble `pages` into one PDF at `output`.
///
/// Fails with `AssemblyFailure` when `pages` is empty or any page image
/// cannot be decoded; in both cases nothing is written.
pub fn assemble(pages: &[Page], output: &Path) -> CaptureResult<Document> {
    if pages.is_empty() {
        return Err(CaptureError::assembly("no pages to assemble"));
    }

    let mut ordered: Vec<&Page> = pages.iter().collect();
    ordered.sort_by_key(|page| page.index());

    info!(pages = ordered.len(), output = %output.display(), "assembling document");
    let encoded = ordered
        .iter()
        .map(|page| encode_page(page))
        .collect::<CaptureResult<Vec<_>>>()?;
    let page_count = encoded.len();
    let pdf = render_pdf(encoded)?;
    debug!(bytes = pdf.len(), "rendered PDF");

    write_atomically(output, &pdf)?;
    Ok(Document {
        path: output.to_path_buf(),
        page_count,
    })
}

fn write_atomically(output: &Path, bytes: &[u8]) -> CaptureResult<()> {
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| CaptureError::io("create output", &parent, e))?;
    file.write_all(bytes)
        .map_err(|e| CaptureError::io("write output", file.path(), e))?;
    file.persist(output)
        .map_err(|e| CaptureError::io("rename output", output, e.error))?;
    Ok(())
}
