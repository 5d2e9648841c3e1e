//! PDF assembly: ordered page images → one A4 PDF, one image per page.
//!
//! Each image is placed on a 210 × 297 mm portrait page, scaled to fit while
//! keeping its aspect ratio, and centered. The document carries nothing but
//! the images.
//!
//! ## Embedding strategy
//!
//! | Input | Embedded as |
//! |-------|-------------|
//! | JPEG (1 or 3 components, baseline/progressive) | original bytes, `DCTDecode` |
//! | PNG | raw 8-bit samples, Flate-compressed (lossless) |
//! | anything else `image` can decode | transcoded to JPEG q85, `DCTDecode` |
//!
//! Every page is fully decoded first, even when its bytes are passed through,
//! so a truncated or corrupt download fails the assembly instead of producing
//! a PDF with a broken page.

use crate::error::AssemblyError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use std::path::Path;
use tracing::debug;

/// Page width in millimetres (A4 portrait).
pub const PAGE_WIDTH_MM: f64 = 210.0;
/// Page height in millimetres (A4 portrait).
pub const PAGE_HEIGHT_MM: f64 = 297.0;
/// Quality used when a page has to be re-encoded as JPEG.
pub const JPEG_QUALITY: u8 = 85;

const PT_PER_MM: f64 = 72.0 / 25.4;
const IMAGE_RESOURCE: &[u8] = b"Im0";

/// One downloaded page image.
#[derive(Debug, Clone)]
pub struct ImagePage {
    /// 1-indexed position within the score.
    pub index: usize,
    pub data: Vec<u8>,
}

/// Where an image lands on the page, in millimetres from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Fit a `width_px` × `height_px` image onto the page, preserving aspect ratio.
///
/// Images wider (relative to their height) than the page are clamped to the
/// page width; all others are clamped to the page height. The free axis is
/// split evenly into two margins.
pub fn fit_to_page(width_px: u32, height_px: u32) -> Placement {
    let image_aspect = f64::from(width_px) / f64::from(height_px.max(1));
    let page_aspect = PAGE_WIDTH_MM / PAGE_HEIGHT_MM;

    let (width, height) = if image_aspect > page_aspect {
        (PAGE_WIDTH_MM, PAGE_WIDTH_MM / image_aspect)
    } else {
        (PAGE_HEIGHT_MM * image_aspect, PAGE_HEIGHT_MM)
    };

    Placement {
        x: (PAGE_WIDTH_MM - width) / 2.0,
        y: (PAGE_HEIGHT_MM - height) / 2.0,
        width,
        height,
    }
}

/// Build a PDF from `pages`, in order. All-or-nothing: the first page that
/// cannot be decoded aborts the whole document.
pub fn assemble_pdf(pages: &[ImagePage]) -> Result<Vec<u8>, AssemblyError> {
    if pages.is_empty() {
        return Err(AssemblyError::NoPages);
    }

    let prepared = pages
        .iter()
        .map(prepare_page)
        .collect::<Result<Vec<_>, _>>()?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let media_box = vec![
        0.into(),
        0.into(),
        Object::Real(mm_to_pt(PAGE_WIDTH_MM)),
        Object::Real(mm_to_pt(PAGE_HEIGHT_MM)),
    ];

    let mut kids = Vec::with_capacity(prepared.len());
    for page in prepared {
        let placement = fit_to_page(page.width, page.height);
        let image_id = doc.add_object(page.into_xobject());

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(mm_to_pt(placement.width)),
                        0.into(),
                        0.into(),
                        Object::Real(mm_to_pt(placement.height)),
                        Object::Real(mm_to_pt(placement.x)),
                        Object::Real(mm_to_pt(placement.y)),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let resources = Dictionary::from_iter([(
            "XObject",
            Object::Dictionary(Dictionary::from_iter([(
                "Im0",
                Object::Reference(image_id),
            )])),
        )]);

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("MediaBox", Object::Array(media_box.clone())),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
    Ok(output)
}

/// Assemble `pages` and write the PDF to `target`.
///
/// The document is written to a hidden scratch file next to `target` and
/// renamed into place only once complete, so `target` either does not exist
/// or holds a whole PDF. Returns the page count.
pub async fn write_pdf(pages: Vec<ImagePage>, target: &Path) -> Result<usize, AssemblyError> {
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let bytes = assemble_pdf(&pages)?;
        persist_atomically(&bytes, &target)?;
        debug!(
            "Wrote {} pages ({} bytes) to {}",
            pages.len(),
            bytes.len(),
            target.display()
        );
        Ok(pages.len())
    })
    .await
    .map_err(|e| AssemblyError::Pdf(format!("Assembly task panicked: {e}")))?
}

fn persist_atomically(bytes: &[u8], target: &Path) -> Result<(), AssemblyError> {
    use std::io::Write;

    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let write_err = |source: std::io::Error| AssemblyError::Write {
        path: target.to_path_buf(),
        source,
    };

    // Dropping `scratch` on any early return deletes the partial file.
    let mut scratch = tempfile::Builder::new()
        .prefix(&scratch_prefix(target))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(write_err)?;
    scratch.write_all(bytes).map_err(write_err)?;
    scratch.as_file().sync_all().map_err(write_err)?;
    scratch.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// `.<name>.`: scratch files are hidden and name the PDF they will become.
fn scratch_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sheet.pdf".to_string());
    format!(".{name}.")
}

// ── Page preparation ─────────────────────────────────────────────────────

enum Encoding {
    /// JPEG bytes embedded verbatim.
    Dct { data: Vec<u8>, gray: bool },
    /// Uncompressed 8-bit samples; Flate-compressed by `Document::compress`.
    Raw { samples: Vec<u8>, gray: bool },
}

struct PreparedPage {
    width: u32,
    height: u32,
    encoding: Encoding,
}

impl PreparedPage {
    fn into_xobject(self) -> Stream {
        let (content, gray, filter) = match self.encoding {
            Encoding::Dct { data, gray } => (data, gray, Some("DCTDecode")),
            Encoding::Raw { samples, gray } => (samples, gray, None),
        };
        let color_space = if gray { "DeviceGray" } else { "DeviceRGB" };

        let mut dict = Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(self.width))),
            ("Height", Object::Integer(i64::from(self.height))),
            ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]);

        match filter {
            Some(f) => {
                dict.set("Filter", Object::Name(f.as_bytes().to_vec()));
                Stream::new(dict, content).with_compression(false)
            }
            None => Stream::new(dict, content),
        }
    }
}

fn prepare_page(page: &ImagePage) -> Result<PreparedPage, AssemblyError> {
    let decode_err = |detail: String| AssemblyError::Decode {
        page: page.index,
        detail,
    };

    let format = image::guess_format(&page.data).map_err(|e| decode_err(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&page.data, format)
        .map_err(|e| decode_err(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(decode_err("image has no pixels".into()));
    }

    let encoding = match format {
        ImageFormat::Jpeg => match jpeg_frame_components(&page.data) {
            Some(components @ (1 | 3)) => Encoding::Dct {
                data: page.data.clone(),
                gray: components == 1,
            },
            _ => transcode_jpeg(&decoded, page.index)?,
        },
        ImageFormat::Png => raw_samples(&decoded),
        _ => transcode_jpeg(&decoded, page.index)?,
    };

    debug!(
        "Page {}: {:?} {}x{} px, {}",
        page.index,
        format,
        width,
        height,
        match &encoding {
            Encoding::Dct { .. } => "DCT",
            Encoding::Raw { .. } => "raw",
        }
    );

    Ok(PreparedPage {
        width,
        height,
        encoding,
    })
}

fn is_grayscale(img: &DynamicImage) -> bool {
    let color = img.color();
    !color.has_color() && !color.has_alpha()
}

fn raw_samples(img: &DynamicImage) -> Encoding {
    if is_grayscale(img) {
        Encoding::Raw {
            samples: img.to_luma8().into_raw(),
            gray: true,
        }
    } else {
        Encoding::Raw {
            samples: flatten_rgb(img),
            gray: false,
        }
    }
}

fn transcode_jpeg(img: &DynamicImage, page: usize) -> Result<Encoding, AssemblyError> {
    let gray = is_grayscale(img);
    let (samples, color) = if gray {
        (img.to_luma8().into_raw(), ExtendedColorType::L8)
    } else {
        (flatten_rgb(img), ExtendedColorType::Rgb8)
    };

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode(&samples, img.width(), img.height(), color)
        .map_err(|e| AssemblyError::Encode {
            page,
            detail: e.to_string(),
        })?;
    Ok(Encoding::Dct { data, gray })
}

/// RGB samples with any alpha channel composited over white.
fn flatten_rgb(img: &DynamicImage) -> Vec<u8> {
    if !img.color().has_alpha() {
        return img.to_rgb8().into_raw();
    }
    img.to_rgba8()
        .pixels()
        .flat_map(|p| {
            let [r, g, b, a] = p.0;
            let a = u16::from(a);
            let over_white = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
            [over_white(r), over_white(g), over_white(b)]
        })
        .collect()
}

/// Number of colour components declared by a JPEG's frame header, if the
/// frame is baseline, extended or progressive Huffman-coded (SOF0–SOF2).
fn jpeg_frame_components(data: &[u8]) -> Option<u8> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Fill byte before a marker.
            0xFF => {
                i += 1;
                continue;
            }
            // Standalone markers without a length field.
            0x01 | 0xD0..=0xD8 => {
                i += 2;
                continue;
            }
            0xC0..=0xC2 => return data.get(i + 9).copied(),
            // Other SOF variants (lossless, arithmetic) are not DCTDecode-safe.
            0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => return None,
            // Start of scan before any frame header.
            0xDA | 0xD9 => return None,
            _ => {}
        }
        let len = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        if len < 2 {
            return None;
        }
        i += 2 + len;
    }
    None
}

fn mm_to_pt(mm: f64) -> f32 {
    (mm * PT_PER_MM) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn rgb(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])))
    }

    fn page(index: usize, data: Vec<u8>) -> ImagePage {
        ImagePage { index, data }
    }

    // ── Layout ──────────────────────────────────────────────────────────

    #[test]
    fn landscape_image_is_clamped_to_page_width() {
        let p = fit_to_page(800, 600);
        assert!(approx(p.width, 210.0));
        assert!(approx(p.height, 157.5));
        assert!(approx(p.x, 0.0));
        assert!(approx(p.y, 69.75));
    }

    #[test]
    fn mildly_portrait_image_above_page_aspect_is_width_clamped() {
        // 0.75 > 210/297 ≈ 0.707
        let p = fit_to_page(600, 800);
        assert!(approx(p.width, 210.0));
        assert!(approx(p.height, 280.0));
        assert!(approx(p.y, 8.5));
        assert!(p.height <= PAGE_HEIGHT_MM);
    }

    #[test]
    fn tall_image_below_page_aspect_is_height_clamped() {
        let p = fit_to_page(500, 1000);
        assert!(approx(p.height, 297.0));
        assert!(approx(p.width, 148.5));
        assert!(approx(p.x, 30.75));
        assert!(approx(p.y, 0.0));
    }

    #[test]
    fn page_aspect_image_fills_page() {
        let p = fit_to_page(210, 297);
        assert!(approx(p.width, 210.0));
        assert!(approx(p.height, 297.0));
    }

    // ── JPEG header parsing ─────────────────────────────────────────────

    #[test]
    fn reads_jpeg_component_count() {
        let color = encode(rgb(8, 8), ImageFormat::Jpeg);
        assert_eq!(jpeg_frame_components(&color), Some(3));

        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([90]))),
            ImageFormat::Jpeg,
        );
        assert_eq!(jpeg_frame_components(&gray), Some(1));
    }

    #[test]
    fn rejects_non_jpeg_header() {
        assert_eq!(jpeg_frame_components(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(jpeg_frame_components(&[0xFF, 0xD8]), None);
    }

    // ── Assembly ────────────────────────────────────────────────────────

    fn image_stream<'a>(doc: &'a Document, page_id: lopdf::ObjectId) -> &'a Stream {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_ref = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        doc.get_object(image_ref).unwrap().as_stream().unwrap()
    }

    fn placement_operands(doc: &Document, page_id: lopdf::ObjectId) -> Vec<f32> {
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .expect("cm operator present");
        cm.operands.iter().map(|o| o.as_float().unwrap()).collect()
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(assemble_pdf(&[]), Err(AssemblyError::NoPages)));
    }

    #[test]
    fn jpeg_is_embedded_without_reencoding() {
        let jpeg = encode(rgb(800, 600), ImageFormat::Jpeg);
        let pdf = assemble_pdf(&[page(1, jpeg.clone())]).unwrap();

        let doc = Document::load_mem(&pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = pages[&1];

        let stream = image_stream(&doc, page_id);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(stream.content, jpeg);

        let ops = placement_operands(&doc, page_id);
        let pt = |mm: f64| (mm * PT_PER_MM) as f32;
        assert!((ops[0] - pt(210.0)).abs() < 0.01);
        assert!((ops[3] - pt(157.5)).abs() < 0.01);
        assert!((ops[4] - 0.0).abs() < 0.01);
        assert!((ops[5] - pt(69.75)).abs() < 0.01);
    }

    #[test]
    fn png_is_embedded_losslessly() {
        let png = encode(rgb(40, 80), ImageFormat::Png);
        let pdf = assemble_pdf(&[page(1, png)]).unwrap();

        let doc = Document::load_mem(&pdf).unwrap();
        let page_id = doc.get_pages()[&1];
        let stream = image_stream(&doc, page_id);
        let filter = stream.dict.get(b"Filter").ok().and_then(|f| f.as_name().ok());
        assert_ne!(filter, Some(&b"DCTDecode"[..]));
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB");
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 40);
    }

    #[test]
    fn grayscale_png_uses_device_gray() {
        let png = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([128]))),
            ImageFormat::Png,
        );
        let pdf = assemble_pdf(&[page(1, png)]).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let stream = image_stream(&doc, doc.get_pages()[&1]);
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceGray");
    }

    #[test]
    fn other_formats_are_transcoded_to_jpeg() {
        let bmp = encode(rgb(30, 20), ImageFormat::Bmp);
        let pdf = assemble_pdf(&[page(1, bmp)]).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let stream = image_stream(&doc, doc.get_pages()[&1]);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(image::guess_format(&stream.content).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn pages_keep_input_order() {
        let pages = vec![
            page(1, encode(rgb(800, 600), ImageFormat::Jpeg)),
            page(2, encode(rgb(500, 1000), ImageFormat::Png)),
            page(3, encode(rgb(300, 300), ImageFormat::Jpeg)),
        ];
        let pdf = assemble_pdf(&pages).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let widths: Vec<i64> = doc
            .get_pages()
            .values()
            .map(|&id| image_stream(&doc, id).dict.get(b"Width").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(widths, vec![800, 500, 300]);
    }

    #[test]
    fn undecodable_page_aborts_assembly() {
        let pages = vec![
            page(1, encode(rgb(10, 10), ImageFormat::Jpeg)),
            page(2, b"<html>login required</html>".to_vec()),
        ];
        let err = assemble_pdf(&pages).unwrap_err();
        assert!(matches!(err, AssemblyError::Decode { page: 2, .. }), "got {err:?}");
    }

    #[test]
    fn truncated_jpeg_aborts_assembly() {
        let mut jpeg = encode(rgb(64, 64), ImageFormat::Jpeg);
        jpeg.truncate(20);
        assert!(assemble_pdf(&[page(1, jpeg)]).is_err());
    }

    #[test]
    fn alpha_is_composited_over_white() {
        let transparent =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        assert!(flatten_rgb(&transparent).iter().all(|&c| c == 255));

        let opaque = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255])));
        assert_eq!(flatten_rgb(&opaque), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn write_pdf_leaves_only_the_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("score.pdf");

        let n = write_pdf(vec![page(1, encode(rgb(20, 20), ImageFormat::Png))], &target)
            .await
            .unwrap();

        assert_eq!(n, 1);
        let bytes = std::fs::read(&target).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "scratch file must not survive");
    }

    #[test]
    fn scratch_file_is_hidden_and_named_after_the_target() {
        let prefix = scratch_prefix(Path::new("/lib/Creator/[吉他谱] Song.pdf"));
        assert_eq!(prefix, ".[吉他谱] Song.pdf.");

        let dir = tempfile::TempDir::new().unwrap();
        let scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(dir.path())
            .unwrap();
        let name = scratch.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".[吉他谱] Song.pdf."), "{name}");
        assert!(name.ends_with(".part"), "{name}");
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("broken.pdf");

        let result = write_pdf(vec![page(1, b"not an image".to_vec())], &target).await;

        assert!(result.is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
