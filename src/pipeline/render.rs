//! PDF rasterisation: render single pages to [`DynamicImage`] via pdfium.
//!
//! ## Why a trait?
//!
//! The scheduler and worker only care about two operations: "how many pages"
//! and "give me page N as pixels". Putting them behind [`PageRasterizer`]
//! keeps pdfium out of every other module and lets the tests drive the whole
//! pipeline with synthetic images instead of real PDF files.
//!
//! ## Why open the PDF per call?
//!
//! Each call binds pdfium and loads the document fresh. Workers on separate
//! threads each get their own document handle, so no cross-thread document
//! sharing is needed; callers that want batching do it themselves.

use crate::config::Roi;
use crate::error::GrabError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Page-count and page-render operations over a single PDF file.
///
/// `dpi` is at least 72; 72 is the PDF native unit, so implementations scale
/// the page's point size by `dpi / 72`. `clip`, when present, restricts the
/// returned image to that normalised region of the page.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, GrabError>;

    /// Render one page (0-based index) at the given DPI.
    fn render(
        &self,
        path: &Path,
        page_index: usize,
        dpi: u32,
        clip: Option<Roi>,
    ) -> Result<DynamicImage, GrabError>;
}

/// Production rasteriser backed by the pdfium library.
pub struct PdfiumRasterizer;

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, GrabError> {
        if !path.exists() {
            return Err(GrabError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| GrabError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;
        Ok(document.pages().len() as usize)
    }

    fn render(
        &self,
        path: &Path,
        page_index: usize,
        dpi: u32,
        clip: Option<Roi>,
    ) -> Result<DynamicImage, GrabError> {
        if let Some(roi) = clip {
            roi.validate()?;
        }

        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| GrabError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if page_index >= total {
            return Err(GrabError::PageOutOfRange {
                page: page_index + 1,
                total,
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| GrabError::RasterFailed {
                page: page_index + 1,
                detail: format!("{e:?}"),
            })?;

        // Page dimensions come back in points (1/72 inch).
        let scale = dpi as f32 / 72.0;
        let width_px = (page.width().value * scale).round().max(1.0) as i32;

        let render_config = PdfRenderConfig::new().set_target_width(width_px);
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| GrabError::RasterFailed {
                    page: page_index + 1,
                    detail: format!("{e:?}"),
                })?;

        let image = bitmap.as_image();
        debug!(
            page = page_index + 1,
            width = image.width(),
            height = image.height(),
            clipped = clip.is_some(),
            "rendered page"
        );

        Ok(match clip {
            Some(roi) => crop_to_roi(&image, roi),
            None => image,
        })
    }
}

/// Crop a rendered page to the normalised ROI rectangle.
///
/// The clip is applied after rendering: the win from the ROI is a smaller
/// search space for the decoder, which dominates render time by an order of
/// magnitude on symbol-bearing sheets.
fn crop_to_roi(image: &DynamicImage, roi: Roi) -> DynamicImage {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let x = (roi.x0 * w).floor() as u32;
    let y = (roi.y0 * h).floor() as u32;
    let crop_w = (((roi.x1 - roi.x0) * w).ceil() as u32).max(1).min(image.width() - x);
    let crop_h = (((roi.y1 - roi.y0) * h).ceil() as u32).max(1).min(image.height() - y);
    image.crop_imm(x, y, crop_w, crop_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn checker(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn crop_to_roi_quarter() {
        let image = checker(200, 100);
        let roi = Roi {
            x0: 0.0,
            y0: 0.0,
            x1: 0.5,
            y1: 0.5,
        };
        let cropped = crop_to_roi(&image, roi);
        assert_eq!(cropped.width(), 100);
        assert_eq!(cropped.height(), 50);
    }

    #[test]
    fn crop_to_roi_offset_region() {
        let image = checker(100, 100);
        let roi = Roi {
            x0: 0.25,
            y0: 0.5,
            x1: 0.75,
            y1: 1.0,
        };
        let cropped = crop_to_roi(&image, roi);
        assert_eq!(cropped.width(), 50);
        assert_eq!(cropped.height(), 50);
    }

    #[test]
    fn crop_to_roi_never_exceeds_bounds() {
        // Fractional coordinates on a tiny image must stay in range.
        let image = checker(3, 3);
        let roi = Roi {
            x0: 0.6,
            y0: 0.6,
            x1: 1.0,
            y1: 1.0,
        };
        let cropped = crop_to_roi(&image, roi);
        assert!(cropped.width() >= 1 && cropped.width() <= 3);
        assert!(cropped.height() >= 1 && cropped.height() <= 3);
    }

    #[test]
    fn page_count_missing_file_is_file_not_found() {
        let err = PdfiumRasterizer
            .page_count(Path::new("/definitely/not/here.pdf"))
            .unwrap_err();
        assert!(matches!(err, GrabError::FileNotFound { .. }));
    }
}
