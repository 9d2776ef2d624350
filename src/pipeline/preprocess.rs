//! Image preprocessing for the retry decode pass.
//!
//! Paper scans suffer from uneven lighting and low contrast; a global
//! threshold washes out the symbol on one half of the sheet while clipping
//! it on the other. Adaptive thresholding compares each pixel against the
//! mean of its own neighbourhood instead, which keeps the symbol's modules
//! crisp regardless of the illumination gradient.
//!
//! The pipeline is grayscale → Gaussian neighbourhood mean → binary: a pixel
//! becomes white when it is brighter than its local mean minus
//! [`ADAPTIVE_OFFSET`]. Block size and offset are tuned for paper scans at
//! 300 DPI.

use image::{imageops, DynamicImage, GrayImage, Luma};

/// Side of the square Gaussian neighbourhood used as the local mean.
pub const ADAPTIVE_BLOCK_SIZE: u32 = 51;
/// Constant subtracted from the local mean before comparison.
pub const ADAPTIVE_OFFSET: i16 = 15;

/// Binarise a page image for the second decode attempt.
///
/// Output pixels are strictly 0 or 255.
pub fn binarize(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();

    // Gaussian blur as the neighbourhood mean; sigma derived from the block
    // size the same way OpenCV derives it for an odd kernel.
    let sigma = 0.3 * ((ADAPTIVE_BLOCK_SIZE - 1) as f32 * 0.5 - 1.0) + 0.8;
    let local_mean = imageops::blur(&gray, sigma);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as i16 - ADAPTIVE_OFFSET;
        let value = if (pixel[0] as i16) > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn output_is_strictly_binary() {
        let input = DynamicImage::ImageRgb8(RgbImage::from_fn(80, 60, |x, y| {
            let v = ((x * 3 + y * 5) % 256) as u8;
            image::Rgb([v, v, v])
        }));
        let binary = binarize(&input);
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn dimensions_are_preserved() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(123, 77));
        let binary = binarize(&input);
        assert_eq!(binary.dimensions(), (123, 77));
    }

    #[test]
    fn uniform_white_stays_white() {
        // A flat bright field sits above its own mean minus the offset.
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            64,
            64,
            image::Rgb([240, 240, 240]),
        ));
        let binary = binarize(&input);
        assert!(binary.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn small_dark_features_survive_on_bright_background() {
        // A module-sized dark square keeps a bright neighbourhood mean, so
        // its pixels land below the threshold and stay black. Interiors of
        // large blobs wash out white; inherent to adaptive thresholding.
        let input = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 200, |x, y| {
            if (95..105).contains(&x) && (95..105).contains(&y) {
                image::Rgb([10, 10, 10])
            } else {
                image::Rgb([250, 250, 250])
            }
        }));
        let binary = binarize(&input);
        assert_eq!(binary.get_pixel(100, 100)[0], 0);
        assert_eq!(binary.get_pixel(10, 10)[0], 255);
    }
}
