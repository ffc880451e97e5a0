//! Representative colour of an image, and the solid canvas drawn from it.

use crate::error::{PipelineError, PipelineResult, ensure_input};
use image::{ImageFormat, ImageReader, Rgb, RgbImage, RgbaImage};
use std::path::Path;

pub trait Palette {
    /// One colour that stands for the whole image. `quality` is the pixel
    /// sampling stride: 1 looks at every pixel, higher is faster and coarser.
    fn representative_color(&self, image: &Path, quality: u32) -> PipelineResult<[u8; 3]>;
}

/// Histogram palette over 5-bit-per-channel buckets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePalette;

impl Palette for ImagePalette {
    fn representative_color(&self, image: &Path, quality: u32) -> PipelineResult<[u8; 3]> {
        ensure_input(image)?;
        let decoded = ImageReader::open(image)
            .map_err(|e| PipelineError::io(image, e))?
            .with_guessed_format()
            .map_err(|e| PipelineError::io(image, e))?
            .decode()
            .map_err(|e| PipelineError::Decode(format!("{}: {e}", image.display())))?;
        dominant_color(&decoded.to_rgba8(), quality).ok_or_else(|| {
            PipelineError::Decode(format!("'{}' has no pixels to sample", image.display()))
        })
    }
}

/// Whether the image decoder can read `path` without the engine's help.
pub fn is_still_image(path: &Path) -> bool {
    matches!(
        ImageFormat::from_path(path),
        Ok(ImageFormat::Gif | ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)
    )
}

const BUCKET_BITS: u32 = 5;

pub fn dominant_color(image: &RgbaImage, quality: u32) -> Option<[u8; 3]> {
    let step = quality.max(1) as usize;
    let buckets = 1usize << (3 * BUCKET_BITS);
    let mut counts = vec![0u64; buckets];
    let mut sums = vec![[0u64; 3]; buckets];

    let mut tally = |skip_pale: bool| {
        let mut seen = 0u64;
        for px in image.pixels().step_by(step) {
            let [r, g, b, a] = px.0;
            if skip_pale && (a < 125 || (r > 250 && g > 250 && b > 250)) {
                continue;
            }
            let shift = 8 - BUCKET_BITS;
            let idx = ((r as usize >> shift) << (2 * BUCKET_BITS))
                | ((g as usize >> shift) << BUCKET_BITS)
                | (b as usize >> shift);
            counts[idx] += 1;
            for (sum, v) in sums[idx].iter_mut().zip([r, g, b]) {
                *sum += v as u64;
            }
            seen += 1;
        }
        seen
    };

    // Fully transparent or white images still get a colour.
    if tally(true) == 0 && tally(false) == 0 {
        return None;
    }

    let mut best = 0;
    for (idx, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = idx;
        }
    }
    let n = counts[best];
    let [r, g, b] = sums[best];
    Some([(r / n) as u8, (g / n) as u8, (b / n) as u8])
}

/// Writes a `width`×`height` PNG filled with `color`.
pub fn write_canvas(path: &Path, width: u32, height: u32, color: [u8; 3]) -> PipelineResult<()> {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => PipelineError::io(path, io),
            other => PipelineError::invalid(format!("cannot write canvas: {other}")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn majority_colour_wins() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([200, 40, 40, 255]));
        for x in 0..3 {
            img.put_pixel(x, 0, Rgba([10, 10, 200, 255]));
        }
        assert_eq!(dominant_color(&img, 1), Some([200, 40, 40]));
        assert_eq!(dominant_color(&img, 10), Some([200, 40, 40]));
    }

    #[test]
    fn ignores_white_and_transparent_when_possible() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, Rgba([0, 120, 0, 255]));
        img.put_pixel(1, 0, Rgba([90, 0, 0, 0]));
        assert_eq!(dominant_color(&img, 1), Some([0, 120, 0]));
    }

    #[test]
    fn all_white_image_is_white() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 255]));
        assert_eq!(dominant_color(&img, 1), Some([255, 255, 255]));
    }

    #[test]
    fn canvas_round_trips_through_palette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        write_canvas(&path, 64, 36, [12, 200, 99]).unwrap();
        let color = ImagePalette.representative_color(&path, 10).unwrap();
        assert_eq!(color, [12, 200, 99]);
    }

    #[test]
    fn recognises_still_images() {
        assert!(is_still_image(Path::new("eyes.gif")));
        assert!(is_still_image(Path::new("cover.PNG")));
        assert!(!is_still_image(Path::new("clip.mp4")));
    }
}
