use crate::error::DecodeError;
use image::{DynamicImage, imageops::FilterType};
use std::path::Path;

/// RGB channels kept per pixel; alpha is always dropped.
pub const CHANNELS: usize = 3;
pub const IMAGE_WIDTH: u32 = 28;
pub const IMAGE_HEIGHT: u32 = 28;

/// Turns image resources into fixed-size `[0, 1]` pixel arrays.
///
/// Output layout is row-major interleaved RGB (`[height, width, channels]`),
/// so `pixels[(y * width + x) * 3 + c]` is channel `c` of pixel `(x, y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDecoder {
    width: u32,
    height: u32,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(IMAGE_WIDTH, IMAGE_HEIGHT)
    }
}

impl ImageDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        assert!(
            width > 0 && height > 0,
            "target size must be non-zero, got {width}x{height}"
        );
        Self { width, height }
    }

    /// Returns `(width, height)`.
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of floats produced per image.
    pub fn pixel_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Loads an image file and decodes it.
    pub fn decode_path(&self, path: &Path) -> Result<Vec<f32>, DecodeError> {
        let image = image::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode(&image)
    }

    /// Decodes an encoded image (jpeg, png, ...) already held in memory.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        let image = image::load_from_memory(bytes)?;
        self.decode(&image)
    }

    /// Strips alpha, resizes to the target size and scales every byte to `[0, 1]`.
    pub fn decode(&self, image: &DynamicImage) -> Result<Vec<f32>, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty {
                width: image.width(),
                height: image.height(),
            });
        }

        let mut rgb = image.to_rgb8();
        if rgb.dimensions() != (self.width, self.height) {
            // Lanczos keeps detail at the tiny target size where nearest-neighbour aliases.
            rgb = image::imageops::resize(&rgb, self.width, self.height, FilterType::Lanczos3);
        }
        if rgb.dimensions() != (self.width, self.height) {
            return Err(DecodeError::DimensionMismatch {
                expected: (self.width, self.height),
                actual: rgb.dimensions(),
            });
        }

        Ok(rgb
            .into_raw()
            .into_iter()
            .map(|byte| byte as f32 / 255.0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn decodes_to_fixed_length_in_unit_range() {
        let decoder = ImageDecoder::default();
        let pixels = decoder.decode(&gradient(120, 80)).unwrap();

        assert_eq!(pixels.len(), 28 * 28 * 3);
        assert_eq!(pixels.len(), decoder.pixel_len());
        assert!(pixels.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn alpha_is_dropped_and_channels_stay_interleaved() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            28,
            28,
            Rgba([255, 0, 51, 0]),
        ));
        let pixels = ImageDecoder::default().decode(&image).unwrap();

        assert_eq!(pixels.len(), 28 * 28 * 3);
        for chunk in pixels.chunks(CHANNELS) {
            assert_eq!(chunk, &[1.0, 0.0, 0.2]);
        }
    }

    #[test]
    fn keeps_source_pixels_when_already_target_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }));
        let pixels = ImageDecoder::new(2, 1).decode(&image).unwrap();

        assert_eq!(pixels, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn decoding_is_deterministic() {
        let decoder = ImageDecoder::default();
        let image = gradient(64, 48);

        let first = decoder.decode(&image).unwrap();
        let second = decoder.decode(&image).unwrap();
        let first_bits: Vec<u32> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u32> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn rejects_empty_images() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        let err = ImageDecoder::default().decode(&image).unwrap_err();
        assert!(matches!(err, DecodeError::Empty { width: 0, height: 10 }));
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = ImageDecoder::default()
            .decode_bytes(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, DecodeError::Format(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = Path::new("does/not/exist/file1.jpg");
        let err = ImageDecoder::default().decode_path(path).unwrap_err();
        match err {
            DecodeError::Open { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
