//! Image to tensor conversion.
//!
//! The transform here must stay numerically identical to the one the model was
//! trained with: stretch (no aspect ratio preservation) to the input size with
//! bilinear filtering, scale to `[0, 1]`, lay out channel-first and standardise
//! per channel.

use crate::error::{ConfigError, PreprocessError};
use image::{DynamicImage, ImageFormat, imageops::FilterType};

/// Model input width in pixels.
pub const INPUT_WIDTH: u32 = 224;
/// Model input height in pixels.
pub const INPUT_HEIGHT: u32 = 224;
/// Number of colour channels fed to the model.
pub const INPUT_CHANNELS: usize = 3;

/// ImageNet per-channel mean (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel standard deviation (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Encoded image bytes plus the MIME type the caller declared for them.
#[derive(Debug, Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    mime: Option<String>,
}

impl RawImage {
    pub fn new(bytes: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: Some(mime.into()),
        }
    }

    /// Image whose format is sniffed from its content.
    pub fn sniffed(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// Decoder selected by the declared MIME type, if it names one we know.
    fn declared_format(&self) -> Option<ImageFormat> {
        self.mime.as_deref().and_then(ImageFormat::from_mime_type)
    }
}

/// Flat CHW float buffer.
///
/// Only [`TensorBuilder`] constructs tensors, so the length always equals
/// `channels * height * width` and every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: [usize; 3],
}

impl Tensor {
    /// `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Shape with a leading batch dimension of one, as most runtimes expect it.
    pub fn batched_shape(&self) -> [usize; 4] {
        let [c, h, w] = self.shape;
        [1, c, h, w]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The contiguous plane of channel `c`.
    pub fn channel(&self, c: usize) -> Option<&[f32]> {
        let [channels, h, w] = self.shape;
        if c >= channels {
            return None;
        }
        let plane = h * w;
        Some(&self.data[c * plane..(c + 1) * plane])
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Resize target and standardisation constants.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: INPUT_WIDTH,
            height: INPUT_HEIGHT,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessConfig {
    pub fn new(width: u32, height: u32, mean: [f32; 3], std: [f32; 3]) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidPreprocess(format!(
                "target size must be non-zero, got {width}x{height}"
            )));
        }
        if let Some(m) = mean.iter().find(|m| !m.is_finite()) {
            return Err(ConfigError::InvalidPreprocess(format!(
                "mean must be finite, got {m}"
            )));
        }
        for (i, &s) in std.iter().enumerate() {
            if !(s.is_finite() && s > 0.0) {
                return Err(ConfigError::InvalidPreprocess(format!(
                    "std at index {i} must be finite and greater than 0, got {s}"
                )));
            }
        }
        Ok(Self {
            width,
            height,
            mean,
            std,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tensor_len(&self) -> usize {
        INPUT_CHANNELS * self.width as usize * self.height as usize
    }
}

/// Decodes images and produces normalised CHW tensors.
#[derive(Debug, Clone, Default)]
pub struct TensorBuilder {
    config: PreprocessConfig,
}

impl TensorBuilder {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Decode, stretch-resize and standardise `image`.
    pub fn build(&self, image: &RawImage) -> Result<Tensor, PreprocessError> {
        let decoded = decode(image)?;
        self.build_from_decoded(&decoded)
    }

    /// Tensor from an already decoded image. Alpha, if any, is discarded.
    pub fn build_from_decoded(&self, image: &DynamicImage) -> Result<Tensor, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::InvalidDimensions {
                width: image.width(),
                height: image.height(),
            });
        }

        let PreprocessConfig {
            width,
            height,
            mean,
            std,
        } = self.config;

        let rgb = image.to_rgb8();
        // Exact target size on purpose: the model was trained on stretched inputs.
        let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

        let plane = width as usize * height as usize;
        let mut data = vec![0.0f32; INPUT_CHANNELS * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..INPUT_CHANNELS {
                let value = pixel[c] as f32 / 255.0;
                data[c * plane + i] = (value - mean[c]) / std[c];
            }
        }
        debug_assert!(data.iter().all(|v| v.is_finite()));

        Ok(Tensor {
            data,
            shape: [INPUT_CHANNELS, height as usize, width as usize],
        })
    }
}

fn decode(image: &RawImage) -> Result<DynamicImage, PreprocessError> {
    let mime = image.mime().unwrap_or("unknown").to_string();
    let bytes = image.bytes();

    let decoded = match image.declared_format() {
        Some(format) => image::load_from_memory_with_format(bytes, format).or_else(|declared| {
            // The declared type is only a hint. If sniffing fails too, the
            // declared decoder's error is the one worth reporting.
            log::debug!("declared format {format:?} failed ({declared}), sniffing content");
            image::load_from_memory(bytes).map_err(|sniffed| {
                log::debug!("sniffing failed as well ({sniffed})");
                declared
            })
        }),
        None => image::load_from_memory(bytes),
    };

    decoded.map_err(|source| PreprocessError::DecodeFailed { mime, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> RawImage {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        RawImage::new(png_bytes(DynamicImage::ImageRgb8(img)), "image/png")
    }

    fn expected(value: u8, c: usize) -> f32 {
        (value as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    }

    #[test]
    fn tensor_has_model_input_length_and_finite_values() {
        let tensor = TensorBuilder::default()
            .build(&solid_png(31, 17, [10, 200, 90]))
            .unwrap();
        assert_eq!(tensor.len(), 3 * 224 * 224);
        assert_eq!(tensor.shape(), [3, 224, 224]);
        assert_eq!(tensor.batched_shape(), [1, 3, 224, 224]);
        assert!(tensor.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn channels_are_planar_and_standardised() {
        let tensor = TensorBuilder::default()
            .build(&solid_png(8, 8, [255, 0, 128]))
            .unwrap();

        for (c, value) in [255u8, 0, 128].into_iter().enumerate() {
            let plane = tensor.channel(c).unwrap();
            assert_eq!(plane.len(), 224 * 224);
            for v in plane {
                assert!((v - expected(value, c)).abs() < 1e-5, "channel {c}: {v}");
            }
        }
        assert!(tensor.channel(3).is_none());
    }

    #[test]
    fn resize_stretches_without_keeping_aspect_ratio() {
        // Left half red, right half blue on a wide, short image. Stretched, the
        // bottom-left corner is still red; a letterboxed resize would pad it.
        let mut img = RgbImage::new(400, 50);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 200 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }
        let raw = RawImage::new(png_bytes(DynamicImage::ImageRgb8(img)), "image/png");
        let tensor = TensorBuilder::default().build(&raw).unwrap();

        let red = tensor.channel(0).unwrap();
        let top_left = red[0];
        let bottom_left = red[223 * 224];
        let top_right = red[223];
        assert!((top_left - expected(255, 0)).abs() < 1e-5);
        assert!((bottom_left - expected(255, 0)).abs() < 1e-5);
        assert!((top_right - expected(0, 0)).abs() < 1e-5);
    }

    #[test]
    fn alpha_is_discarded() {
        let img = RgbaImage::from_pixel(5, 5, Rgba([20, 40, 60, 0]));
        let raw = RawImage::new(png_bytes(DynamicImage::ImageRgba8(img)), "image/png");
        let tensor = TensorBuilder::default().build(&raw).unwrap();
        assert!((tensor.channel(0).unwrap()[0] - expected(20, 0)).abs() < 1e-5);
        assert!((tensor.channel(2).unwrap()[0] - expected(60, 2)).abs() < 1e-5);
    }

    #[test]
    fn mislabelled_mime_falls_back_to_sniffing() {
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let raw = RawImage::new(png_bytes(DynamicImage::ImageRgb8(img)), "image/jpeg");
        assert!(TensorBuilder::default().build(&raw).is_ok());
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        let raw = RawImage::new(b"definitely not an image".to_vec(), "image/png");
        let err = TensorBuilder::default().build(&raw).unwrap_err();
        assert!(matches!(err, PreprocessError::DecodeFailed { ref mime, .. } if mime == "image/png"));

        let empty = RawImage::sniffed(Vec::new());
        assert!(matches!(
            TensorBuilder::default().build(&empty),
            Err(PreprocessError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn declared_decoder_error_survives_failed_sniffing() {
        let raw = RawImage::new(b"definitely not an image".to_vec(), "image/png");
        let Err(PreprocessError::DecodeFailed { source, .. }) = TensorBuilder::default().build(&raw)
        else {
            panic!("corrupt bytes must fail to decode");
        };
        assert!(
            matches!(
                source,
                image::ImageError::Decoding(ref e)
                    if matches!(e.format_hint(), image::error::ImageFormatHint::Exact(ImageFormat::Png))
            ),
            "{source:?}"
        );
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let builder = TensorBuilder::default();
        for (w, h) in [(0, 0), (0, 7), (7, 0)] {
            let empty = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            assert!(matches!(
                builder.build_from_decoded(&empty),
                Err(PreprocessError::InvalidDimensions { width, height }) if width == w && height == h
            ));
        }
    }

    #[test]
    fn same_image_gives_identical_tensor() {
        let raw = solid_png(13, 29, [77, 88, 99]);
        let builder = TensorBuilder::default();
        assert_eq!(builder.build(&raw).unwrap(), builder.build(&raw).unwrap());
    }

    #[test]
    fn custom_config_changes_shape() {
        let config = PreprocessConfig::new(32, 16, IMAGENET_MEAN, IMAGENET_STD).unwrap();
        assert_eq!(config.tensor_len(), 3 * 32 * 16);
        let tensor = TensorBuilder::new(config)
            .build(&solid_png(3, 3, [0, 0, 0]))
            .unwrap();
        assert_eq!(tensor.shape(), [3, 16, 32]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(PreprocessConfig::new(0, 224, IMAGENET_MEAN, IMAGENET_STD).is_err());
        assert!(PreprocessConfig::new(224, 224, IMAGENET_MEAN, [0.2, 0.0, 0.2]).is_err());
        assert!(PreprocessConfig::new(224, 224, [f32::NAN, 0.0, 0.0], IMAGENET_STD).is_err());
    }
}
