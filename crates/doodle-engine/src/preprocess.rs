use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use doodle_contracts::validation::{validate_image_data, IMAGE_DATA_FIELD};
use doodle_contracts::{FieldError, ValidationError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

pub const DEFAULT_MAX_IMAGE_DIM: u32 = 800;
const JPEG_QUALITY: u8 = 85;
const DEFAULT_MIME: &str = "image/png";

/// Decoded drawing ready to be attached to an inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawingImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl DrawingImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Splits a `data:<mime>;base64,` header off a canvas snapshot.
///
/// Returns the MIME type named by the header, if any, and the bare payload.
pub fn strip_transport_prefix(raw: &str) -> (Option<&str>, &str) {
    let Some((header, payload)) = raw.split_once("base64,") else {
        return (None, raw);
    };
    let mime = header
        .trim()
        .strip_prefix("data:")
        .map(|rest| rest.trim_end_matches(';').trim())
        .filter(|mime| !mime.is_empty());
    (mime, payload)
}

/// Turns client `imageData` into bytes for the vision call.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    max_dim: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGE_DIM)
    }
}

impl ImagePreprocessor {
    pub fn new(max_dim: u32) -> Self {
        Self {
            max_dim: max_dim.max(64),
        }
    }

    /// Validates, decodes and downsizes a canvas snapshot.
    ///
    /// Payloads that base64-decode but are not a raster `image` understands are
    /// passed through untouched.
    pub fn prepare(&self, raw: &str) -> Result<DrawingImage, ValidationError> {
        validate_image_data(raw)?;
        let (mime, payload) = strip_transport_prefix(raw.trim());
        let compact: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = BASE64.decode(compact.as_bytes()).map_err(|err| {
            ValidationError::single(FieldError::new(
                IMAGE_DATA_FIELD,
                "invalid_string",
                format!("Image data must be base64 encoded ({err})"),
            ))
        })?;
        if bytes.is_empty() {
            return Err(ValidationError::single(FieldError::new(
                IMAGE_DATA_FIELD,
                "too_small",
                "Image data is required",
            )));
        }

        let original_mime = mime.unwrap_or(DEFAULT_MIME);
        match self.compress(&bytes) {
            Some(compressed) => Ok(DrawingImage::new(compressed, "image/jpeg")),
            None => Ok(DrawingImage::new(bytes, original_mime)),
        }
    }

    fn compress(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let decoded = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::debug!("drawing is not a decodable raster, sending as-is: {err}");
                return None;
            }
        };
        let flattened = flatten_onto_white(&decoded);
        let (width, height) = (flattened.width(), flattened.height());
        let image = if width > self.max_dim || height > self.max_dim {
            flattened.resize(self.max_dim, self.max_dim, FilterType::Triangle)
        } else {
            flattened
        };

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        if let Err(err) = encoder.encode_image(&image.to_rgb8()) {
            tracing::warn!("drawing re-encode failed, sending original bytes: {err}");
            return None;
        }
        Some(out)
    }
}

// Canvas strokes sit on a transparent background; JPEG has no alpha.
fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    DynamicImage::ImageRgba8(flattened)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{GenericImageView, ImageFormat};

    use super::*;

    pub(crate) fn png_data_url(width: u32, height: u32) -> String {
        let mut image = RgbaImage::new(width, height);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            *pixel = if x < width / 2 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            };
        }
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap_or_default();
        format!("data:image/png;base64,{}", BASE64.encode(bytes.into_inner()))
    }

    #[test]
    fn strips_data_url_header() {
        let (mime, payload) = strip_transport_prefix("data:image/webp;base64,AAAA");
        assert_eq!(mime, Some("image/webp"));
        assert_eq!(payload, "AAAA");

        let (mime, payload) = strip_transport_prefix("AAAA");
        assert_eq!(mime, None);
        assert_eq!(payload, "AAAA");
    }

    #[test]
    fn rejects_short_and_non_base64_payloads() {
        let preprocessor = ImagePreprocessor::default();
        let short = preprocessor.prepare("").err();
        assert!(short.is_some_and(|err| err.names_field(IMAGE_DATA_FIELD)));

        let garbage = preprocessor.prepare("data:image/png;base64,@@@@not-base64@@@@").err();
        assert!(garbage.is_some_and(|err| err.errors[0].code == "invalid_string"));
    }

    #[test]
    fn large_drawings_are_downscaled_to_jpeg() -> anyhow::Result<()> {
        let preprocessor = ImagePreprocessor::new(200);
        let prepared = preprocessor.prepare(&png_data_url(1000, 500))?;
        assert_eq!(prepared.mime_type(), "image/jpeg");

        let decoded = image::load_from_memory(prepared.bytes())?;
        assert_eq!(decoded.dimensions(), (200, 100));
        Ok(())
    }

    #[test]
    fn small_drawings_keep_their_size() -> anyhow::Result<()> {
        let prepared = ImagePreprocessor::default().prepare(&png_data_url(64, 48))?;
        let decoded = image::load_from_memory(prepared.bytes())?;
        assert_eq!(decoded.dimensions(), (64, 48));
        Ok(())
    }

    #[test]
    fn transparent_pixels_become_white() -> anyhow::Result<()> {
        let prepared = ImagePreprocessor::default().prepare(&png_data_url(16, 16))?;
        let decoded = image::load_from_memory(prepared.bytes())?.to_rgb8();
        // The right half was transparent; JPEG is lossy, so allow some drift.
        let pixel = decoded.get_pixel(13, 8);
        assert!(pixel[0] > 150 && pixel[1] > 150 && pixel[2] > 150);
        Ok(())
    }

    #[test]
    fn undecodable_bytes_pass_through() -> anyhow::Result<()> {
        let raw = format!("data:image/png;base64,{}", BASE64.encode(b"definitely not a png"));
        let prepared = ImagePreprocessor::default().prepare(&raw)?;
        assert_eq!(prepared.bytes(), b"definitely not a png");
        assert_eq!(prepared.mime_type(), "image/png");
        assert_eq!(prepared.sha256_hex().len(), 64);
        Ok(())
    }
}
