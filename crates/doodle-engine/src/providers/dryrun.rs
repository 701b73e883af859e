use std::io::Cursor;

use async_trait::async_trait;
use doodle_contracts::FALLBACK_VOCABULARY;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{ImageRequest, InferenceProvider, InlineImage, VisionRequest};
use crate::error::InferenceError;

const DRYRUN_SIZE: u32 = 256;

/// Offline backend with deterministic answers, for local runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunProvider;

#[async_trait]
impl InferenceProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn describe_image(&self, request: &VisionRequest) -> Result<String, InferenceError> {
        let digest = Sha256::digest(request.image.bytes());
        let word = FALLBACK_VOCABULARY[digest[0] as usize % FALLBACK_VOCABULARY.len()];
        Ok(format!("{word}."))
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<InlineImage, InferenceError> {
        let (r, g, b) = color_from_prompt(&request.prompt);
        let image = RgbImage::from_pixel(DRYRUN_SIZE, DRYRUN_SIZE, Rgb([r, g, b]));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| InferenceError::MalformedResponse {
                provider: self.name().to_string(),
                detail: err.to_string(),
            })?;
        Ok(InlineImage {
            bytes: bytes.into_inner(),
            mime_type: "image/png".to_string(),
        })
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::GenericImageView;

    use super::*;
    use crate::preprocess::DrawingImage;

    #[tokio::test]
    async fn describe_is_deterministic_per_image() -> anyhow::Result<()> {
        let request = VisionRequest {
            model: "dryrun-vision-1".to_string(),
            instruction: "name it".to_string(),
            image: DrawingImage::new(b"stroke".to_vec(), "image/png"),
            timeout: Duration::from_secs(1),
        };
        let first = DryrunProvider.describe_image(&request).await?;
        let second = DryrunProvider.describe_image(&request).await?;
        assert_eq!(first, second);
        assert!(FALLBACK_VOCABULARY.contains(&first.trim_end_matches('.')));
        Ok(())
    }

    #[tokio::test]
    async fn generate_paints_a_solid_png() -> anyhow::Result<()> {
        let request = ImageRequest {
            model: "dryrun-image-1".to_string(),
            prompt: "a 3D apple".to_string(),
            timeout: Duration::from_secs(1),
        };
        let image = DryrunProvider.generate_image(&request).await?;
        assert_eq!(image.mime_type, "image/png");
        let decoded = image::load_from_memory(&image.bytes)?;
        assert_eq!(decoded.dimensions(), (DRYRUN_SIZE, DRYRUN_SIZE));
        Ok(())
    }
}
