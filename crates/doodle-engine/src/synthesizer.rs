use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doodle_contracts::{FallbackImageTable, ObjectLabel};

use crate::error::InferenceError;
use crate::providers::{ImageRequest, InferenceProvider, InlineImage};

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Synthesized,
    Placeholder,
}

impl fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthesized => f.write_str("synthesized"),
            Self::Placeholder => f.write_str("placeholder"),
        }
    }
}

/// Displayable render: a `data:` URL plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub origin: ImageOrigin,
}

/// Capability: paint a label. Never fails.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, label: &ObjectLabel) -> GeneratedImage;
}

/// Prompt for a single centred, studio-lit, child-friendly 3D render.
pub fn studio_prompt(label: &ObjectLabel) -> String {
    format!(
        "A photorealistic 3D model of a {label} rendered in a clean white studio environment \
         with soft, even lighting. The 3D model should have a gently cartoonish style \
         appropriate for children, with vibrant colors and smooth textures. The {label} \
         should be the only subject, centered in the frame, with slight shadows to \
         emphasize its 3D form."
    )
}

/// Synthesizer backed by an image model, degrading to placeholder renders.
///
/// Every call asks the backend again; only placeholders are static.
pub struct StudioSynthesizer {
    provider: Arc<dyn InferenceProvider>,
    model: String,
    fallbacks: Arc<FallbackImageTable>,
    timeout: Duration,
}

impl StudioSynthesizer {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        model: impl Into<String>,
        fallbacks: Arc<FallbackImageTable>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            fallbacks,
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn render(&self, label: &ObjectLabel) -> Result<InlineImage, InferenceError> {
        let request = ImageRequest {
            model: self.model.clone(),
            prompt: studio_prompt(label),
            timeout: self.timeout,
        };
        tracing::debug!(object_type = %label, model = %self.model, "requesting 3D render");
        match tokio::time::timeout(self.timeout, self.provider.generate_image(&request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout {
                provider: self.provider.name().to_string(),
                millis: self.timeout.as_millis(),
            }),
        }
    }

    fn placeholder(&self, label: &ObjectLabel) -> GeneratedImage {
        GeneratedImage {
            url: self.fallbacks.lookup(label).to_string(),
            origin: ImageOrigin::Placeholder,
        }
    }
}

#[async_trait]
impl ImageSynthesizer for StudioSynthesizer {
    async fn synthesize(&self, label: &ObjectLabel) -> GeneratedImage {
        match self.render(label).await {
            Ok(image) if !image.bytes.is_empty() => GeneratedImage {
                url: image.to_data_url(),
                origin: ImageOrigin::Synthesized,
            },
            Ok(_) => {
                tracing::warn!(object_type = %label, "render came back empty; using placeholder");
                self.placeholder(label)
            }
            Err(err) if err.is_throttle_like() => {
                tracing::warn!(object_type = %label, "image backend unavailable ({err}); using placeholder");
                self.placeholder(label)
            }
            Err(err) => {
                tracing::warn!(object_type = %label, "3D render failed, using placeholder: {err}");
                self.placeholder(label)
            }
        }
    }
}
