use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doodle_contracts::{ObjectLabel, FALLBACK_VOCABULARY, UNRECOGNIZED_LABEL};
use rand::seq::SliceRandom;

use crate::error::InferenceError;
use crate::preprocess::DrawingImage;
use crate::providers::{InferenceProvider, VisionRequest};

pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability: name the object in a drawing. Never fails.
#[async_trait]
pub trait ObjectClassifier: Send + Sync {
    async fn classify(&self, image: &DrawingImage) -> ObjectLabel;
}

pub fn classification_instruction() -> String {
    format!(
        "What kind of object is drawn in this image? Respond with exactly one lowercase \
         word that names the main object, for example: apple, car, house, dog. \
         If nothing specific is recognizable, respond with \"{UNRECOGNIZED_LABEL}\"."
    )
}

/// Picks a label uniformly from the fallback vocabulary.
pub fn random_fallback_label() -> ObjectLabel {
    let word = FALLBACK_VOCABULARY
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(UNRECOGNIZED_LABEL);
    ObjectLabel::from_reply(word)
}

/// Classifier backed by a vision model.
///
/// Throttling and timeouts yield a random vocabulary word so the user keeps
/// getting results; any other failure yields `object`.
pub struct LabelClassifier {
    provider: Arc<dyn InferenceProvider>,
    model: String,
    timeout: Duration,
}

impl LabelClassifier {
    pub fn new(provider: Arc<dyn InferenceProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn ask(&self, image: &DrawingImage) -> Result<String, InferenceError> {
        let request = VisionRequest {
            model: self.model.clone(),
            instruction: classification_instruction(),
            image: image.clone(),
            timeout: self.timeout,
        };
        match tokio::time::timeout(self.timeout, self.provider.describe_image(&request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout {
                provider: self.provider.name().to_string(),
                millis: self.timeout.as_millis(),
            }),
        }
    }
}

#[async_trait]
impl ObjectClassifier for LabelClassifier {
    async fn classify(&self, image: &DrawingImage) -> ObjectLabel {
        match self.ask(image).await {
            Ok(reply) => {
                let label = ObjectLabel::from_reply(&reply);
                tracing::info!(object_type = %label, model = %self.model, "detected object type");
                label
            }
            Err(err) if err.is_throttle_like() => {
                let label = random_fallback_label();
                tracing::warn!(
                    object_type = %label,
                    "vision backend unavailable ({err}); using fallback object"
                );
                label
            }
            Err(err) => {
                tracing::warn!("object detection failed, defaulting to '{UNRECOGNIZED_LABEL}': {err}");
                ObjectLabel::unrecognized()
            }
        }
    }
}
