use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use doodle_contracts::events::EventWriter;
use doodle_contracts::models::{ModelSelector, IMAGE_CAPABILITY, VISION_CAPABILITY};
use doodle_contracts::{FallbackImageTable, GalleryStore};
use uuid::Uuid;

use crate::classifier::{LabelClassifier, DEFAULT_CLASSIFY_TIMEOUT};
use crate::pipeline::GenerationPipeline;
use crate::preprocess::{ImagePreprocessor, DEFAULT_MAX_IMAGE_DIM};
use crate::providers::{DryrunProvider, GeminiProvider, InferenceProvider, ProviderRegistry};
use crate::synthesizer::{StudioSynthesizer, DEFAULT_RENDER_TIMEOUT};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const API_KEY_FALLBACK_ENV: &str = "GOOGLE_API_KEY";
const DEFAULT_TRANSPORT_RETRIES: usize = 1;
const MAX_TRANSPORT_RETRIES: usize = 4;
const RETRY_BACKOFF: Duration = Duration::from_millis(1200);

/// Runtime settings for the generation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub vision_model: Option<String>,
    pub image_model: Option<String>,
    pub classify_timeout: Duration,
    pub render_timeout: Duration,
    pub transport_retries: usize,
    pub max_image_dim: u32,
    pub events_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    /// Reads settings through `lookup`; values are already trimmed and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let Some(api_key) = lookup(API_KEY_ENV).or_else(|| lookup(API_KEY_FALLBACK_ENV)) else {
            bail!("{API_KEY_ENV} is not set (add it to the environment or .env)");
        };
        Ok(Self {
            api_key,
            api_base: lookup("GEMINI_API_BASE"),
            vision_model: lookup("DOODLE_VISION_MODEL"),
            image_model: lookup("DOODLE_IMAGE_MODEL"),
            classify_timeout: seconds(
                lookup("DOODLE_CLASSIFY_TIMEOUT_SECS"),
                DEFAULT_CLASSIFY_TIMEOUT,
                1..=300,
            ),
            render_timeout: seconds(
                lookup("DOODLE_RENDER_TIMEOUT_SECS"),
                DEFAULT_RENDER_TIMEOUT,
                1..=600,
            ),
            transport_retries: lookup("DOODLE_TRANSPORT_RETRIES")
                .and_then(|raw| raw.parse::<usize>().ok())
                .unwrap_or(DEFAULT_TRANSPORT_RETRIES)
                .min(MAX_TRANSPORT_RETRIES),
            max_image_dim: lookup("DOODLE_MAX_IMAGE_DIM")
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(DEFAULT_MAX_IMAGE_DIM)
                .clamp(64, 4096),
            events_path: None,
        })
    }

    pub fn provider_registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(
            GeminiProvider::new(self.api_key.clone(), self.api_base.clone())
                .with_transport_retries(self.transport_retries, RETRY_BACKOFF),
        );
        registry.register(DryrunProvider);
        registry
    }

    /// Resolves models and providers, then wires the pipeline around `gallery`.
    pub fn build_pipeline(&self, gallery: Arc<GalleryStore>) -> Result<GenerationPipeline> {
        let providers = self.provider_registry();
        let selector = ModelSelector::builtin().with_providers(providers.names());
        let (vision_provider, vision_model) = resolve(
            &selector,
            &providers,
            self.vision_model.as_deref(),
            VISION_CAPABILITY,
        )?;
        let (image_provider, image_model) = resolve(
            &selector,
            &providers,
            self.image_model.as_deref(),
            IMAGE_CAPABILITY,
        )?;
        tracing::info!(
            vision_model = %vision_model,
            image_model = %image_model,
            "generation engine ready"
        );

        let classifier = LabelClassifier::new(vision_provider, vision_model)
            .with_timeout(self.classify_timeout);
        let synthesizer = StudioSynthesizer::new(
            image_provider,
            image_model,
            Arc::new(FallbackImageTable::builtin()),
        )
        .with_timeout(self.render_timeout);
        let pipeline = GenerationPipeline::new(
            ImagePreprocessor::new(self.max_image_dim),
            Arc::new(classifier),
            Arc::new(synthesizer),
            gallery,
        );
        Ok(match &self.events_path {
            Some(path) => {
                pipeline.with_events(EventWriter::new(path.clone(), Uuid::new_v4().to_string()))
            }
            None => pipeline,
        })
    }
}

fn resolve(
    selector: &ModelSelector,
    providers: &ProviderRegistry,
    requested: Option<&str>,
    capability: &str,
) -> Result<(Arc<dyn InferenceProvider>, String)> {
    let selection = selector.select(requested, capability)?;
    if let Some(reason) = &selection.fallback_reason {
        tracing::warn!("{reason} Using '{}'.", selection.model.name);
    }
    let provider = providers.get(&selection.model.provider).ok_or_else(|| {
        anyhow!(
            "model '{}' needs provider '{}', which is not registered",
            selection.model.name,
            selection.model.provider
        )
    })?;
    Ok((provider, selection.model.name))
}

fn seconds(raw: Option<String>, default: Duration, range: std::ops::RangeInclusive<u64>) -> Duration {
    raw.and_then(|value| value.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.clamp(*range.start(), *range.end())))
        .unwrap_or(default)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
