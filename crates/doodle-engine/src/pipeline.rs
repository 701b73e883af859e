use std::sync::Arc;

use anyhow::Context;
use doodle_contracts::events::{EventPayload, EventWriter};
use doodle_contracts::{GalleryRecord, GalleryStore, ValidationError};
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::classifier::ObjectClassifier;
use crate::error::PipelineError;
use crate::preprocess::ImagePreprocessor;
use crate::synthesizer::ImageSynthesizer;

/// Preprocess → classify → synthesize → assemble → publish.
///
/// Holds no mutable state of its own; the gallery is the only shared resource.
#[derive(Clone)]
pub struct GenerationPipeline {
    preprocessor: ImagePreprocessor,
    classifier: Arc<dyn ObjectClassifier>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    gallery: Arc<GalleryStore>,
    events: Option<EventWriter>,
}

impl GenerationPipeline {
    pub fn new(
        preprocessor: ImagePreprocessor,
        classifier: Arc<dyn ObjectClassifier>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        gallery: Arc<GalleryStore>,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            synthesizer,
            gallery,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gallery(&self) -> &Arc<GalleryStore> {
        &self.gallery
    }

    /// Runs one generation for raw client `imageData`.
    ///
    /// Only validation rejects; once classification starts a record is
    /// always published.
    pub async fn run(&self, image_data: &str) -> Result<GalleryRecord, PipelineError> {
        let generation_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("generate", generation_id = %generation_id);
        self.run_stages(&generation_id, image_data)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        generation_id: &str,
        image_data: &str,
    ) -> Result<GalleryRecord, PipelineError> {
        let preprocessor = self.preprocessor;
        let raw = image_data.to_string();
        let prepared = tokio::task::spawn_blocking(move || preprocessor.prepare(&raw))
            .await
            .context("image preprocessing task failed")?;
        let drawing = match prepared {
            Ok(drawing) => drawing,
            Err(err) => {
                tracing::info!("rejected generation request: {err}");
                self.journal(generation_id, "generation_rejected", rejection_payload(&err))
                    .await;
                return Err(PipelineError::Rejected(err));
            }
        };
        self.journal(
            generation_id,
            "generation_started",
            payload(json!({
                "drawing_sha256": drawing.sha256_hex(),
                "drawing_bytes": drawing.bytes().len(),
                "mime_type": drawing.mime_type(),
            })),
        )
        .await;

        let label = self.classifier.classify(&drawing).await;
        drop(drawing);
        self.journal(
            generation_id,
            "label_resolved",
            payload(json!({ "object_type": label.as_str() })),
        )
        .await;

        let image = self.synthesizer.synthesize(&label).await;
        self.journal(
            generation_id,
            "image_resolved",
            payload(json!({
                "object_type": label.as_str(),
                "origin": image.origin.to_string(),
            })),
        )
        .await;

        let record = GalleryRecord::new(label, image.url);
        self.gallery.insert(record.clone());
        tracing::info!(
            record_id = %record.id,
            object_type = %record.object_type,
            origin = %image.origin,
            "published gallery record"
        );
        self.journal(
            generation_id,
            "record_published",
            payload(json!({
                "record_id": record.id,
                "object_type": record.object_type.as_str(),
            })),
        )
        .await;
        Ok(record)
    }

    /// Appends a journal event off the async workers; failures are logged only.
    async fn journal(&self, generation_id: &str, event_type: &str, payload: EventPayload) {
        let Some(events) = self.events.clone() else {
            return;
        };
        let generation_id = generation_id.to_string();
        let kind = event_type.to_string();
        let written = tokio::task::spawn_blocking(move || {
            events.emit(&kind, &generation_id, payload).map(|_| ())
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("failed to write {event_type} event: {err:#}"),
            Err(err) => tracing::warn!("{event_type} event task failed: {err}"),
        }
    }
}

fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn rejection_payload(err: &ValidationError) -> EventPayload {
    payload(json!({
        "fields": err
            .errors
            .iter()
            .map(|error| error.field().to_string())
            .collect::<Vec<String>>(),
    }))
}
