use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use doodle_contracts::validation::IMAGE_DATA_FIELD;
use doodle_contracts::{
    FieldError, GalleryRecord, GalleryStore, GenerateRequest, SoundCue, SoundResolver,
    ValidationError,
};
use doodle_engine::{GenerationPipeline, PipelineError};
use serde::Serialize;
use tokio::net::TcpListener;

pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const GENERATE_FAILED_MESSAGE: &str = "Failed to generate 3D image. Please try again.";
const NOT_FOUND_MESSAGE: &str = "Gallery item not found";

#[derive(Clone)]
pub struct AppState {
    pipeline: GenerationPipeline,
    sounds: Arc<SoundResolver>,
}

impl AppState {
    pub fn new(pipeline: GenerationPipeline, sounds: SoundResolver) -> Self {
        Self {
            pipeline,
            sounds: Arc::new(sounds),
        }
    }

    fn gallery(&self) -> &GalleryStore {
        self.pipeline.gallery()
    }
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

/// Failure at the HTTP edge. Internal detail is logged, never returned.
#[derive(Debug)]
pub enum ApiError {
    Invalid(ValidationError),
    TooLarge(ValidationError),
    NotFound,
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Rejected(err) => Self::Invalid(err),
            PipelineError::Internal(err) => Self::Internal(format!("{err:#}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::TooLarge(ValidationError::single(FieldError::new(
                "body",
                "too_big",
                rejection.body_text(),
            )));
        }
        let error = match &rejection {
            JsonRejection::JsonDataError(_) => {
                FieldError::new(IMAGE_DATA_FIELD, "invalid_type", rejection.body_text())
            }
            JsonRejection::MissingJsonContentType(_) => {
                FieldError::new("body", "invalid_content_type", rejection.body_text())
            }
            _ => FieldError::new("body", "invalid_json", rejection.body_text()),
        };
        Self::Invalid(ValidationError::single(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(err) => (StatusCode::BAD_REQUEST, Json(err)).into_response(),
            Self::TooLarge(err) => (StatusCode::PAYLOAD_TOO_LARGE, Json(err)).into_response(),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(MessageBody {
                    message: NOT_FOUND_MESSAGE,
                }),
            )
                .into_response(),
            Self::Internal(detail) => {
                tracing::error!("generation request failed: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageBody {
                        message: GENERATE_FAILED_MESSAGE,
                    }),
                )
                    .into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    router_with_body_limit(state, BODY_LIMIT_BYTES)
}

pub fn router_with_body_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/api/gallery", get(list_gallery).delete(clear_gallery))
        .route("/api/gallery/:id", delete(delete_gallery_item))
        .route("/api/generate", post(generate))
        .route("/api/sounds/:object_type", get(sound_for))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("serving on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server stopped unexpectedly")?;
    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler unavailable: {err}");
        std::future::pending::<()>().await;
    }
}

async fn list_gallery(State(state): State<AppState>) -> Json<Vec<GalleryRecord>> {
    Json(state.gallery().list())
}

async fn clear_gallery(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.gallery().clear();
    tracing::info!(removed, "cleared gallery");
    Json(MessageBody {
        message: "Gallery cleared successfully",
    })
}

async fn delete_gallery_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    if !state.gallery().remove(&id) {
        return Err(ApiError::NotFound);
    }
    tracing::info!(record_id = %id, "deleted gallery record");
    Ok(Json(MessageBody {
        message: "Gallery item deleted successfully",
    }))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GalleryRecord>), ApiError> {
    let Json(request) = payload?;
    let image_data = request.validate().map_err(ApiError::Invalid)?;
    let record = state.pipeline.run(image_data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn sound_for(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
) -> Json<SoundCue> {
    Json(state.sounds.resolve(&object_type))
}

#[cfg(test)]
mod tests {
    use doodle_contracts::FallbackImageTable;
    use doodle_engine::{DryrunProvider, ImagePreprocessor, LabelClassifier, StudioSynthesizer};
    use reqwest::Client;
    use serde_json::{json, Value};

    use super::*;

    // 1x1 opaque PNG.
    const TINY_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn dryrun_state() -> AppState {
        let provider = Arc::new(DryrunProvider);
        let pipeline = GenerationPipeline::new(
            ImagePreprocessor::default(),
            Arc::new(LabelClassifier::new(provider.clone(), "dryrun-vision-1")),
            Arc::new(StudioSynthesizer::new(
                provider,
                "dryrun-image-1",
                Arc::new(FallbackImageTable::builtin()),
            )),
            Arc::new(GalleryStore::new()),
        );
        AppState::new(pipeline, SoundResolver::builtin())
    }

    async fn spawn_app() -> anyhow::Result<(String, AppState)> {
        spawn_app_with_limit(BODY_LIMIT_BYTES).await
    }

    async fn spawn_app_with_limit(body_limit: usize) -> anyhow::Result<(String, AppState)> {
        let state = dryrun_state();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router_with_body_limit(state.clone(), body_limit);
        tokio::spawn(async move { axum::serve(listener, app).await });
        Ok((format!("http://{addr}"), state))
    }

    #[tokio::test]
    async fn generate_then_list_returns_record_first() -> anyhow::Result<()> {
        let (base, _) = spawn_app().await?;
        let client = Client::new();

        let response = client
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": TINY_PNG }))
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let created: Value = response.json().await?;
        let object_type = created["objectType"].as_str().unwrap_or_default();
        assert!(!created["id"].as_str().unwrap_or_default().is_empty());
        assert!(!object_type.is_empty());
        assert_eq!(object_type, object_type.to_lowercase());
        assert!(!created["imageUrl"].as_str().unwrap_or_default().is_empty());
        assert!(created["created"].as_str().unwrap_or_default().contains('T'));

        client
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": TINY_PNG }))
            .send()
            .await?;
        let newest: Value = client
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": TINY_PNG }))
            .send()
            .await?
            .json()
            .await?;

        let listed: Vec<Value> = client
            .get(format!("{base}/api/gallery"))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0], newest);
        assert_eq!(listed[2], created);
        Ok(())
    }

    #[tokio::test]
    async fn empty_image_data_is_rejected() -> anyhow::Result<()> {
        let (base, state) = spawn_app().await?;
        let response = Client::new()
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": "" }))
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["message"], json!("Invalid request data"));
        assert_eq!(body["errors"][0]["path"], json!(["imageData"]));
        assert_eq!(body["errors"][0]["minimum"], json!(10));
        assert!(state.gallery().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_malformed_bodies_are_bad_requests() -> anyhow::Result<()> {
        let (base, _) = spawn_app().await?;
        let client = Client::new();

        let missing: Value = client
            .post(format!("{base}/api/generate"))
            .json(&json!({}))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(missing["errors"][0]["code"], json!("invalid_type"));
        assert_eq!(missing["errors"][0]["path"], json!(["imageData"]));

        let response = client
            .post(format!("{base}/api/generate"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["message"], json!("Invalid request data"));
        assert_eq!(body["errors"][0]["code"], json!("invalid_json"));

        let wrong_type = client
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": 42 }))
            .send()
            .await?;
        assert_eq!(wrong_type.status(), reqwest::StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() -> anyhow::Result<()> {
        let (base, state) = spawn_app_with_limit(1024).await?;
        let padded = format!("data:image/png;base64,{}", "A".repeat(4096));
        let response = Client::new()
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": padded }))
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = response.json().await?;
        assert_eq!(body["errors"][0]["code"], json!("too_big"));
        assert_eq!(body["errors"][0]["path"], json!(["body"]));
        assert!(state.gallery().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn non_base64_payload_is_rejected() -> anyhow::Result<()> {
        let (base, _) = spawn_app().await?;
        let response = Client::new()
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": "data:image/png;base64,????????????" }))
            .send()
            .await?;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["errors"][0]["code"], json!("invalid_string"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_once_then_404s() -> anyhow::Result<()> {
        let (base, state) = spawn_app().await?;
        let client = Client::new();
        let created: Value = client
            .post(format!("{base}/api/generate"))
            .json(&json!({ "imageData": TINY_PNG }))
            .send()
            .await?
            .json()
            .await?;
        let id = created["id"].as_str().unwrap_or_default();

        let first = client
            .delete(format!("{base}/api/gallery/{id}"))
            .send()
            .await?;
        assert_eq!(first.status(), reqwest::StatusCode::OK);
        let body: Value = first.json().await?;
        assert_eq!(body["message"], json!("Gallery item deleted successfully"));

        let second = client
            .delete(format!("{base}/api/gallery/{id}"))
            .send()
            .await?;
        assert_eq!(second.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = second.json().await?;
        assert_eq!(body["message"], json!("Gallery item not found"));
        assert!(state.gallery().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn clear_empties_gallery_unconditionally() -> anyhow::Result<()> {
        let (base, state) = spawn_app().await?;
        let client = Client::new();
        for _ in 0..2 {
            client
                .post(format!("{base}/api/generate"))
                .json(&json!({ "imageData": TINY_PNG }))
                .send()
                .await?;
        }
        assert_eq!(state.gallery().len(), 2);

        for _ in 0..2 {
            let response = client.delete(format!("{base}/api/gallery")).send().await?;
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let body: Value = response.json().await?;
            assert_eq!(body["message"], json!("Gallery cleared successfully"));
        }
        let listed: Vec<Value> = client
            .get(format!("{base}/api/gallery"))
            .send()
            .await?
            .json()
            .await?;
        assert!(listed.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sounds_resolve_known_and_unknown_labels() -> anyhow::Result<()> {
        let (base, _) = spawn_app().await?;
        let client = Client::new();

        let dogs: Value = client
            .get(format!("{base}/api/sounds/Dogs"))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(dogs["objectType"], json!("dog"));
        assert_eq!(dogs["isDefault"], json!(false));

        let other: Value = client
            .get(format!("{base}/api/sounds/giraffe"))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(other["isDefault"], json!(true));
        assert!(!other["soundUrl"].as_str().unwrap_or_default().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() -> anyhow::Result<()> {
        let response = ApiError::from(PipelineError::Internal(anyhow::anyhow!("secret detail")))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body, json!({ "message": GENERATE_FAILED_MESSAGE }));
        Ok(())
    }
}
