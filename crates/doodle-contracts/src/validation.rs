use serde::{Deserialize, Serialize};

pub const IMAGE_DATA_FIELD: &str = "imageData";
pub const MIN_IMAGE_DATA_CHARS: usize = 10;

/// One failed check on a request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: String,
    pub path: Vec<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<usize>,
}

impl FieldError {
    pub fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: vec![field.to_string()],
            message: message.into(),
            minimum: None,
        }
    }

    pub fn field(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }
}

/// Client input that failed validation. Serialized as the 400 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}: {}", summarize(.errors))]
pub struct ValidationError {
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self {
            message: "Invalid request data".to_string(),
            errors,
        }
    }

    pub fn single(error: FieldError) -> Self {
        Self::new(vec![error])
    }

    pub fn names_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field() == field)
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.path.join("."), error.message))
        .collect::<Vec<String>>()
        .join("; ")
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "imageData", default)]
    pub image_data: Option<String>,
}

impl GenerateRequest {
    pub fn new(image_data: impl Into<String>) -> Self {
        Self {
            image_data: Some(image_data.into()),
        }
    }

    /// Returns the raw image payload once it passes the field checks.
    pub fn validate(&self) -> Result<&str, ValidationError> {
        let Some(raw) = self.image_data.as_deref() else {
            return Err(ValidationError::single(FieldError::new(
                IMAGE_DATA_FIELD,
                "invalid_type",
                "Required",
            )));
        };
        validate_image_data(raw)?;
        Ok(raw)
    }
}

/// Length check shared by the HTTP edge and the pipeline's preprocess step.
pub fn validate_image_data(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().chars().count() < MIN_IMAGE_DATA_CHARS {
        let mut error = FieldError::new(IMAGE_DATA_FIELD, "too_small", "Image data is required");
        error.minimum = Some(MIN_IMAGE_DATA_CHARS);
        return Err(ValidationError::single(error));
    }
    Ok(())
}
