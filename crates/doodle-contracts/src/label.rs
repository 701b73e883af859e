use std::fmt;

use serde::{Deserialize, Serialize};

/// Label returned when nothing specific can be read from a drawing.
pub const UNRECOGNIZED_LABEL: &str = "object";

/// Words handed out when the vision backend throttles us.
pub const FALLBACK_VOCABULARY: [&str; 10] = [
    "apple", "dog", "cat", "flower", "house", "tree", "car", "sun", "moon", "ball",
];

const MAX_LABEL_CHARS: usize = 50;

/// Lowercase, single-word name of the object in a drawing.
///
/// Always non-empty and made of ASCII letters only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectLabel(String);

impl ObjectLabel {
    /// Extracts a label from free-form model output.
    ///
    /// Takes the first run of ASCII letters, so `"A cat."` reads as `"a"` while
    /// `"Cat, probably"` reads as `"cat"`. Replies without any letters become
    /// [`UNRECOGNIZED_LABEL`].
    pub fn from_reply(reply: &str) -> Self {
        Self::parse(reply).unwrap_or_else(Self::unrecognized)
    }

    /// Like [`ObjectLabel::from_reply`] but reports when nothing was usable.
    pub fn parse(reply: &str) -> Option<Self> {
        reply
            .split(|ch: char| !ch.is_ascii_alphabetic())
            .find(|token| !token.is_empty())
            .map(|token| {
                Self(
                    token
                        .chars()
                        .take(MAX_LABEL_CHARS)
                        .collect::<String>()
                        .to_ascii_lowercase(),
                )
            })
    }

    pub fn unrecognized() -> Self {
        Self(UNRECOGNIZED_LABEL.to_string())
    }

    pub fn is_unrecognized(&self) -> bool {
        self.0 == UNRECOGNIZED_LABEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parsed = Self::parse(&value).ok_or_else(|| format!("invalid label '{value}'"))?;
        if parsed.0.len() != value.trim().len() {
            return Err(format!("invalid label '{value}'"));
        }
        Ok(parsed)
    }
}

impl From<ObjectLabel> for String {
    fn from(label: ObjectLabel) -> Self {
        label.0
    }
}

impl AsRef<str> for ObjectLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
