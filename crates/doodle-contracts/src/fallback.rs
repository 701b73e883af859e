use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;

use crate::label::ObjectLabel;

pub const DEFAULT_FALLBACK_KEY: &str = "default";

const BUILTIN_PLACEHOLDERS: [(&str, &[u8]); 11] = [
    ("apple", include_bytes!("../resources/fallback/apple.png")),
    ("dog", include_bytes!("../resources/fallback/dog.png")),
    ("cat", include_bytes!("../resources/fallback/cat.png")),
    ("flower", include_bytes!("../resources/fallback/flower.png")),
    ("house", include_bytes!("../resources/fallback/house.png")),
    ("tree", include_bytes!("../resources/fallback/tree.png")),
    ("car", include_bytes!("../resources/fallback/car.png")),
    ("sun", include_bytes!("../resources/fallback/sun.png")),
    ("moon", include_bytes!("../resources/fallback/moon.png")),
    ("ball", include_bytes!("../resources/fallback/ball.png")),
    (DEFAULT_FALLBACK_KEY, include_bytes!("../resources/fallback/default.png")),
];

/// Placeholder renders used when synthesis is unavailable.
///
/// Entries are encoded to data URLs once, at construction, and never change
/// afterwards. The `default` entry always exists.
#[derive(Debug, Clone)]
pub struct FallbackImageTable {
    entries: IndexMap<String, String>,
    default_url: String,
}

impl FallbackImageTable {
    /// Table of the PNG placeholders compiled into the binary.
    pub fn builtin() -> Self {
        let mut entries = IndexMap::new();
        let mut default_url = String::new();
        for (key, bytes) in BUILTIN_PLACEHOLDERS {
            let url = png_data_url(bytes);
            if key == DEFAULT_FALLBACK_KEY {
                default_url = url;
            } else {
                entries.insert(key.to_string(), url);
            }
        }
        Self {
            entries,
            default_url,
        }
    }

    /// Builds a table from explicit data URLs. `default_url` backs every miss.
    pub fn from_urls(
        entries: impl IntoIterator<Item = (String, String)>,
        default_url: impl Into<String>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            default_url: default_url.into(),
        }
    }

    /// Exact-key lookup falling back to the default entry.
    pub fn lookup(&self, label: &ObjectLabel) -> &str {
        self.specific(label).unwrap_or(&self.default_url)
    }

    pub fn specific(&self, label: &ObjectLabel) -> Option<&str> {
        self.entries.get(label.as_str()).map(String::as_str)
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for FallbackImageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn png_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(bytes))
}
