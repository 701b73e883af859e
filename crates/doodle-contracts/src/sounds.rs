use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const DEFAULT_SOUND_URL: &str = "https://soundbible.com/mp3/Click-SoundBible.com-1387633738.mp3";

const BUILTIN_SOUNDS: [(&str, &str); 8] = [
    ("apple", "https://assets.coderrocketfuel.com/pomodoro-times-up.mp3"),
    ("banana", "https://assets.coderrocketfuel.com/pomodoro-times-up.mp3"),
    ("cat", "https://soundbible.com/mp3/Cat_Meowing-Mr_Smith-780889994.mp3"),
    ("dog", "https://soundbible.com/mp3/Dog_Bark-Public_Domain-112624444.mp3"),
    ("flower", "https://soundbible.com/mp3/Blop-Mark_DiAngelo-79054334.mp3"),
    ("sun", "https://soundbible.com/mp3/Campfire-SoundBible.com-56731569.mp3"),
    ("table", "https://soundbible.com/mp3/Glass_Ping-Go445-1207030150.mp3"),
    ("house", "https://soundbible.com/mp3/doorbell-Andrew_Kenneally-667897870.mp3"),
];

/// Audio cue picked for a gallery label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundCue {
    pub object_type: String,
    pub sound_url: String,
    pub is_default: bool,
}

/// Maps labels to playable audio URLs, with a click as the catch-all.
#[derive(Debug, Clone)]
pub struct SoundResolver {
    cues: IndexMap<String, String>,
    default_url: String,
}

impl SoundResolver {
    pub fn builtin() -> Self {
        Self {
            cues: BUILTIN_SOUNDS
                .iter()
                .map(|(label, url)| ((*label).to_string(), (*url).to_string()))
                .collect(),
            default_url: DEFAULT_SOUND_URL.to_string(),
        }
    }

    /// Resolves any label text; plurals such as `"dogs"` map to their singular cue.
    pub fn resolve(&self, label: &str) -> SoundCue {
        let normalized = normalize_label(label);
        match self.cues.get(&normalized) {
            Some(url) => SoundCue {
                object_type: normalized,
                sound_url: url.clone(),
                is_default: false,
            },
            None => SoundCue {
                object_type: normalized,
                sound_url: self.default_url.clone(),
                is_default: true,
            },
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cues.keys().map(String::as_str)
    }
}

impl Default for SoundResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize_label(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    match lowered.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => lowered,
    }
}
