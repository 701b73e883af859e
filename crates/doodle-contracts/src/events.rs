use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only generation journal (`events.jsonl`).
///
/// - default fields are `type`, `session_id`, `generation_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Appends one event and returns it as written.
    pub fn emit(
        &self,
        event_type: &str,
        generation_id: &str,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut event = self.envelope(event_type, generation_id);
        event.extend(payload);
        let event = Value::Object(event);
        self.append(&event)
            .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;
        Ok(event)
    }

    fn envelope(&self, event_type: &str, generation_id: &str) -> EventPayload {
        let ts = now_utc_iso();
        [
            ("type", event_type),
            ("session_id", self.inner.session_id.as_str()),
            ("generation_id", generation_id),
            ("ts", ts.as_str()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
    }

    fn append(&self, event: &Value) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self
            .inner
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?
            .write_all(&line)?;
        Ok(())
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
