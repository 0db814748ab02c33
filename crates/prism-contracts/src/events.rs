use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Lifecycle milestones a batch of generations reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    BatchStarted,
    PredictionSubmitted,
    PredictionSucceeded,
    PredictionFailed,
    BatchFinished,
}

impl BatchEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchStarted => "batch_started",
            Self::PredictionSubmitted => "prediction_submitted",
            Self::PredictionSucceeded => "prediction_succeeded",
            Self::PredictionFailed => "prediction_failed",
            Self::BatchFinished => "batch_finished",
        }
    }
}

/// Append-only JSONL log of one batch.
///
/// Every line carries `type`, `batch_id` and `ts`; the caller's payload is
/// merged last and may override them. Clones share one file lock, so worker
/// threads can emit concurrently without interleaving lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    batch_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, batch_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                batch_id: batch_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn batch_id(&self) -> &str {
        &self.inner.batch_id
    }

    pub fn record(&self, event: BatchEvent, payload: EventPayload) -> anyhow::Result<Value> {
        self.emit(event.as_str(), payload)
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "batch_id".to_string(),
            Value::String(self.inner.batch_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn record_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "batch-123");

        let mut payload = EventPayload::new();
        payload.insert("model".to_string(), Value::String("flux_2_pro".to_string()));
        payload.insert("count".to_string(), Value::from(3));
        let emitted = writer.record(BatchEvent::BatchStarted, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("batch_started".to_string()));
        assert_eq!(parsed["batch_id"], Value::String("batch-123".to_string()));
        assert_eq!(parsed["count"], Value::from(3));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "batch-123");

        let mut payload = EventPayload::new();
        payload.insert(
            "batch_id".to_string(),
            Value::String("override-batch".to_string()),
        );
        let emitted = writer.emit("prediction_failed", payload)?;

        assert_eq!(
            emitted["batch_id"],
            Value::String("override-batch".to_string())
        );
        Ok(())
    }

    #[test]
    fn concurrent_emits_keep_whole_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "batch-123");

        thread::scope(|scope| {
            for index in 0..8 {
                let writer = writer.clone();
                scope.spawn(move || {
                    let mut payload = EventPayload::new();
                    payload.insert("index".to_string(), Value::from(index));
                    writer.record(BatchEvent::PredictionSubmitted, payload)
                });
            }
        });

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 8);
        for line in lines {
            let parsed: Value = serde_json::from_str(line)?;
            assert_eq!(parsed["type"], Value::String("prediction_submitted".to_string()));
        }
        Ok(())
    }
}
