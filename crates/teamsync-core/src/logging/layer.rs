//! JSONL tracing layer.
//!
//! Every event becomes one self-contained JSON line in
//! `{logs_dir}/{date}_{node}.jsonl`, so several nodes on one machine can log
//! side by side and the files can be merged with `jq -s 'sort_by(.ts)'`.

use std::fmt::Write as FmtWrite;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// RFC 3339 timestamp with milliseconds
    pub ts: String,
    pub level: String,
    /// Node name the log file belongs to
    pub node: String,
    /// Module path of the event
    pub target: String,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Enclosing spans, root first, joined with " > "
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

/// A tracing layer appending events to a JSONL file.
pub struct JsonlLayer {
    node: String,
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlLayer {
    /// Open (or create) today's log file for `node` under `logs_dir`.
    pub fn new(logs_dir: impl AsRef<Path>, node: impl Into<String>) -> std::io::Result<Self> {
        let node = node.into();
        let logs_dir = logs_dir.as_ref();
        std::fs::create_dir_all(logs_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = logs_dir.join(format!("{}_{}.jsonl", date, node));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            node,
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Path of the file being written.
    pub fn log_path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &LogLine) -> std::io::Result<()> {
        let json = serde_json::to_string(line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

impl<S> Layer<S> for JsonlLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let span = ctx.event_scope(event).map(|scope| {
            scope
                .from_root()
                .map(|span| span.name())
                .collect::<Vec<_>>()
                .join(" > ")
        });

        let line = LogLine {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: metadata.level().as_str().to_lowercase(),
            node: self.node.clone(),
            target: metadata.target().to_string(),
            msg: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            span: span.filter(|s| !s.is_empty()),
        };

        // Logging must never take the process down
        let _ = self.append(&line);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            match value {
                Value::String(s) => self.message = Some(s),
                other => self.message = Some(other.to_string()),
            }
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{:?}", value);
        self.put(field, Value::String(buf));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_jsonl_layer_captures_events() {
        let temp = TempDir::new().unwrap();
        let layer = JsonlLayer::new(temp.path().join("logs"), "leader").unwrap();
        let log_path = layer.log_path().to_path_buf();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("join");
            let _enter = span.enter();
            tracing::info!(member_id = "m1", "Member joined");
            tracing::warn!(count = 2u64, "Dropped events");
        });

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<LogLine> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].msg, "Member joined");
        assert_eq!(lines[0].level, "info");
        assert_eq!(lines[0].node, "leader");
        assert_eq!(lines[0].fields["member_id"], "m1");
        assert_eq!(lines[0].span.as_deref(), Some("join"));
        assert_eq!(lines[1].fields["count"], 2);
    }
}
