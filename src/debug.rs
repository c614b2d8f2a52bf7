use crate::config;
use crate::provider_client::{RawResponse, RequestMeta};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Serializable view of the debug panel.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub last_request: Option<RequestMeta>,
    /// Last provider body as text, cut at `RAW_PANEL_MAX_CHARS`.
    pub raw_body: Option<String>,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Default)]
struct DebugInner {
    last_response: Option<RawResponse>,
    errors: VecDeque<ErrorEntry>,
}

/// Last provider response, its metadata, and a bounded error log.
pub struct DebugState {
    inner: RwLock<DebugInner>,
    dump_dir: Option<PathBuf>,
}

impl DebugState {
    /// Debug state that also writes JSON dumps into `dump_dir`.
    pub fn new(dump_dir: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(DebugInner::default()),
            dump_dir,
        }
    }

    pub async fn record_response(&self, raw: &RawResponse) {
        let mut inner = self.inner.write().await;
        inner.last_response = Some(raw.clone());
    }

    pub async fn log_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().await;
        if inner.errors.len() >= config::ERROR_LOG_CAPACITY {
            inner.errors.pop_front();
        }
        inner.errors.push_back(ErrorEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Body of the last provider response, byte for byte.
    pub async fn last_body(&self) -> Option<Vec<u8>> {
        self.inner
            .read()
            .await
            .last_response
            .as_ref()
            .map(|r| r.body.clone())
    }

    pub async fn snapshot(&self) -> DebugSnapshot {
        let inner = self.inner.read().await;
        DebugSnapshot {
            last_request: inner.last_response.as_ref().map(|r| r.meta.clone()),
            raw_body: inner
                .last_response
                .as_ref()
                .map(|r| r.preview(config::RAW_PANEL_MAX_CHARS)),
            errors: inner.errors.iter().cloned().collect(),
        }
    }

    /// Write `{slug}_{name}.json` into the dump directory. Failures are only logged.
    pub fn dump_json<T: Serialize>(&self, name: &str, data: &T) -> Option<PathBuf> {
        let dir = self.dump_dir.as_deref()?;
        match write_dump(dir, name, data) {
            Ok(path) => {
                info!(path = %path.display(), "saved debug JSON");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, name, "failed to save debug JSON");
                None
            }
        }
    }

    /// Newest file in the dump directory.
    pub fn latest_dump(&self) -> Option<PathBuf> {
        newest_file(self.dump_dir.as_deref()?, "")
    }

    /// Write raw bytes unchanged, e.g. the provider body.
    pub fn dump_bytes(&self, name: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.dump_dir.as_deref()?;
        let path = dir.join(format!("{}_{}.json", now_slug(), name));
        let result = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, bytes));
        match result {
            Ok(()) => {
                info!(path = %path.display(), "saved debug dump");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, name, "failed to save debug dump");
                None
            }
        }
    }
}

fn write_dump<T: Serialize>(dir: &Path, name: &str, data: &T) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let value = safe_redact(serde_json::to_value(data)?);
    let path = dir.join(format!("{}_{}.json", now_slug(), name));
    std::fs::write(&path, serde_json::to_vec_pretty(&value)?)?;
    Ok(path)
}

/// Most recently modified file in `dir` whose name starts with `prefix`.
/// Ties on modification time go to the greater name (slugs sort by time).
pub fn newest_file(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list directory");
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.file_name(), entry.path()))
        })
        .max_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
        .map(|(_, _, path)| path)
}

pub fn now_slug() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Replace secret-bearing keys with `***`, recursively.
pub fn safe_redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if config::REDACTED_KEYS.contains(&k.as_str()) {
                        (k, Value::String("***".to_string()))
                    } else {
                        (k, safe_redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(safe_redact).collect()),
        other => other,
    }
}
