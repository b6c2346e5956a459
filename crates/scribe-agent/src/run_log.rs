use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use scribe_core::event::EventBus;
use scribe_core::types::{PlanId, RunEvent};

/// JSONL run logger.
///
/// Subscribes to the event bus and writes one JSON object per line to
/// `{log_dir}/run_{timestamp}.jsonl`. Every line is flushed as it is written,
/// so a crashed run still leaves a readable prefix. Nested plans share the
/// file; logging stops when the first plan seen finishes, or once the
/// cancel token fires and no buffered events remain.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    plan_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Start logging in the background.
    ///
    /// The subscription is taken before the task is spawned, so no event
    /// published after this call is missed. The task resolves to the log file
    /// path, or `None` if the file could not be created.
    pub fn spawn(self, events: &EventBus, cancel: CancellationToken) -> JoinHandle<Option<PathBuf>> {
        let rx = events.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(
        self,
        mut rx: tokio::sync::broadcast::Receiver<RunEvent>,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, dir = %self.log_dir.display(), "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let log_path = self.log_dir.join(format!("run_{}.jsonl", timestamp));
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);
        let mut root: Option<PlanId> = None;

        loop {
            // Drain buffered events before honoring cancellation
            let event = tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "RunLogger lagged, skipped events");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("EventBus closed, RunLogger stopping");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            };

            if root.is_none() {
                root = Some(event.plan_id().clone());
            }

            if let Ok(line) = serde_json::to_string(&entry_for(&event)) {
                if let Err(e) = writer.write_all(format!("{}\n", line).as_bytes()).await {
                    error!(error = %e, "Failed to write log entry");
                    break;
                }
                if let Err(e) = writer.flush().await {
                    error!(error = %e, "Failed to flush log");
                }
            }

            let finished_root = matches!(&event, RunEvent::PlanFinished { plan_id, .. } if Some(plan_id) == root.as_ref());
            if finished_root {
                break;
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }
}

fn entry_for(event: &RunEvent) -> LogEntry {
    let (node_id, detail) = match event {
        RunEvent::PlanStarted {
            title, node_count, ..
        } => (None, Some(json!({ "title": title, "node_count": node_count }))),
        RunEvent::NodeQueued { node_id, .. } => (Some(node_id.clone()), None),
        RunEvent::NodeStarted {
            node_id, executor, ..
        } => (Some(node_id.clone()), Some(json!({ "executor": executor }))),
        RunEvent::NodeCompleted {
            node_id, elapsed_ms, ..
        } => (Some(node_id.clone()), Some(json!({ "elapsed_ms": elapsed_ms }))),
        RunEvent::NodeFailed { node_id, error, .. } => {
            (Some(node_id.clone()), Some(json!({ "error": error })))
        }
        RunEvent::CapabilityInvoked {
            node_id,
            capability,
            elapsed_ms,
            ok,
            ..
        } => (
            Some(node_id.clone()),
            Some(json!({ "capability": capability, "elapsed_ms": elapsed_ms, "ok": ok })),
        ),
        RunEvent::PlanDeadlocked { stuck, .. } => (None, Some(json!({ "stuck": stuck }))),
        RunEvent::PlanFinished {
            status,
            completed,
            failed,
            ..
        } => (
            None,
            Some(json!({ "status": status, "completed": completed, "failed": failed })),
        ),
    };

    LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        plan_id: event.plan_id().0.clone(),
        event_type: event.kind(),
        node_id,
        detail,
    }
}
