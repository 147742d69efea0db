//! Progress reporting for long-running work.
//!
//! [`ProgressReporter`] is a small pub/sub hub. Jobs call
//! [`start`](ProgressReporter::start), [`report`](ProgressReporter::report)
//! and [`complete`](ProgressReporter::complete) on an operation, or post
//! one-off messages and errors. Every subscriber gets its own unbounded
//! channel, so a slow subscriber never stalls a job and a dropped one is
//! simply pruned on the next send.
//!
//! The CLI renders events on **stderr** so stdout remains parseable for
//! scripts: human text or one JSON object per line, chosen by
//! [`ProgressMode`].

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type OperationId = u64;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        id: OperationId,
        operation: String,
        total: u64,
    },
    Progress {
        id: OperationId,
        operation: String,
        processed: u64,
        total: u64,
    },
    Completed {
        id: OperationId,
        operation: String,
    },
    Message {
        text: String,
    },
    Error {
        text: String,
    },
}

/// Token for one running operation, returned by [`ProgressReporter::start`].
#[derive(Debug)]
pub struct ProgressHandle {
    id: OperationId,
    operation: String,
    total: u64,
}

impl ProgressHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Snapshot of an operation that has started but not completed.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveOperation {
    pub id: OperationId,
    pub operation: String,
    pub processed: u64,
    pub total: u64,
}

#[derive(Default)]
struct Hub {
    next_id: OperationId,
    subscribers: Vec<mpsc::UnboundedSender<ProgressEvent>>,
    live: HashMap<OperationId, LiveOperation>,
}

impl Hub {
    fn publish(&mut self, event: ProgressEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Cheap-to-clone progress hub shared by every job.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    hub: Arc<Mutex<Hub>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        // Only plain data is held under the lock, so a poisoned guard is still usable.
        self.hub.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub().subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub().subscribers.len()
    }

    pub fn start(&self, operation: impl Into<String>, total: u64) -> ProgressHandle {
        let operation = operation.into();
        let mut hub = self.hub();
        hub.next_id += 1;
        let id = hub.next_id;
        hub.live.insert(
            id,
            LiveOperation {
                id,
                operation: operation.clone(),
                processed: 0,
                total,
            },
        );
        hub.publish(ProgressEvent::Started {
            id,
            operation: operation.clone(),
            total,
        });
        ProgressHandle {
            id,
            operation,
            total,
        }
    }

    pub fn report(&self, handle: &ProgressHandle, processed: u64) {
        let mut hub = self.hub();
        if let Some(live) = hub.live.get_mut(&handle.id) {
            live.processed = processed;
        }
        hub.publish(ProgressEvent::Progress {
            id: handle.id,
            operation: handle.operation.clone(),
            processed,
            total: handle.total,
        });
    }

    /// Remove the operation from the live set and emit its terminal event.
    pub fn complete(&self, handle: ProgressHandle) {
        let mut hub = self.hub();
        hub.live.remove(&handle.id);
        hub.publish(ProgressEvent::Completed {
            id: handle.id,
            operation: handle.operation,
        });
    }

    pub fn report_message(&self, text: impl Into<String>) {
        self.hub().publish(ProgressEvent::Message { text: text.into() });
    }

    pub fn report_error(&self, text: impl Into<String>) {
        self.hub().publish(ProgressEvent::Error { text: text.into() });
    }

    pub fn live_operations(&self) -> Vec<LiveOperation> {
        let mut ops: Vec<_> = self.hub().live.values().cloned().collect();
        ops.sort_by_key(|op| op.id);
        ops
    }
}

/// Turns events into output. Implementations write to stderr.
pub trait ProgressRenderer: Send + Sync {
    fn render(&self, event: &ProgressEvent);
}

/// Human-friendly progress on stderr: "find duplicates  1,234 / 5,000".
pub struct StderrProgress;

impl ProgressRenderer for StderrProgress {
    fn render(&self, event: &ProgressEvent) {
        let line = match event {
            ProgressEvent::Started {
                operation, total, ..
            } => format!("{}  started  {} items\n", operation, format_number(*total)),
            ProgressEvent::Progress {
                operation,
                processed,
                total,
                ..
            } => format!(
                "{}  {} / {}\n",
                operation,
                format_number(*processed),
                format_number(*total)
            ),
            ProgressEvent::Completed { operation, .. } => format!("{}  done\n", operation),
            ProgressEvent::Message { text } => format!("{}\n", text),
            ProgressEvent::Error { text } => format!("error: {}\n", text),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressRenderer for JsonProgress {
    fn render(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn renderer(&self) -> Option<Box<dyn ProgressRenderer>> {
        match self {
            ProgressMode::Off => None,
            ProgressMode::Human => Some(Box::new(StderrProgress)),
            ProgressMode::Json => Some(Box::new(JsonProgress)),
        }
    }

    /// Subscribe a renderer for this mode. The task ends once the reporter
    /// and all its clones are dropped.
    pub fn attach(&self, reporter: &ProgressReporter) -> Option<JoinHandle<()>> {
        let renderer = self.renderer()?;
        let mut rx = reporter.subscribe();
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                renderer.render(&event);
            }
        }))
    }
}
