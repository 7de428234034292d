//! Child output filtering and the events the supervisor emits.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;

use super::Role;
use crate::config::settings::OutputSettings;

/// Default number of events kept by [`ConsoleBuffer`].
const DEFAULT_CONSOLE_CAPACITY: usize = 2_000;

// ─── Filter ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Empty, whitespace-only or deny-listed. Not delivered.
    Suppressed,
    /// The ready marker. Delivered as [`ProcessEvent::Ready`] instead of text.
    Ready,
    /// Delivered as [`ProcessEvent::Output`] with this trimmed text.
    Pass(String),
}

#[derive(Debug, Clone)]
pub struct OutputFilter {
    noise: Vec<String>,
    ready_marker: Option<String>,
    ready_message: String,
}

impl OutputFilter {
    pub fn new(noise: &[String], ready_marker: &str, ready_message: &str) -> Self {
        let marker = ready_marker.trim().to_lowercase();
        Self {
            noise: noise
                .iter()
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
            ready_marker: (!marker.is_empty()).then_some(marker),
            ready_message: ready_message.to_string(),
        }
    }

    pub fn from_settings(settings: &OutputSettings) -> Self {
        Self::new(&settings.noise, &settings.ready_marker, &settings.ready_message)
    }

    /// Trims only; nothing is dropped or translated.
    pub fn passthrough() -> Self {
        Self::new(&[], "", "")
    }

    pub fn ready_message(&self) -> &str {
        &self.ready_message
    }

    pub fn classify(&self, raw: &str) -> LineClass {
        let line = raw.trim();
        if line.is_empty() {
            return LineClass::Suppressed;
        }
        let lower = line.to_lowercase();
        if let Some(marker) = &self.ready_marker {
            if lower.contains(marker.as_str()) {
                return LineClass::Ready;
            }
        }
        if self.noise.iter().any(|n| lower.contains(n.as_str())) {
            return LineClass::Suppressed;
        }
        LineClass::Pass(line.to_string())
    }
}

// ─── Events ──────────────────────────────────────────────────

/// Everything a supervised process reports. Per process lifetime the order
/// is `Started`, then output in child order, then exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started {
        role: Role,
        display_name: String,
        pid: u32,
    },
    Output {
        role: Role,
        line: String,
    },
    Ready {
        role: Role,
        message: String,
    },
    Warning {
        role: Role,
        message: String,
    },
    Finished {
        role: Role,
        display_name: String,
        exit_code: Option<i32>,
    },
}

impl ProcessEvent {
    pub fn role(&self) -> Role {
        match self {
            Self::Started { role, .. }
            | Self::Output { role, .. }
            | Self::Ready { role, .. }
            | Self::Warning { role, .. }
            | Self::Finished { role, .. } => *role,
        }
    }
}

/// Receives supervisor events. Called from the output worker task, so
/// implementations must not block for long; UI marshaling is their concern.
pub trait ProcessObserver: Send + Sync {
    fn notify(&self, event: ProcessEvent);
}

impl ProcessObserver for mpsc::UnboundedSender<ProcessEvent> {
    fn notify(&self, event: ProcessEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(event);
    }
}

// ─── Console buffer ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEntry {
    /// Sequential id for polling (`GET /api/console?since=<id>`)
    pub id: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    pub event: ProcessEvent,
}

struct Ring {
    entries: VecDeque<ConsoleEntry>,
    next_id: u64,
    capacity: usize,
}

/// Observer keeping the most recent events for pollers, mirroring each one
/// to the log.
pub struct ConsoleBuffer {
    ring: Mutex<Ring>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CONSOLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CONSOLE_CAPACITY)),
                next_id: 1,
                capacity: capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        match self.ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Console buffer lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn push(&self, event: ProcessEvent) -> u64 {
        let mut ring = self.lock();
        let id = ring.next_id;
        ring.next_id += 1;
        if ring.entries.len() >= ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(ConsoleEntry {
            id,
            timestamp: current_timestamp(),
            event,
        });
        id
    }

    /// Entries with `id > since_id`.
    pub fn get_since(&self, since_id: u64) -> Vec<ConsoleEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.id > since_id)
            .cloned()
            .collect()
    }

    /// The most recent `count` entries, oldest first.
    pub fn get_recent(&self, count: usize) -> Vec<ConsoleEntry> {
        let ring = self.lock();
        let skip = ring.entries.len().saturating_sub(count);
        ring.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessObserver for ConsoleBuffer {
    fn notify(&self, event: ProcessEvent) {
        match &event {
            ProcessEvent::Started { role, display_name, pid } => {
                tracing::info!("[{}] '{}' started with PID {}", role, display_name, pid)
            }
            ProcessEvent::Output { role, line } => tracing::debug!("[{}] {}", role, line),
            ProcessEvent::Ready { role, message } => tracing::info!("[{}] {}", role, message),
            ProcessEvent::Warning { role, message } => tracing::warn!("[{}] {}", role, message),
            ProcessEvent::Finished { role, display_name, exit_code } => {
                tracing::info!("[{}] '{}' finished (exit code {:?})", role, display_name, exit_code)
            }
        }
        self.push(event);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
