//! Progress reporting and cooperative cancellation.
//!
//! The core never talks to a transport directly. It pushes [`ProgressEvent`]s
//! into a [`ProgressObserver`], and polls a [`CancellationToken`] at its
//! checkpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use serde::Serialize;
use crate::error::{OpsError, OpsResult};
use crate::model::{PendingCounts, Stage};

/// Shared abort flag, cheap to clone into every recursive call
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint helper for `?` call sites
    pub fn check(&self) -> OpsResult<()> {
        if self.is_cancelled() {
            Err(OpsError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Sub-phase a progress counter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Counting,
    PhotoScan,
    VideoScan,
    DurationAnalysis,
    EmptyFolderAnalysis,
    Cleanup,
    Revert,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Counting => "Counting files",
            Phase::PhotoScan => "Scanning photos",
            Phase::VideoScan => "Scanning videos",
            Phase::DurationAnalysis => "Analyzing video durations",
            Phase::EmptyFolderAnalysis => "Looking for empty folders",
            Phase::Cleanup => "Cleaning up",
            Phase::Revert => "Reverting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Everything the core reports while it works
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    Stage { stage: Stage },
    Progress { phase: Phase, processed: u64, total: u64 },
    Counts { counts: PendingCounts },
    Log { level: LogLevel, message: String },
}

pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Drops every event
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Forwards events over a channel to whoever renders them
pub struct ChannelObserver {
    tx: Mutex<Sender<ProgressEvent>>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(tx) = self.tx.lock() {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(event);
        }
    }
}

/// Keeps every event in memory, handy for assertions and the log buffer
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Log { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Emits a log line to both the `log` facade and the observer
pub(crate) fn report(observer: &dyn ProgressObserver, level: LogLevel, message: String) {
    match level {
        LogLevel::Info => log::info!("{}", message),
        LogLevel::Warn => log::warn!("{}", message),
        LogLevel::Error => log::error!("{}", message),
    }
    observer.on_event(ProgressEvent::Log { level, message });
}

/// Fixed-total counter for one phase
pub(crate) struct PhaseCounter<'a> {
    observer: &'a dyn ProgressObserver,
    phase: Phase,
    processed: u64,
    total: u64,
}

impl<'a> PhaseCounter<'a> {
    pub fn start(observer: &'a dyn ProgressObserver, phase: Phase, total: u64) -> Self {
        observer.on_event(ProgressEvent::Progress {
            phase,
            processed: 0,
            total,
        });
        Self {
            observer,
            phase,
            processed: 0,
            total,
        }
    }

    /// Count one item. Never runs past the announced total.
    pub fn tick(&mut self) {
        if self.processed < self.total {
            self.processed += 1;
        }
        self.observer.on_event(ProgressEvent::Progress {
            phase: self.phase,
            processed: self.processed,
            total: self.total,
        });
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
