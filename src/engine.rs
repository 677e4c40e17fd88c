//! The single-flight coordinator driving scan, confirm, cleanup and revert.
//!
//! Stages run `idle -> scanning -> waiting -> running -> done | aborted`.
//! Only one operation may be in flight at a time. A second request is
//! rejected with [`OpsError::Busy`] and leaves the state alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use serde::Serialize;
use crate::classify::classify_videos;
use crate::config::CleanupConfig;
use crate::error::{OpsError, OpsResult};
use crate::model::{FileDescriptor, OperationLog, PendingCounts, ScanResult, Stage};
use crate::ops::FileOps;
use crate::probe::{DurationProbe, FfprobeProbe};
use crate::progress::{
    report, CancellationToken, LogLevel, NullObserver, Phase, PhaseCounter, ProgressEvent,
    ProgressObserver,
};
use crate::revert::{revert, RevertSummary};
use crate::scanner::Scanner;
use crate::store::{ScanDocument, ScanStore};
use crate::verify::verify_scan;

/// A completed scan waiting for confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingScan {
    pub config: CleanupConfig,
    pub result: ScanResult,
}

#[derive(Debug)]
struct EngineState {
    stage: Stage,
    running: bool,
    pending: Option<PendingScan>,
}

/// Snapshot for callers polling the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub stage: Stage,
    pub running: bool,
    pub pending: Option<PendingCounts>,
}

/// Outcome of one cleanup run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub deleted: usize,
    pub moved: usize,
    pub folders_removed: usize,
    pub failed: usize,
    pub total: u64,
    pub dry_run: bool,
    pub aborted: bool,
    /// Where the operation log was written, if it was
    pub log_path: Option<PathBuf>,
}

/// Forwards events and keeps every log line for [`CleanupEngine::logs`]
struct BufferedObserver {
    inner: Arc<dyn ProgressObserver>,
    lines: Mutex<Vec<String>>,
}

impl BufferedObserver {
    fn clear(&self) {
        lock(&self.lines).clear();
    }

    fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl ProgressObserver for BufferedObserver {
    fn on_event(&self, event: ProgressEvent) {
        if let ProgressEvent::Log { message, .. } = &event {
            lock(&self.lines).push(message.clone());
        }
        self.inner.on_event(event);
    }
}

/// Clears the running flag however the operation ends
struct RunGuard<'a> {
    state: &'a Mutex<EngineState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).running = false;
    }
}

pub struct CleanupEngine {
    state: Mutex<EngineState>,
    cancel: CancellationToken,
    observer: BufferedObserver,
    probe: Arc<dyn DurationProbe>,
    store: ScanStore,
}

impl CleanupEngine {
    /// Engine with no observer, probing through ffprobe
    pub fn new(store: ScanStore) -> Self {
        Self {
            state: Mutex::new(EngineState {
                stage: Stage::Idle,
                running: false,
                pending: None,
            }),
            cancel: CancellationToken::new(),
            observer: BufferedObserver {
                inner: Arc::new(NullObserver),
                lines: Mutex::new(Vec::new()),
            },
            probe: Arc::new(FfprobeProbe::from_env()),
            store,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer.inner = observer;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn status(&self) -> EngineStatus {
        let state = lock(&self.state);
        EngineStatus {
            stage: state.stage,
            running: state.running,
            pending: state.pending.as_ref().map(|p| p.result.counts()),
        }
    }

    /// Log lines accumulated since the last scan started
    pub fn logs(&self) -> Vec<String> {
        self.observer.lines()
    }

    /// The scan currently waiting for confirmation
    pub fn pending(&self) -> Option<PendingScan> {
        lock(&self.state).pending.clone()
    }

    /// Request a cooperative abort. Safe to call at any time.
    ///
    /// While a scan is waiting for confirmation nothing is in flight, so the
    /// pending result is discarded right away.
    pub fn abort(&self) {
        self.cancel.cancel();

        let discarded = {
            let mut state = lock(&self.state);
            if state.stage == Stage::Waiting && !state.running {
                state.pending = None;
                state.stage = Stage::Aborted;
                true
            } else {
                false
            }
        };

        if discarded {
            self.emit_stage(Stage::Aborted);
            report(&self.observer, LogLevel::Warn, "Pending scan discarded".to_string());
        }
    }

    /// Scan and classify everything under the start folder.
    ///
    /// Returns `Ok(None)` when aborted. An aborted scan persists nothing.
    pub fn perform_scan(&self, config: &CleanupConfig) -> OpsResult<Option<ScanResult>> {
        let _guard = self.begin()?;
        config.validate()?;

        self.cancel.reset();
        self.observer.clear();
        lock(&self.state).pending = None;
        self.set_stage(Stage::Scanning);

        report(&self.observer, LogLevel::Info, format!(
            "Scanning {}",
            config.start_folder.display()
        ));

        let result = match self.run_scan(config) {
            Ok(result) => result,
            Err(OpsError::Aborted) => {
                report(&self.observer, LogLevel::Warn, "Scan aborted".to_string());
                self.set_stage(Stage::Aborted);
                return Ok(None);
            }
            Err(e) => {
                report(&self.observer, LogLevel::Error, format!("Scan failed: {}", e));
                self.set_stage(Stage::Idle);
                return Err(e);
            }
        };

        if let Err(e) = self.store.save_scan(config, &result) {
            report(&self.observer, LogLevel::Warn, format!(
                "Scan results could not be saved: {}",
                e
            ));
        }

        let counts = result.counts();
        report(&self.observer, LogLevel::Info, format!(
            "Scan complete: {} photos, {} short videos, {} long videos, {} empty folders, {} folders need a decision",
            counts.photos,
            counts.short_videos,
            counts.long_videos,
            counts.empty_folders,
            counts.folders_needing_decision
        ));

        lock(&self.state).pending = Some(PendingScan {
            config: config.clone(),
            result: result.clone(),
        });
        self.set_stage(Stage::Waiting);
        Ok(Some(result))
    }

    fn run_scan(&self, config: &CleanupConfig) -> OpsResult<ScanResult> {
        let scanner = Scanner::new(config.ignore_set(), self.cancel.clone());
        let photo_set = config.photo_extension_set();
        let video_set = config.video_extension_set();
        let start = config.start_folder.as_path();

        let counts = scanner.count_candidates(start, &[&photo_set, &video_set])?;
        let (photo_total, video_total) = (counts[0], counts[1]);
        self.observer.on_event(ProgressEvent::Progress {
            phase: Phase::Counting,
            processed: photo_total + video_total,
            total: photo_total + video_total,
        });
        report(&self.observer, LogLevel::Info, format!(
            "Found {} photo and {} video candidates",
            photo_total, video_total
        ));
        self.cancel.check()?;

        let mut counter = PhaseCounter::start(&self.observer, Phase::PhotoScan, photo_total);
        let photo_files = scanner.scan_with_progress(start, &photo_set, &mut counter)?;
        self.cancel.check()?;

        let mut counter = PhaseCounter::start(&self.observer, Phase::VideoScan, video_total);
        let videos = scanner.scan_with_progress(start, &video_set, &mut counter)?;
        self.cancel.check()?;

        let classified = classify_videos(
            videos,
            config,
            self.probe.as_ref(),
            &self.cancel,
            &self.observer,
        )?;
        self.cancel.check()?;

        let mut counter = PhaseCounter::start(&self.observer, Phase::EmptyFolderAnalysis, 1);
        let moving: &[FileDescriptor] = if config.move_videos {
            &classified.long_videos
        } else {
            &[]
        };
        let empty_folders = scanner.find_future_empty_directories(
            start,
            &photo_files,
            &classified.short_videos,
            moving,
        )?;
        counter.tick();
        self.cancel.check()?;

        let result = ScanResult {
            photo_files,
            short_videos: classified.short_videos,
            long_videos: classified.long_videos,
            empty_folders,
        };
        self.observer.on_event(ProgressEvent::Counts {
            counts: result.counts(),
        });
        Ok(result)
    }

    /// Execute the pending scan. Fails with `NoPendingScan` when there is
    /// nothing waiting, without touching any state.
    pub fn confirm(&self, dry_run: bool) -> OpsResult<CleanupSummary> {
        let _guard = self.begin()?;
        let pending = lock(&self.state)
            .pending
            .take()
            .ok_or(OpsError::NoPendingScan)?;
        Ok(self.run_cleanup(&pending.result, &pending.config, dry_run))
    }

    /// Execute an explicitly supplied scan result
    pub fn execute_cleanup(
        &self,
        result: &ScanResult,
        config: &CleanupConfig,
        dry_run: bool,
    ) -> OpsResult<CleanupSummary> {
        let _guard = self.begin()?;
        lock(&self.state).pending = None;
        Ok(self.run_cleanup(result, config, dry_run))
    }

    fn run_cleanup(&self, result: &ScanResult, config: &CleanupConfig, dry_run: bool) -> CleanupSummary {
        self.cancel.reset();
        self.set_stage(Stage::Running);

        let ops = FileOps::new(dry_run, config.use_trash);
        let mut log = OperationLog::new();
        let mut summary = CleanupSummary {
            dry_run,
            ..Default::default()
        };

        let moves: &[FileDescriptor] = if config.move_videos {
            &result.long_videos
        } else {
            &[]
        };
        let folders: Vec<_> = if config.delete_empty_folders {
            result.deletable_folders().collect()
        } else {
            Vec::new()
        };

        summary.total = (result.photo_files.len()
            + result.short_videos.len()
            + moves.len()
            + folders.len()) as u64;
        let mut remaining = PendingCounts {
            photos: result.photo_files.len(),
            short_videos: result.short_videos.len(),
            long_videos: moves.len(),
            empty_folders: folders.len(),
            folders_needing_decision: 0,
        };

        if dry_run {
            report(&self.observer, LogLevel::Info, "Dry run, nothing on disk will change".to_string());
        }

        let mut counter = PhaseCounter::start(&self.observer, Phase::Cleanup, summary.total);

        let outcome = (|| -> OpsResult<()> {
            if !moves.is_empty() && !dry_run {
                self.ensure_move_target(&config.video_move_target);
            }

            for file in &result.photo_files {
                self.cancel.check()?;
                let removed = ops.remove_path(&file.path, &mut log, &self.observer);
                tally(&mut summary.deleted, &mut summary.failed, removed);
                remaining.photos -= 1;
                counter.tick();
            }
            self.emit_counts(remaining);

            for video in &result.short_videos {
                self.cancel.check()?;
                let removed = ops.remove_path(&video.path, &mut log, &self.observer);
                tally(&mut summary.deleted, &mut summary.failed, removed);
                remaining.short_videos -= 1;
                counter.tick();
            }
            self.emit_counts(remaining);

            for video in moves {
                self.cancel.check()?;
                match ops.move_file(&video.path, &config.video_move_target, &mut log, &self.observer) {
                    Ok(_) => summary.moved += 1,
                    Err(e) => {
                        summary.failed += 1;
                        report(&self.observer, LogLevel::Error, format!(
                            "Failed to move {}: {}",
                            video.path.display(),
                            e
                        ));
                    }
                }
                remaining.long_videos -= 1;
                counter.tick();
            }
            self.emit_counts(remaining);

            // Deepest first, so children always go before their parents
            for folder in &folders {
                self.cancel.check()?;
                let removed = ops.remove_folder(&folder.path, &mut log, &self.observer);
                tally(&mut summary.folders_removed, &mut summary.failed, removed);
                remaining.empty_folders -= 1;
                counter.tick();
            }
            self.emit_counts(remaining);
            Ok(())
        })();

        summary.aborted = outcome.is_err();
        if !dry_run && !log.is_empty() {
            summary.log_path = self.persist_log(&log);
        }

        if summary.aborted {
            report(&self.observer, LogLevel::Warn, format!(
                "Cleanup aborted after {} of {} items",
                counter.processed(),
                counter.total()
            ));
            self.set_stage(Stage::Aborted);
        } else {
            report(&self.observer, LogLevel::Info, format!(
                "Cleanup finished: {} deleted, {} moved, {} folders removed, {} failed",
                summary.deleted, summary.moved, summary.folders_removed, summary.failed
            ));
            self.set_stage(Stage::Done);
        }
        summary
    }

    /// Undo a cleanup run from its operation log
    pub fn revert_operation(&self, log: &OperationLog) -> OpsResult<RevertSummary> {
        let _guard = self.begin()?;
        self.cancel.reset();
        self.set_stage(Stage::Running);

        report(&self.observer, LogLevel::Info, format!(
            "Reverting {} operations",
            log.len()
        ));
        let summary = revert(log, &self.cancel, &self.observer);
        report(&self.observer, LogLevel::Info, format!(
            "Revert finished: {} restored, {} failed, {} not recoverable",
            summary.restored,
            summary.failed,
            summary.not_recoverable.len()
        ));

        self.set_stage(if summary.aborted { Stage::Aborted } else { Stage::Done });
        Ok(summary)
    }

    /// Revert from a serialized operation log document
    pub fn revert_serialized(&self, json: &str) -> OpsResult<RevertSummary> {
        let log: OperationLog = serde_json::from_str(json)?;
        self.revert_operation(&log)
    }

    pub fn load_scan_results(&self, path: &Path) -> OpsResult<ScanDocument> {
        let document = ScanStore::load_scan(path)?;
        report(&self.observer, LogLevel::Info, format!(
            "Loaded scan from {} ({})",
            path.display(),
            document.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
        Ok(document)
    }

    pub fn verify_loaded_files(&self, document: &ScanDocument) -> ScanResult {
        verify_scan(
            &document.scan_results.results,
            &document.configuration,
            &self.observer,
        )
    }

    /// Put a loaded and verified scan up for confirmation without rescanning
    pub fn resume_loaded(&self, config: CleanupConfig, result: ScanResult) -> OpsResult<PendingCounts> {
        let _guard = self.begin()?;
        let counts = result.counts();
        lock(&self.state).pending = Some(PendingScan { config, result });
        self.set_stage(Stage::Waiting);
        self.emit_counts(counts);
        Ok(counts)
    }

    fn begin(&self) -> OpsResult<RunGuard<'_>> {
        let mut state = lock(&self.state);
        if state.running {
            return Err(OpsError::Busy);
        }
        state.running = true;
        Ok(RunGuard { state: &self.state })
    }

    fn set_stage(&self, stage: Stage) {
        lock(&self.state).stage = stage;
        self.emit_stage(stage);
    }

    fn emit_stage(&self, stage: Stage) {
        log::debug!("Stage -> {}", stage);
        self.observer.on_event(ProgressEvent::Stage { stage });
    }

    fn emit_counts(&self, counts: PendingCounts) {
        self.observer.on_event(ProgressEvent::Counts { counts });
    }

    fn ensure_move_target(&self, target: &Path) {
        if target.is_dir() {
            return;
        }
        match fs::create_dir_all(target) {
            Ok(()) => report(&self.observer, LogLevel::Info, format!(
                "Created {}",
                target.display()
            )),
            Err(e) => report(&self.observer, LogLevel::Error, format!(
                "Could not create {}: {}",
                target.display(),
                e
            )),
        }
    }

    fn persist_log(&self, log: &OperationLog) -> Option<PathBuf> {
        match self.store.save_operation_log(log) {
            Ok(path) => {
                report(&self.observer, LogLevel::Info, format!(
                    "Operation log saved to {}",
                    path.display()
                ));
                Some(path)
            }
            Err(e) => {
                report(&self.observer, LogLevel::Warn, format!(
                    "Operation log could not be saved, revert will not be possible: {}",
                    e
                ));
                None
            }
        }
    }
}

fn tally(ok: &mut usize, failed: &mut usize, success: bool) {
    if success {
        *ok += 1;
    } else {
        *failed += 1;
    }
}

/// A panicked holder leaves plain data behind, so keep using it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
