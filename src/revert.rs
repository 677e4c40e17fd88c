use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use fs_extra::file::{move_file as move_across, CopyOptions};
use serde::Serialize;
use crate::model::{OperationKind, OperationLog, OperationLogEntry};
use crate::progress::{report, CancellationToken, LogLevel, Phase, PhaseCounter, ProgressObserver};

/// What a revert pass managed to undo
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertSummary {
    pub restored: usize,
    pub failed: usize,
    /// Original locations of trashed items, for manual recovery
    pub not_recoverable: Vec<PathBuf>,
    pub aborted: bool,
}

/// Undo a cleanup run, newest entry first.
///
/// Moves are put back where they came from. Trashed items are only
/// reported. A failing entry never stops the rest.
pub fn revert(
    log: &OperationLog,
    cancel: &CancellationToken,
    observer: &dyn ProgressObserver,
) -> RevertSummary {
    let mut summary = RevertSummary::default();
    let mut counter = PhaseCounter::start(observer, Phase::Revert, log.len() as u64);

    for entry in log.operations.iter().rev() {
        if cancel.is_cancelled() {
            report(observer, LogLevel::Warn, "Revert aborted".to_string());
            summary.aborted = true;
            break;
        }

        match entry.kind {
            OperationKind::Move => match restore_move(entry) {
                Ok(()) => {
                    summary.restored += 1;
                    report(observer, LogLevel::Info, format!(
                        "Restored: {}",
                        entry.source.display()
                    ));
                }
                Err(e) => {
                    summary.failed += 1;
                    report(observer, LogLevel::Error, format!(
                        "Could not restore {}: {}",
                        entry.source.display(),
                        e
                    ));
                }
            },
            OperationKind::Trash => {
                summary.not_recoverable.push(entry.source.clone());
                report(observer, LogLevel::Warn, format!(
                    "Not recoverable automatically, check the system trash for {}",
                    entry.source.display()
                ));
            }
        }

        counter.tick();
    }

    summary
}

fn restore_move(entry: &OperationLogEntry) -> io::Result<()> {
    let destination = entry
        .destination
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "move entry has no destination"))?;

    if entry.source.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "original location is occupied",
        ));
    }
    if let Some(parent) = entry.source.parent() {
        fs::create_dir_all(parent)?;
    }

    move_back(destination, &entry.source)
}

fn move_back(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    move_across(from, to, &CopyOptions::new())
        .map(|_| ())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}
