//! Destructive filesystem actions: trash, permanent delete and move.
//!
//! Every successful live action is appended to the run's [`OperationLog`].
//! In dry-run mode nothing on disk changes and each item produces exactly
//! one `[DRY RUN]` log line.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use fs_extra::file::{move_file as move_across, CopyOptions};
use walkdir::WalkDir;
use crate::error::{OpsError, OpsResult};
use crate::model::OperationLog;
use crate::progress::{report, LogLevel, ProgressObserver};

pub const DRY_RUN_PREFIX: &str = "[DRY RUN]";

#[derive(Debug, Clone, Copy)]
pub struct FileOps {
    dry_run: bool,
    use_trash: bool,
}

impl FileOps {
    pub fn new(dry_run: bool, use_trash: bool) -> Self {
        Self { dry_run, use_trash }
    }

    /// Remove a file or directory, to the trash when possible.
    ///
    /// Returns false when the path could not be inspected or removed. The
    /// failure has already been reported at that point.
    pub fn remove_path(
        &self,
        path: &Path,
        log: &mut OperationLog,
        observer: &dyn ProgressObserver,
    ) -> bool {
        // Size has to be taken while the path still exists
        let size = match path_size(path) {
            Ok(size) => size,
            Err(e) => {
                report(observer, LogLevel::Warn, format!(
                    "Skipping {}: {}",
                    path.display(),
                    e
                ));
                return false;
            }
        };

        if self.dry_run {
            report(observer, LogLevel::Info, format!(
                "{} Would delete {} ({})",
                DRY_RUN_PREFIX,
                path.display(),
                format_size(size)
            ));
            return true;
        }

        if self.use_trash {
            match trash::delete(path) {
                Ok(()) => {
                    log.record_trash(path, size);
                    report(observer, LogLevel::Info, format!(
                        "Moved to trash: {} ({})",
                        path.display(),
                        format_size(size)
                    ));
                    return true;
                }
                Err(e) => {
                    report(observer, LogLevel::Warn, format!(
                        "Trash unavailable for {} ({}), deleting permanently",
                        path.display(),
                        e
                    ));
                }
            }
        }

        match delete_permanently(path) {
            Ok(()) => {
                log.record_trash(path, size);
                report(observer, LogLevel::Info, format!(
                    "Permanently deleted: {} ({})",
                    path.display(),
                    format_size(size)
                ));
                true
            }
            Err(e) => {
                report(observer, LogLevel::Error, format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                ));
                false
            }
        }
    }

    /// Remove a folder found empty at scan time, unless something has
    /// appeared in it since.
    pub fn remove_folder(
        &self,
        path: &Path,
        log: &mut OperationLog,
        observer: &dyn ProgressObserver,
    ) -> bool {
        if !self.dry_run {
            match is_dir_empty(path) {
                Ok(true) => {}
                Ok(false) => {
                    report(observer, LogLevel::Warn, format!(
                        "Folder is no longer empty, keeping it: {}",
                        path.display()
                    ));
                    return false;
                }
                Err(e) => {
                    report(observer, LogLevel::Warn, format!(
                        "Skipping folder {}: {}",
                        path.display(),
                        e
                    ));
                    return false;
                }
            }
        }
        self.remove_path(path, log, observer)
    }

    /// Move `path` into `target_dir` under a name nobody else holds.
    ///
    /// The destination is `target_dir/<name>`, or `stem(1).ext`,
    /// `stem(2).ext` and so on when taken. Existing files are never
    /// overwritten.
    pub fn move_file(
        &self,
        path: &Path,
        target_dir: &Path,
        log: &mut OperationLog,
        observer: &dyn ProgressObserver,
    ) -> OpsResult<PathBuf> {
        let file_name = path.file_name().ok_or_else(|| {
            OpsError::io(path, io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
        })?;

        if self.dry_run {
            let destination = unique_destination(target_dir, Path::new(file_name));
            report(observer, LogLevel::Info, format!(
                "{} Would move {} -> {}",
                DRY_RUN_PREFIX,
                path.display(),
                destination.display()
            ));
            return Ok(destination);
        }

        let size = fs::metadata(path)
            .map_err(|e| OpsError::io(path, e))?
            .len();

        fs::create_dir_all(target_dir).map_err(|e| OpsError::io(target_dir, e))?;
        let destination = reserve_destination(target_dir, Path::new(file_name))?;

        if let Err(rename_err) = fs::rename(path, &destination) {
            // Typically a cross-device move. Copy then delete instead.
            log::debug!(
                "Rename {} -> {} failed ({}), copying instead",
                path.display(),
                destination.display(),
                rename_err
            );
            let mut options = CopyOptions::new();
            // Only our own empty placeholder sits there
            options.overwrite = true;
            if let Err(e) = move_across(path, &destination, &options) {
                let _ = fs::remove_file(&destination);
                return Err(OpsError::io(path, io::Error::new(io::ErrorKind::Other, e.to_string())));
            }
        }

        log.record_move(path, &destination, size);
        report(observer, LogLevel::Info, format!(
            "Moved: {} -> {}",
            path.display(),
            destination.display()
        ));
        Ok(destination)
    }
}

/// First free `name`, `stem(1).ext`, `stem(2).ext`, ... in `target_dir`
pub fn unique_destination(target_dir: &Path, file_name: &Path) -> PathBuf {
    candidate_names(target_dir, file_name)
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| target_dir.join(file_name))
}

/// Claim a free name by creating it. Two writers can never end up with the
/// same destination.
fn reserve_destination(target_dir: &Path, file_name: &Path) -> OpsResult<PathBuf> {
    for candidate in candidate_names(target_dir, file_name) {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(OpsError::io(&candidate, e)),
        }
    }
    Err(OpsError::io(
        target_dir,
        io::Error::new(io::ErrorKind::Other, "no free destination name"),
    ))
}

fn candidate_names(target_dir: &Path, file_name: &Path) -> impl Iterator<Item = PathBuf> {
    let target_dir = target_dir.to_path_buf();
    let original = target_dir.join(file_name);
    let stem = file_name
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let extension = file_name
        .extension()
        .map(|e| e.to_string_lossy().to_string());

    std::iter::once(original).chain((1u64..).map(move |counter| {
        let name = match &extension {
            Some(ext) => format!("{}({}).{}", stem, counter, ext),
            None => format!("{}({})", stem, counter),
        };
        target_dir.join(name)
    }))
}

fn delete_permanently(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn is_dir_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// File size, or the combined size of every file below a directory
fn path_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    Ok(WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum())
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperationKind;
    use crate::progress::{NullObserver, RecordingObserver};
    use tempfile::tempdir;

    fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }

    #[test]
    fn second_move_gets_a_numbered_name() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("Long Videos");
        let first = dir.path().join("a/clip.mp4");
        let second = dir.path().join("b/clip.mp4");
        write(&first, b"first");
        write(&second, b"second");

        let ops = FileOps::new(false, false);
        let mut log = OperationLog::new();
        let d1 = ops.move_file(&first, &target, &mut log, &NullObserver).unwrap();
        let d2 = ops.move_file(&second, &target, &mut log, &NullObserver).unwrap();

        assert_eq!(d1, target.join("clip.mp4"));
        assert_eq!(d2, target.join("clip(1).mp4"));
        assert_eq!(fs::read(&d1).unwrap(), b"first");
        assert_eq!(fs::read(&d2).unwrap(), b"second");
        assert!(!first.exists() && !second.exists());

        assert_eq!(log.len(), 2);
        assert_eq!(log.operations[1].kind, OperationKind::Move);
        assert_eq!(log.operations[1].destination.as_deref(), Some(d2.as_path()));
        assert_eq!(log.operations[1].size, 6);
    }

    #[test]
    fn names_without_extension_are_numbered_too() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("README"), b"x");
        write(&dir.path().join("README(1)"), b"x");
        assert_eq!(
            unique_destination(dir.path(), Path::new("README")),
            dir.path().join("README(2)")
        );
    }

    #[test]
    fn permanent_delete_records_size_first() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("a.jpg");
        write(&photo, b"12345");

        let mut log = OperationLog::new();
        assert!(FileOps::new(false, false).remove_path(&photo, &mut log, &NullObserver));
        assert!(!photo.exists());
        assert_eq!(log.operations[0].kind, OperationKind::Trash);
        assert_eq!(log.operations[0].size, 5);
    }

    #[test]
    fn directory_size_is_recursive() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("d/one"), b"123");
        write(&dir.path().join("d/sub/two"), b"45");
        assert_eq!(path_size(&dir.path().join("d")).unwrap(), 5);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("a.jpg");
        let video = dir.path().join("c.mp4");
        write(&photo, b"1");
        write(&video, b"2");
        let target = dir.path().join("target");

        let ops = FileOps::new(true, true);
        let observer = RecordingObserver::new();
        let mut log = OperationLog::new();

        assert!(ops.remove_path(&photo, &mut log, &observer));
        let dest = ops.move_file(&video, &target, &mut log, &observer).unwrap();

        assert_eq!(dest, target.join("c.mp4"));
        assert!(photo.exists() && video.exists());
        assert!(!target.exists());
        assert!(log.is_empty());

        let lines = observer.log_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with(DRY_RUN_PREFIX)));
    }

    #[test]
    fn missing_path_is_reported_not_removed() {
        let dir = tempdir().unwrap();
        let mut log = OperationLog::new();
        let ok = FileOps::new(true, true).remove_path(&dir.path().join("gone.jpg"), &mut log, &NullObserver);
        assert!(!ok);
    }

    #[test]
    fn folder_that_filled_up_is_kept() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("was_empty");
        write(&folder.join("new.txt"), b"surprise");

        let observer = RecordingObserver::new();
        let mut log = OperationLog::new();
        assert!(!FileOps::new(false, false).remove_folder(&folder, &mut log, &observer));
        assert!(folder.exists());
        assert!(log.is_empty());
        assert!(observer.log_lines()[0].contains("no longer empty"));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
