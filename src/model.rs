use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scanned photo or video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Probed duration in seconds, videos only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Same-named file already sits in the move target
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_duplicate: bool,
}

impl FileDescriptor {
    /// Build a descriptor from the file's current metadata
    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            name: file_name_of(path),
            size: metadata.len(),
            last_modified: modified_of(metadata),
            duration: None,
            is_duplicate: false,
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

/// A folder proposed for removal, or surfaced for a manual decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_non_media_files: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_media_files: Vec<FileDescriptor>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_user_decision: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
}

impl FolderDescriptor {
    pub fn empty(path: &Path, last_modified: DateTime<Utc>) -> Self {
        Self {
            path: path.to_path_buf(),
            name: file_name_of(path),
            last_modified,
            has_non_media_files: false,
            non_media_files: Vec::new(),
            requires_user_decision: false,
            size: 0,
        }
    }

    /// Folder whose only survivors are files nobody scheduled
    pub fn needing_decision(
        path: &Path,
        last_modified: DateTime<Utc>,
        non_media_files: Vec<FileDescriptor>,
    ) -> Self {
        let size = non_media_files.iter().map(|f| f.size).sum();
        Self {
            path: path.to_path_buf(),
            name: file_name_of(path),
            last_modified,
            has_non_media_files: true,
            non_media_files,
            requires_user_decision: true,
            size,
        }
    }
}

/// Outcome of one scan pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub photo_files: Vec<FileDescriptor>,
    pub short_videos: Vec<FileDescriptor>,
    pub long_videos: Vec<FileDescriptor>,
    pub empty_folders: Vec<FolderDescriptor>,
}

impl ScanResult {
    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            photos: self.photo_files.len(),
            short_videos: self.short_videos.len(),
            long_videos: self.long_videos.len(),
            empty_folders: self.deletable_folders().count(),
            folders_needing_decision: self
                .empty_folders
                .iter()
                .filter(|f| f.requires_user_decision)
                .count(),
        }
    }

    /// Folders that are safe to remove without asking
    pub fn deletable_folders(&self) -> impl Iterator<Item = &FolderDescriptor> {
        self.empty_folders
            .iter()
            .filter(|f| !f.requires_user_decision)
    }

    pub fn is_empty(&self) -> bool {
        self.photo_files.is_empty()
            && self.short_videos.is_empty()
            && self.long_videos.is_empty()
            && self.empty_folders.is_empty()
    }

    /// Total bytes scheduled for deletion (photos and short videos)
    pub fn reclaimable_bytes(&self) -> u64 {
        self.photo_files
            .iter()
            .chain(self.short_videos.iter())
            .map(|f| f.size)
            .sum()
    }
}

/// Per-category pending counts reported to observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCounts {
    pub photos: usize,
    pub short_videos: usize,
    pub long_videos: usize,
    pub empty_folders: usize,
    pub folders_needing_decision: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Trash,
    Move,
}

/// One destructive action from a cleanup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of a run, the sole input to revert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLog {
    pub timestamp: DateTime<Utc>,
    pub operations: Vec<OperationLogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            operations: Vec::new(),
        }
    }

    pub fn record_trash(&mut self, source: &Path, size: u64) {
        self.operations.push(OperationLogEntry {
            kind: OperationKind::Trash,
            source: source.to_path_buf(),
            destination: None,
            size,
            timestamp: Utc::now(),
        });
    }

    pub fn record_move(&mut self, source: &Path, destination: &Path, size: u64) {
        self.operations.push(OperationLogEntry {
            kind: OperationKind::Move,
            source: source.to_path_buf(),
            destination: Some(destination.to_path_buf()),
            size,
            timestamp: Utc::now(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of the single in-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Scanning,
    Waiting,
    Running,
    Done,
    Aborted,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Scanning => "scanning",
            Stage::Waiting => "waiting",
            Stage::Running => "running",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn modified_of(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .unwrap_or_else(|_| SystemTime::now())
        .into()
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from("/m").join(name),
            name: name.to_string(),
            size,
            last_modified: Utc::now(),
            duration: None,
            is_duplicate: false,
        }
    }

    #[test]
    fn log_entry_uses_type_key() {
        let mut log = OperationLog::new();
        log.record_move(Path::new("/m/a.mp4"), Path::new("/t/a.mp4"), 10);
        log.record_trash(Path::new("/m/b.jpg"), 3);

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["operations"][0]["type"], "move");
        assert_eq!(json["operations"][1]["type"], "trash");
        assert!(json["operations"][1]["destination"].is_null());
    }

    #[test]
    fn photo_descriptor_omits_video_fields() {
        let json = serde_json::to_value(file("a.jpg", 1)).unwrap();
        assert!(json.get("duration").is_none());
        assert!(json.get("isDuplicate").is_none());
        assert!(json.get("lastModified").is_some());
    }

    #[test]
    fn counts_exclude_folders_needing_decision() {
        let now = Utc::now();
        let result = ScanResult {
            photo_files: vec![file("a.jpg", 5)],
            short_videos: vec![file("b.mp4", 7)],
            long_videos: vec![file("c.mp4", 100)],
            empty_folders: vec![
                FolderDescriptor::empty(Path::new("/m/empty"), now),
                FolderDescriptor::needing_decision(
                    Path::new("/m/docs"),
                    now,
                    vec![file("notes.txt", 4)],
                ),
            ],
        };

        let counts = result.counts();
        assert_eq!(counts.photos, 1);
        assert_eq!(counts.empty_folders, 1);
        assert_eq!(counts.folders_needing_decision, 1);
        assert_eq!(result.reclaimable_bytes(), 12);
        assert_eq!(result.empty_folders[1].size, 4);
    }
}
