//! Timestamped JSON snapshots of scans and operation logs.

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use crate::config::CleanupConfig;
use crate::error::{OpsError, OpsResult};
use crate::model::{OperationLog, ScanResult};

const SCANS_DIR: &str = "scans";
const LOGS_DIR: &str = "logs";
const SCAN_PREFIX: &str = "scan-results-";
const LOG_PREFIX: &str = "operation-log-";
const FILE_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

/// A persisted scan together with the configuration that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDocument {
    pub timestamp: DateTime<Utc>,
    pub start_folder: PathBuf,
    pub video_move_target: PathBuf,
    pub configuration: CleanupConfig,
    pub scan_results: ScanResultsDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultsDocument {
    pub total_photos: usize,
    pub total_short_videos: usize,
    pub total_long_videos: usize,
    pub total_empty_folders: usize,
    #[serde(flatten)]
    pub results: ScanResult,
}

impl ScanDocument {
    pub fn new(config: &CleanupConfig, result: &ScanResult) -> Self {
        Self {
            timestamp: Utc::now(),
            start_folder: config.start_folder.clone(),
            video_move_target: config.video_move_target.clone(),
            configuration: config.clone(),
            scan_results: ScanResultsDocument {
                total_photos: result.photo_files.len(),
                total_short_videos: result.short_videos.len(),
                total_long_videos: result.long_videos.len(),
                total_empty_folders: result.empty_folders.len(),
                results: result.clone(),
            },
        }
    }

    pub fn into_parts(self) -> (CleanupConfig, ScanResult) {
        (self.configuration, self.scan_results.results)
    }
}

/// Where scans and operation logs live on disk
#[derive(Debug, Clone)]
pub struct ScanStore {
    root: PathBuf,
}

impl ScanStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/mediasweep`
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("mediasweep"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scans_dir(&self) -> PathBuf {
        self.root.join(SCANS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn save_scan(&self, config: &CleanupConfig, result: &ScanResult) -> OpsResult<PathBuf> {
        let document = ScanDocument::new(config, result);
        let path = timestamped_path(&self.scans_dir(), SCAN_PREFIX)?;
        write_json(&path, &document)?;
        log::info!("Saved scan results to {}", path.display());
        Ok(path)
    }

    pub fn load_scan(path: &Path) -> OpsResult<ScanDocument> {
        read_json(path)
    }

    pub fn save_operation_log(&self, log: &OperationLog) -> OpsResult<PathBuf> {
        let path = timestamped_path(&self.logs_dir(), LOG_PREFIX)?;
        write_json(&path, log)?;
        log::info!("Saved operation log to {}", path.display());
        Ok(path)
    }

    pub fn load_operation_log(path: &Path) -> OpsResult<OperationLog> {
        read_json(path)
    }

    /// Saved scans, newest first
    pub fn list_scans(&self) -> OpsResult<Vec<PathBuf>> {
        list_documents(&self.scans_dir(), SCAN_PREFIX)
    }

    /// Saved operation logs, newest first
    pub fn list_operation_logs(&self) -> OpsResult<Vec<PathBuf>> {
        list_documents(&self.logs_dir(), LOG_PREFIX)
    }
}

/// Free-function form of [`ScanStore::load_scan`]
pub fn load_scan(path: &Path) -> OpsResult<ScanDocument> {
    ScanStore::load_scan(path)
}

fn timestamped_path(dir: &Path, prefix: &str) -> OpsResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| OpsError::io(dir, e))?;

    let stamp = Local::now().format(FILE_TIMESTAMP).to_string();
    let mut path = dir.join(format!("{}{}.json", prefix, stamp));
    let mut counter = 1;
    // Two saves within the same second
    while path.exists() {
        path = dir.join(format!("{}{}_{}.json", prefix, stamp, counter));
        counter += 1;
    }
    Ok(path)
}

/// Write to a temp file first, then rename into place
fn write_json<T: Serialize>(path: &Path, value: &T) -> OpsResult<()> {
    let data = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, data).map_err(|e| OpsError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| OpsError::io(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> OpsResult<T> {
    let data = fs::read_to_string(path).map_err(|e| OpsError::io(path, e))?;
    serde_json::from_str(&data)
        .map_err(|e| OpsError::Persistence(format!("{}: {}", path.display(), e)))
}

fn list_documents(dir: &Path, prefix: &str) -> OpsResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| OpsError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            name.starts_with(prefix) && name.ends_with(".json")
        })
        .collect();

    // Timestamps sort lexically
    paths.sort();
    paths.reverse();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileDescriptor, FolderDescriptor};
    use tempfile::tempdir;

    fn sample_result() -> ScanResult {
        let now = Utc::now();
        ScanResult {
            photo_files: vec![FileDescriptor {
                path: PathBuf::from("/m/a.jpg"),
                name: "a.jpg".to_string(),
                size: 10,
                last_modified: now,
                duration: None,
                is_duplicate: false,
            }],
            short_videos: vec![FileDescriptor {
                path: PathBuf::from("/m/b.mp4"),
                name: "b.mp4".to_string(),
                size: 20,
                last_modified: now,
                duration: Some(10.0),
                is_duplicate: false,
            }],
            long_videos: Vec::new(),
            empty_folders: vec![FolderDescriptor::empty(Path::new("/m/empty"), now)],
        }
    }

    #[test]
    fn scan_document_has_the_persisted_shape() {
        let config = CleanupConfig::new("/m");
        let json = serde_json::to_value(ScanDocument::new(&config, &sample_result())).unwrap();

        assert_eq!(json["startFolder"], "/m");
        assert_eq!(json["configuration"]["minVideoLengthSec"], 30.0);
        let results = &json["scanResults"];
        assert_eq!(results["totalPhotos"], 1);
        assert_eq!(results["totalShortVideos"], 1);
        assert_eq!(results["totalLongVideos"], 0);
        assert_eq!(results["totalEmptyFolders"], 1);
        assert_eq!(results["shortVideos"][0]["duration"], 10.0);
        assert_eq!(results["emptyFolders"][0]["name"], "empty");
    }

    #[test]
    fn saved_scan_loads_back() {
        let dir = tempdir().unwrap();
        let store = ScanStore::new(dir.path());
        let config = CleanupConfig::new("/m");

        let result = sample_result();

        let path = store.save_scan(&config, &result).unwrap();
        assert!(path.starts_with(store.scans_dir()));

        let (loaded_config, loaded) = load_scan(&path).unwrap().into_parts();
        assert_eq!(loaded_config, config);
        assert_eq!(loaded, result);
    }

    #[test]
    fn listings_are_newest_first_and_skip_foreign_files() {
        let dir = tempdir().unwrap();
        let store = ScanStore::new(dir.path());
        let logs = store.logs_dir();
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("operation-log-2024-01-01_10-00-00.json"), "{}").unwrap();
        fs::write(logs.join("operation-log-2025-06-01_10-00-00.json"), "{}").unwrap();
        fs::write(logs.join("notes.txt"), "").unwrap();

        let listed = store.list_operation_logs().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].ends_with("operation-log-2025-06-01_10-00-00.json"));
        assert!(store.list_scans().unwrap().is_empty());
    }

    #[test]
    fn same_second_saves_do_not_clobber() {
        let dir = tempdir().unwrap();
        let store = ScanStore::new(dir.path());
        let mut log = OperationLog::new();
        log.record_trash(Path::new("/m/a.jpg"), 1);

        let first = store.save_operation_log(&log).unwrap();
        let second = store.save_operation_log(&log).unwrap();
        assert_ne!(first, second);
        assert_eq!(ScanStore::load_operation_log(&second).unwrap(), log);
    }

    #[test]
    fn corrupt_document_is_a_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(load_scan(&path), Err(OpsError::Persistence(_))));
    }
}
