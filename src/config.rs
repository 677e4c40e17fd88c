use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use colored::*;
use crate::colors;
use crate::error::{OpsError, OpsResult};
use crate::filter::{clean, ExtensionSet, IgnoreSet};
use crate::{
    DEFAULT_MIN_VIDEO_LENGTH_SECS, DEFAULT_MOVE_TARGET_NAME, DEFAULT_PHOTO_EXTENSIONS,
    DEFAULT_VIDEO_EXTENSIONS,
};

/// Settings for one scan/cleanup operation. The core never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupConfig {
    pub start_folder: PathBuf,
    pub video_move_target: PathBuf,
    pub min_video_length_sec: f64,
    pub photo_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub delete_empty_folders: bool,
    pub move_videos: bool,
    #[serde(default)]
    pub ignore_folders: Vec<String>,
    /// Send deletions to the OS trash before falling back to permanent removal
    #[serde(default = "default_true")]
    pub use_trash: bool,
}

/// Either `"jpg, png"` or `["jpg", "png"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    /// Flatten to trimmed, non-empty items. Comma-separated strings are split.
    pub fn into_items(self) -> Vec<String> {
        let raw = match self {
            StringList::One(s) => vec![s],
            StringList::Many(v) => v,
        };
        raw.iter()
            .flat_map(|s| s.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Configuration as received from a caller, with every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupConfigInput {
    pub start_folder: Option<PathBuf>,
    pub video_move_target: Option<PathBuf>,
    pub min_video_length_sec: Option<f64>,
    pub photo_extensions: Option<StringList>,
    pub video_extensions: Option<StringList>,
    pub delete_empty_folders: Option<bool>,
    pub move_videos: Option<bool>,
    pub ignore_folders: Option<StringList>,
    pub use_trash: Option<bool>,
}

impl CleanupConfigInput {
    /// Fill in defaults. Only the start folder is mandatory.
    ///
    /// A relative start folder is taken from the current directory, a
    /// relative move target from the start folder.
    pub fn resolve(self) -> OpsResult<CleanupConfig> {
        let start_folder = self
            .start_folder
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| OpsError::InvalidConfig("start folder is required".to_string()))?;
        let start_folder = if start_folder.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| OpsError::io(&start_folder, e))?;
            clean(&cwd.join(start_folder))
        } else {
            clean(&start_folder)
        };

        let mut config = CleanupConfig::new(start_folder);

        if let Some(target) = self.video_move_target.filter(|p| !p.as_os_str().is_empty()) {
            config.video_move_target = clean(&config.start_folder.join(target));
        }
        if let Some(min) = self.min_video_length_sec {
            config.min_video_length_sec = min;
        }
        if let Some(list) = self.photo_extensions {
            config.photo_extensions = list.into_items();
        }
        if let Some(list) = self.video_extensions {
            config.video_extensions = list.into_items();
        }
        if let Some(flag) = self.delete_empty_folders {
            config.delete_empty_folders = flag;
        }
        if let Some(flag) = self.move_videos {
            config.move_videos = flag;
        }
        if let Some(list) = self.ignore_folders {
            config.ignore_folders = list.into_items();
        }
        if let Some(flag) = self.use_trash {
            config.use_trash = flag;
        }

        Ok(config)
    }
}

impl CleanupConfig {
    /// Defaults for a start folder. The move target lives inside it.
    pub fn new(start_folder: impl Into<PathBuf>) -> Self {
        let start_folder = start_folder.into();
        let video_move_target = Self::default_move_target(&start_folder);
        Self {
            start_folder,
            video_move_target,
            min_video_length_sec: DEFAULT_MIN_VIDEO_LENGTH_SECS,
            photo_extensions: DEFAULT_PHOTO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            delete_empty_folders: true,
            move_videos: true,
            ignore_folders: Vec::new(),
            use_trash: true,
        }
    }

    pub fn default_move_target(start_folder: &Path) -> PathBuf {
        start_folder.join(DEFAULT_MOVE_TARGET_NAME)
    }

    /// Reject settings the scanner cannot work with
    pub fn validate(&self) -> OpsResult<()> {
        if !self.start_folder.is_dir() {
            return Err(OpsError::InvalidConfig(format!(
                "start folder is not a directory: {}",
                self.start_folder.display()
            )));
        }
        if self.video_move_target.as_os_str().is_empty() {
            return Err(OpsError::InvalidConfig("video move target is empty".to_string()));
        }
        if self.video_move_target.is_relative() {
            return Err(OpsError::InvalidConfig(format!(
                "video move target must be an absolute path: {}",
                self.video_move_target.display()
            )));
        }
        // The target is excluded from scans, so it must not swallow the start folder
        if clean(&self.start_folder).starts_with(clean(&self.video_move_target)) {
            return Err(OpsError::InvalidConfig(format!(
                "video move target {} cannot be the start folder or one of its parents",
                self.video_move_target.display()
            )));
        }
        if !self.min_video_length_sec.is_finite() || self.min_video_length_sec < 0.0 {
            return Err(OpsError::InvalidConfig(format!(
                "minimum video length must be a non-negative number, got {}",
                self.min_video_length_sec
            )));
        }
        if self.photo_extension_set().is_empty() && self.video_extension_set().is_empty() {
            return Err(OpsError::InvalidConfig(
                "no photo or video extensions configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn photo_extension_set(&self) -> ExtensionSet {
        ExtensionSet::new(&self.photo_extensions)
    }

    pub fn video_extension_set(&self) -> ExtensionSet {
        ExtensionSet::new(&self.video_extensions)
    }

    /// Ignore list plus the move target, which must never scan itself
    pub fn ignore_set(&self) -> IgnoreSet {
        let mut ignore = IgnoreSet::new(&self.ignore_folders, &self.start_folder);
        ignore.add_excluded(&self.video_move_target);
        ignore
    }

    /// Get the path to the saved preferences file
    pub fn saved_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not find home directory")?;
        Ok(home.join(".mediasweep.json"))
    }

    /// Get the backup file kept next to a preferences file
    pub fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("json.backup")
    }

    /// Load saved preferences, `None` when nothing was saved yet
    pub fn load_saved() -> Result<Option<Self>> {
        Self::load_from(&Self::saved_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(path)
            .context("Failed to read saved preferences")?;

        match serde_json::from_str(&data) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                // Preferences are corrupted, try backup
                log::warn!("Saved preferences corrupted ({}), trying backup", e);
                let backup = Self::backup_path(path);
                if backup.exists() {
                    let data = fs::read_to_string(&backup)
                        .context("Failed to read backup file")?;
                    let config = serde_json::from_str(&data)
                        .context("Failed to parse backup file")?;
                    log::info!("Restored preferences from {}", backup.display());
                    return Ok(Some(config));
                }
                Err(e.into())
            }
        }
    }

    /// Save preferences to disk with backup
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::saved_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let backup_path = Self::backup_path(path);

        // Create backup of existing preferences if they exist
        if path.exists() {
            fs::copy(path, &backup_path)
                .context("Failed to create backup")?;
        }

        // Write to temp file first
        let temp_path = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)
            .context("Failed to serialize preferences")?;
        fs::write(&temp_path, &data)
            .context("Failed to write temp preferences")?;

        // Atomically rename temp file to final location
        fs::rename(&temp_path, path)
            .context("Failed to finalize preferences")?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("{}", "🔧 CURRENT CONFIGURATION".bold().color(colors::HEADER));
        println!();

        println!("{} Start folder: {}", "•".cyan(),
            self.start_folder.display().to_string().color(colors::PATH));
        println!("{} Video move target: {}", "•".cyan(),
            self.video_move_target.display().to_string().color(colors::PATH));
        println!("{} Minimum video length: {}s", "•".cyan(), self.min_video_length_sec);
        println!("{} Photo extensions: {}", "•".cyan(), self.photo_extensions.join(", "));
        println!("{} Video extensions: {}", "•".cyan(), self.video_extensions.join(", "));
        println!("{} Delete empty folders: {}", "•".cyan(),
            if self.delete_empty_folders { "Yes" } else { "No" });
        println!("{} Move long videos: {}", "•".cyan(),
            if self.move_videos { "Yes" } else { "No" });
        println!("{} Deletions go to: {}", "•".cyan(),
            if self.use_trash { "Trash" } else { "Permanent delete" });

        println!();
        println!("{} Ignored folders ({}):", "•".cyan(), self.ignore_folders.len());
        for folder in &self.ignore_folders {
            println!("  - {}", folder);
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn input_accepts_comma_separated_strings_and_arrays() {
        let input: CleanupConfigInput = serde_json::from_value(serde_json::json!({
            "startFolder": "/media/camera",
            "photoExtensions": "jpg, .PNG ,heic",
            "videoExtensions": ["mp4", "mov,mkv"],
            "ignoreFolders": "raw,exports",
            "minVideoLengthSec": 12
        }))
        .unwrap();

        let config = input.resolve().unwrap();
        assert_eq!(config.photo_extensions, vec!["jpg", ".PNG", "heic"]);
        assert_eq!(config.video_extensions, vec!["mp4", "mov", "mkv"]);
        assert_eq!(config.ignore_folders, vec!["raw", "exports"]);
        assert_eq!(config.min_video_length_sec, 12.0);
        assert!(config.photo_extension_set().contains("png"));
    }

    #[test]
    fn input_defaults_are_applied() {
        let input = CleanupConfigInput {
            start_folder: Some(PathBuf::from("/media/camera")),
            ..Default::default()
        };
        let config = input.resolve().unwrap();
        assert_eq!(config.min_video_length_sec, 30.0);
        assert!(config.delete_empty_folders);
        assert!(config.move_videos);
        assert!(config.use_trash);
        assert_eq!(
            config.video_move_target,
            PathBuf::from("/media/camera").join(DEFAULT_MOVE_TARGET_NAME)
        );
    }

    #[test]
    fn missing_start_folder_is_rejected() {
        let err = CleanupConfigInput::default().resolve().unwrap_err();
        assert!(matches!(err, OpsError::InvalidConfig(_)));
    }

    #[test]
    fn validate_checks_start_folder_and_target() {
        let dir = tempdir().unwrap();
        let mut config = CleanupConfig::new(dir.path());
        assert!(config.validate().is_ok());

        config.video_move_target = dir.path().to_path_buf();
        assert!(config.validate().is_err());

        let missing = CleanupConfig::new(dir.path().join("nope"));
        assert!(missing.validate().is_err());
    }

    #[test]
    fn relative_target_lands_inside_the_start_folder() {
        let dir = tempdir().unwrap();
        let input = CleanupConfigInput {
            start_folder: Some(dir.path().to_path_buf()),
            video_move_target: Some(PathBuf::from("Long Videos")),
            ..Default::default()
        };
        let config = input.resolve().unwrap();
        assert_eq!(config.video_move_target, dir.path().join("Long Videos"));
        assert!(config.validate().is_ok());
        assert!(config.ignore_set().is_ignored(&dir.path().join("Long Videos/old.mp4")));

        let input = CleanupConfigInput {
            start_folder: Some(dir.path().to_path_buf()),
            video_move_target: Some(PathBuf::from("../elsewhere/./clips")),
            ..Default::default()
        };
        let config = input.resolve().unwrap();
        let parent = dir.path().parent().unwrap();
        assert_eq!(config.video_move_target, parent.join("elsewhere/clips"));
    }

    #[test]
    fn relative_target_is_rejected_when_set_directly() {
        let dir = tempdir().unwrap();
        let mut config = CleanupConfig::new(dir.path());
        config.video_move_target = PathBuf::from("Long Videos");
        assert!(matches!(config.validate(), Err(OpsError::InvalidConfig(_))));
    }

    #[test]
    fn target_above_the_start_folder_is_rejected() {
        let dir = tempdir().unwrap();
        let start = dir.path().join("DCIM");
        fs::create_dir_all(&start).unwrap();

        let mut config = CleanupConfig::new(&start);
        config.video_move_target = dir.path().to_path_buf();
        assert!(matches!(config.validate(), Err(OpsError::InvalidConfig(_))));

        config.video_move_target = start.join("sub/..");
        assert!(config.validate().is_err());

        // A sibling sharing a name prefix is fine
        config.video_move_target = dir.path().join("DCIM-long");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_reload_keeps_a_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut config = CleanupConfig::new("/media/camera");
        config.save_to(&path).unwrap();
        config.min_video_length_sec = 45.0;
        config.save_to(&path).unwrap();

        let loaded = CleanupConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.min_video_length_sec, 45.0);
        assert!(CleanupConfig::backup_path(&path).exists());

        // Corrupt the main file, backup still holds the first save
        fs::write(&path, "{ not json").unwrap();
        let restored = CleanupConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(restored.min_video_length_sec, 30.0);
    }

    #[test]
    fn absent_preferences_load_as_none() {
        let dir = tempdir().unwrap();
        assert!(CleanupConfig::load_from(&dir.path().join("none.json")).unwrap().is_none());
    }
}
