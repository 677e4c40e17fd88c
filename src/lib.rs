//! MediaSweep - photo and video cleanup engine
//!
//! Scans a folder tree, deletes photos and short videos, moves long videos
//! aside and removes the folders that end up empty. Every live action is
//! logged so moves can be reverted later.

pub mod error;
pub mod model;
pub mod config;
pub mod filter;
pub mod scanner;
pub mod probe;
pub mod classify;
pub mod ops;
pub mod revert;
pub mod store;
pub mod verify;
pub mod progress;
pub mod engine;
pub mod logging;
pub mod cli;

// Re-exports for easy access
pub use error::{OpsError, OpsResult};
pub use model::{
    FileDescriptor, FolderDescriptor, OperationKind, OperationLog, OperationLogEntry,
    PendingCounts, ScanResult, Stage,
};
pub use config::{CleanupConfig, CleanupConfigInput};
pub use filter::{is_ignored, matches_extension, ExtensionSet, IgnoreSet};
pub use scanner::Scanner;
pub use probe::{DurationProbe, FfprobeProbe};
pub use classify::{classify_videos, VideoClassification};
pub use ops::FileOps;
pub use revert::{revert, RevertSummary};
pub use store::{load_scan, ScanDocument, ScanStore};
pub use verify::verify_scan;
pub use progress::{
    CancellationToken, ChannelObserver, LogLevel, NullObserver, Phase, ProgressEvent,
    ProgressObserver, RecordingObserver,
};
pub use engine::{CleanupEngine, CleanupSummary, EngineStatus, PendingScan};

pub mod colors {
    use colored::Color;

    pub const SUCCESS: Color = Color::TrueColor { r: 77, g: 255, b: 157 };
    pub const HEADER: Color = Color::TrueColor { r: 157, g: 77, b: 255 };
    pub const PATH: Color = Color::TrueColor { r: 77, g: 195, b: 255 };
    pub const WARNING: Color = Color::TrueColor { r: 255, g: 217, b: 61 };
    pub const DANGER: Color = Color::TrueColor { r: 255, g: 107, b: 157 };
}

/// Current version of MediaSweep
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Videos shorter than this many seconds are deleted
pub const DEFAULT_MIN_VIDEO_LENGTH_SECS: f64 = 30.0;

/// Folder inside the start folder that long videos are moved to
pub const DEFAULT_MOVE_TARGET_NAME: &str = "Long Videos";

pub const DEFAULT_PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "heic", "heif", "webp",
    "tiff", "tif", "raw", "cr2", "nef", "arw", "dng",
];

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "flv", "webm", "m4v",
    "3gp", "mts", "m2ts",
];
