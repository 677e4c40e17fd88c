use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use crate::config::CleanupConfig;
use crate::error::OpsResult;
use crate::model::FileDescriptor;
use crate::probe::DurationProbe;
use crate::progress::{report, CancellationToken, LogLevel, Phase, PhaseCounter, ProgressObserver};

/// Videos split into delete and move candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoClassification {
    /// Too short, or already present at the move target
    pub short_videos: Vec<FileDescriptor>,
    /// Long enough, or of unknown length
    pub long_videos: Vec<FileDescriptor>,
}

/// Probe and classify every video.
///
/// A video shorter than the minimum is a delete candidate. Otherwise, if a
/// file with the same name already sits in the move target it is a delete
/// candidate tagged as duplicate. Everything else, including videos whose
/// duration could not be probed, is moved.
pub fn classify_videos(
    videos: Vec<FileDescriptor>,
    config: &CleanupConfig,
    probe: &dyn DurationProbe,
    cancel: &CancellationToken,
    observer: &dyn ProgressObserver,
) -> OpsResult<VideoClassification> {
    let mut result = VideoClassification::default();
    let mut counter = PhaseCounter::start(observer, Phase::DurationAnalysis, videos.len() as u64);

    for video in videos {
        cancel.check()?;

        let duration = probe_guarded(probe, &video.path);
        let mut video = video.with_duration(duration);

        match duration {
            Some(d) if d < config.min_video_length_sec => {
                report(observer, LogLevel::Info, format!(
                    "Short video ({:.1}s < {}s), will delete: {}",
                    d,
                    config.min_video_length_sec,
                    video.path.display()
                ));
                result.short_videos.push(video);
            }
            _ if config.video_move_target.join(&video.name).exists() => {
                report(observer, LogLevel::Info, format!(
                    "Duplicate, {} already exists in {}, will delete: {}",
                    video.name,
                    config.video_move_target.display(),
                    video.path.display()
                ));
                video.is_duplicate = true;
                result.short_videos.push(video);
            }
            Some(d) => {
                report(observer, LogLevel::Info, format!(
                    "Long video ({:.1}s), will move: {}",
                    d,
                    video.path.display()
                ));
                result.long_videos.push(video);
            }
            None => {
                report(observer, LogLevel::Warn, format!(
                    "Unknown duration, keeping and moving: {}",
                    video.path.display()
                ));
                result.long_videos.push(video);
            }
        }

        counter.tick();
    }

    Ok(result)
}

/// A panicking probe counts as a failed probe
fn probe_guarded(probe: &dyn DurationProbe, path: &Path) -> Option<f64> {
    match panic::catch_unwind(AssertUnwindSafe(|| probe.probe_duration(path))) {
        Ok(duration) => duration,
        Err(_) => {
            log::warn!("Duration probe panicked for {}", path.display());
            None
        }
    }
}
