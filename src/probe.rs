use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable overriding the ffprobe executable
pub const FFPROBE_ENV: &str = "FFPROBE_PATH";

/// Anything that can tell how long a video runs
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds, or `None` when it cannot be determined
    fn probe_duration(&self, path: &Path) -> Option<f64>;
}

/// Asks ffprobe for the container duration
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// `$FFPROBE_PATH`, falling back to `ffprobe` on the PATH
    pub fn from_env() -> Self {
        let binary = std::env::var_os(FFPROBE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffprobe"));
        Self::new(binary)
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DurationProbe for FfprobeProbe {
    fn probe_duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output();

        let output = match output {
            Ok(out) => out,
            Err(e) => {
                log::warn!(
                    "Cannot run {} for {}: {}",
                    self.binary.display(),
                    path.display(),
                    e
                );
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!(
                "Duration probe failed for {}: {}",
                path.display(),
                stderr.trim()
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_duration(&stdout);
        if parsed.is_none() {
            log::warn!(
                "Unparseable duration {:?} for {}",
                stdout.trim(),
                path.display()
            );
        }
        parsed
    }
}

/// First line of probe output as a finite, non-negative number of seconds
pub fn parse_duration(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_duration("12.345000\n"), Some(12.345));
        assert_eq!(parse_duration("\n  7\n"), Some(7.0));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-3"), None);
        assert_eq!(parse_duration("inf"), None);
    }

    #[test]
    fn missing_binary_degrades_to_none() {
        let probe = FfprobeProbe::new("/nonexistent/bin/ffprobe-for-tests");
        assert_eq!(probe.probe_duration(Path::new("/tmp/clip.mp4")), None);
    }
}
