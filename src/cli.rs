use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    name = "mediasweep",
    about = "Clean up photo and video folders: delete, move aside, revert",
    version,
    long_about = "MediaSweep scans a folder tree for photos and videos and proposes a cleanup:\n\
                  • Photos and videos shorter than the minimum length are deleted\n\
                  • Longer videos are moved into a separate folder\n\
                  • Folders left empty afterwards are removed\n\n\
                  Nothing happens before you confirm. Deletions go to the system trash\n\
                  and every run writes an operation log that can undo the moves."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Where scan results and operation logs are kept
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// ffprobe executable used to read video durations
    #[arg(long, global = true, value_name = "PATH", env = "FFPROBE_PATH")]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a folder, review the proposal and run the cleanup
    Scan(ScanArgs),

    /// Load a saved scan, re-check it and run the cleanup
    Load(LoadArgs),

    /// Move files back using an operation log
    Revert(RevertArgs),

    /// List saved scans and operation logs
    History,

    /// Show saved preferences
    Config,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Folder to clean up
    pub start: PathBuf,

    /// Where long videos are moved (default: <START>/Long Videos)
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Videos shorter than this many seconds are deleted
    #[arg(short = 'm', long, value_name = "SECS")]
    pub min_length: Option<f64>,

    /// Photo extensions, comma separated
    #[arg(long, value_name = "LIST")]
    pub photo_ext: Option<String>,

    /// Video extensions, comma separated
    #[arg(long, value_name = "LIST")]
    pub video_ext: Option<String>,

    /// Folder to leave alone, relative to START (repeatable)
    #[arg(short, long, value_name = "DIR")]
    pub ignore: Vec<String>,

    /// Do not remove folders that end up empty
    #[arg(long)]
    pub keep_empty_folders: bool,

    /// Leave long videos where they are
    #[arg(long)]
    pub no_move: bool,

    /// Delete permanently instead of using the system trash
    #[arg(long)]
    pub permanent: bool,

    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Remember these settings for next time
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Scan results file written by an earlier scan
    pub scan_file: PathBuf,

    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct RevertArgs {
    /// Operation log file written by a cleanup run
    pub log_file: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl Cli {
    /// Print a short usage overview with examples
    pub fn print_examples() {
        println!("{}", "EXAMPLES:".dimmed());
        println!("  # Preview a cleanup");
        println!("  mediasweep scan ~/Pictures/Phone --dry-run");
        println!();
        println!("  # Keep videos of a minute or more, skip the RAW folder");
        println!("  mediasweep scan ~/Pictures/Phone --min-length 60 --ignore RAW");
        println!();
        println!("  # Pick up a saved scan later");
        println!("  mediasweep history");
        println!("  mediasweep load <scan-results file>");
        println!();
        println!("  # Undo the moves of a run");
        println!("  mediasweep revert <operation-log file>");
    }
}

impl Commands {
    /// Get the command name
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Scan(_) => "scan",
            Commands::Load(_) => "load",
            Commands::Revert(_) => "revert",
            Commands::History => "history",
            Commands::Config => "config",
        }
    }
}
