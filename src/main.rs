use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use media_sweep::cli::{Cli, Commands, LoadArgs, RevertArgs, ScanArgs};
use media_sweep::config::StringList;
use media_sweep::ops::format_size;
use media_sweep::{
    colors, logging, ChannelObserver, CleanupConfig, CleanupConfigInput, CleanupEngine,
    CleanupSummary, DurationProbe, FfprobeProbe, LogLevel, OperationKind, OpsError, Phase,
    ProgressEvent, RevertSummary, ScanResult, ScanStore, Stage,
};

/// How many entries per category the summary lists before eliding
const PREVIEW_LIMIT: usize = 10;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Disable colors if requested
    if cli.no_color {
        colored::control::set_override(false);
    }

    logging::init_logger(cli.verbose);

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => ScanStore::default_root().context("Could not find a data directory")?,
    };
    let store = ScanStore::new(data_dir);

    match cli.command {
        Commands::History => handle_history(&store),
        Commands::Config => handle_config(),
        Commands::Scan(args) => {
            let (engine, events) = start_engine(store, cli.ffprobe.as_deref())?;
            handle_scan(&engine, &events, &args)
        }
        Commands::Load(args) => {
            let (engine, events) = start_engine(store, cli.ffprobe.as_deref())?;
            handle_load(&engine, &events, &args)
        }
        Commands::Revert(args) => {
            let (engine, events) = start_engine(store, cli.ffprobe.as_deref())?;
            handle_revert(&engine, &events, &args)
        }
    }
}

/// Engine wired to a progress channel, with Ctrl-C mapped to abort
fn start_engine(
    store: ScanStore,
    ffprobe: Option<&Path>,
) -> Result<(Arc<CleanupEngine>, Receiver<ProgressEvent>)> {
    let probe: Arc<dyn DurationProbe> = match ffprobe {
        Some(path) => Arc::new(FfprobeProbe::new(path)),
        None => Arc::new(FfprobeProbe::from_env()),
    };

    let (tx, events) = mpsc::channel();
    let engine = Arc::new(
        CleanupEngine::new(store)
            .with_observer(Arc::new(ChannelObserver::new(tx)))
            .with_probe(probe),
    );

    // Ctrl-C asks the engine to stop at its next checkpoint
    let abort_engine = Arc::clone(&engine);
    ctrlc::set_handler(move || abort_engine.abort())
        .context("Failed to install Ctrl-C handler")?;

    Ok((engine, events))
}

fn handle_scan(
    engine: &Arc<CleanupEngine>,
    events: &Receiver<ProgressEvent>,
    args: &ScanArgs,
) -> Result<()> {
    let saved = match CleanupConfig::load_saved() {
        Ok(saved) => saved,
        Err(e) => {
            log::warn!("Ignoring saved preferences: {:#}", e);
            None
        }
    };

    let config = build_config(args, saved.as_ref())?;

    if args.save {
        config.save().context("Failed to save preferences")?;
        println!("{} Preferences saved", "💾".green());
    }

    println!("{}", "🔍 SCANNING".bold().color(colors::HEADER));
    println!("   {}", config.start_folder.display().to_string().color(colors::PATH));
    println!();

    let scan_config = config.clone();
    let outcome = run_in_background(engine, events, move |engine| {
        engine.perform_scan(&scan_config)
    })?;

    let result = match outcome {
        Ok(Some(result)) => result,
        Ok(None) => {
            println!("{} Scan aborted, nothing was saved", "⏹️".yellow());
            return Ok(());
        }
        Err(e) => return Err(anyhow!(e.user_message()).context("Scan failed")),
    };

    print_scan_summary(&result, &config);
    confirm_and_run(engine, events, &result, &config, args.dry_run, args.yes)
}

/// Command-line flags layered over saved preferences
fn build_config(args: &ScanArgs, saved: Option<&CleanupConfig>) -> Result<CleanupConfig> {
    let start = args.start.canonicalize().unwrap_or_else(|_| args.start.clone());
    // Relative targets are taken from the shell's directory, like START
    let target = match &args.target {
        Some(target) => {
            let absolute = if target.is_relative() {
                std::env::current_dir()
                    .context("Could not read the current directory")?
                    .join(target)
            } else {
                target.clone()
            };
            Some(absolute.canonicalize().unwrap_or(absolute))
        }
        None => None,
    };

    let input = CleanupConfigInput {
        start_folder: Some(start),
        video_move_target: target,
        min_video_length_sec: args.min_length.or(saved.map(|s| s.min_video_length_sec)),
        photo_extensions: args
            .photo_ext
            .clone()
            .map(StringList::One)
            .or_else(|| saved.map(|s| StringList::Many(s.photo_extensions.clone()))),
        video_extensions: args
            .video_ext
            .clone()
            .map(StringList::One)
            .or_else(|| saved.map(|s| StringList::Many(s.video_extensions.clone()))),
        delete_empty_folders: Some(
            !args.keep_empty_folders && saved.map_or(true, |s| s.delete_empty_folders),
        ),
        move_videos: Some(!args.no_move && saved.map_or(true, |s| s.move_videos)),
        ignore_folders: if args.ignore.is_empty() {
            saved.map(|s| StringList::Many(s.ignore_folders.clone()))
        } else {
            Some(StringList::Many(args.ignore.clone()))
        },
        use_trash: Some(!args.permanent && saved.map_or(true, |s| s.use_trash)),
    };

    input
        .resolve()
        .map_err(|e| anyhow!(e.user_message()))
        .context("Invalid scan settings")
}

fn handle_load(
    engine: &Arc<CleanupEngine>,
    events: &Receiver<ProgressEvent>,
    args: &LoadArgs,
) -> Result<()> {
    let document = engine
        .load_scan_results(&args.scan_file)
        .map_err(|e| anyhow!(e.user_message()))
        .with_context(|| format!("Failed to load {}", args.scan_file.display()))?;
    drain_logs(events);

    println!("{} Loaded scan from {}",
        "📂".cyan(),
        document.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("{} Re-checking files...", "🔎".cyan());

    let verified = engine.verify_loaded_files(&document);
    drain_logs(events);

    let config = document.configuration;
    print_scan_summary(&verified, &config);

    engine
        .resume_loaded(config.clone(), verified.clone())
        .map_err(|e| anyhow!(e.user_message()))?;
    drain_logs(events);

    confirm_and_run(engine, events, &verified, &config, args.dry_run, args.yes)
}

fn confirm_and_run(
    engine: &Arc<CleanupEngine>,
    events: &Receiver<ProgressEvent>,
    result: &ScanResult,
    config: &CleanupConfig,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let counts = result.counts();
    let moves = if config.move_videos { counts.long_videos } else { 0 };
    let folders = if config.delete_empty_folders { counts.empty_folders } else { 0 };
    let actionable = counts.photos + counts.short_videos + moves + folders;

    if actionable == 0 {
        println!("{} Nothing to clean up", "✨".green());
        return Ok(());
    }

    if !yes {
        let prompt = if dry_run {
            "Simulate this cleanup (dry run)?"
        } else {
            "Proceed with cleanup?"
        };
        let confirm = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to get confirmation")?;

        if !confirm {
            engine.abort();
            drain_logs(events);
            println!("{} Cleanup cancelled", "ℹ️".cyan());
            return Ok(());
        }
    }

    let outcome = run_in_background(engine, events, move |engine| engine.confirm(dry_run))?;
    match outcome {
        Ok(summary) => {
            print_cleanup_summary(&summary);
            Ok(())
        }
        Err(OpsError::NoPendingScan) => {
            println!("{} Cleanup cancelled", "ℹ️".cyan());
            Ok(())
        }
        Err(e) => Err(anyhow!(e.user_message()).context("Cleanup failed")),
    }
}

fn handle_revert(
    engine: &Arc<CleanupEngine>,
    events: &Receiver<ProgressEvent>,
    args: &RevertArgs,
) -> Result<()> {
    let log = ScanStore::load_operation_log(&args.log_file)
        .map_err(|e| anyhow!(e.user_message()))
        .with_context(|| format!("Failed to read {}", args.log_file.display()))?;

    let moves = log
        .operations
        .iter()
        .filter(|op| op.kind == OperationKind::Move)
        .count();
    let trashed = log.len() - moves;

    println!("{}", "↩️  REVERT".bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));
    println!("{} Run from {}", "•".cyan(), log.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("{} {} moved file{} will be put back", "•".cyan(), moves, plural(moves));
    if trashed > 0 {
        println!("{} {} deleted item{} cannot be restored automatically",
            "•".yellow(), trashed, plural(trashed));
    }
    println!();

    if moves == 0 && trashed == 0 {
        println!("{} The log is empty", "ℹ️".cyan());
        return Ok(());
    }

    if !args.yes {
        let confirm = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Revert these operations?")
            .default(false)
            .interact()
            .context("Failed to get confirmation")?;
        if !confirm {
            println!("{} Revert cancelled", "ℹ️".cyan());
            return Ok(());
        }
    }

    let outcome = run_in_background(engine, events, move |engine| engine.revert_operation(&log))?;
    let summary = outcome
        .map_err(|e| anyhow!(e.user_message()))
        .context("Revert failed")?;
    print_revert_summary(&summary);
    Ok(())
}

fn handle_history(store: &ScanStore) -> Result<()> {
    let scans = store.list_scans().map_err(|e| anyhow!(e.user_message()))?;
    let logs = store.list_operation_logs().map_err(|e| anyhow!(e.user_message()))?;

    println!("{}", "📜 HISTORY".bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));
    println!("{} {}", "Data folder:".dimmed(), store.root().display());
    println!();

    println!("{} Saved scans ({}):", "🔍".cyan(), scans.len());
    print_paths(&scans);
    println!();
    println!("{} Operation logs ({}):", "🧾".cyan(), logs.len());
    print_paths(&logs);

    if scans.is_empty() && logs.is_empty() {
        println!();
        Cli::print_examples();
    }
    Ok(())
}

fn handle_config() -> Result<()> {
    match CleanupConfig::load_saved().context("Failed to load saved preferences")? {
        Some(config) => config.display(),
        None => {
            println!("{} No saved preferences yet", "ℹ️".cyan());
            println!("   Run a scan with --save to store its settings in {}",
                CleanupConfig::saved_path()?.display().to_string().color(colors::PATH));
        }
    }
    Ok(())
}

/// Run `job` on a worker thread while rendering its progress events here
fn run_in_background<T, F>(
    engine: &Arc<CleanupEngine>,
    events: &Receiver<ProgressEvent>,
    job: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CleanupEngine) -> T + Send + 'static,
{
    let worker_engine = Arc::clone(engine);
    let handle = thread::spawn(move || job(&worker_engine));

    let mut view = ProgressView::new()?;
    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => view.handle(event),
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        view.handle(event);
    }
    view.finish();

    handle.join().map_err(|_| anyhow!("Worker thread panicked"))
}

/// Print any log lines emitted outside a background run
fn drain_logs(events: &Receiver<ProgressEvent>) {
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::Log { level: LogLevel::Info, message } = event {
            println!("   {}", message.dimmed());
        }
    }
}

/// Progress bar plus log lines printed above it
struct ProgressView {
    bar: ProgressBar,
    phase: Option<Phase>,
}

impl ProgressView {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar, phase: None })
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { stage } => {
                if stage == Stage::Aborted {
                    self.bar.set_message("aborting");
                }
            }
            ProgressEvent::Progress { phase, processed, total } => {
                if self.phase != Some(phase) {
                    self.phase = Some(phase);
                    self.bar.set_message(phase.label());
                }
                self.bar.set_length(total);
                self.bar.set_position(processed);
            }
            ProgressEvent::Counts { .. } => {}
            // Warnings and errors already reach the terminal through the logger
            ProgressEvent::Log { level, message } => {
                if level == LogLevel::Info {
                    self.bar.println(format!("   {}", message.dimmed()));
                }
            }
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn print_scan_summary(result: &ScanResult, config: &CleanupConfig) {
    let counts = result.counts();

    println!();
    println!("{}", "📊 SCAN RESULTS".bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));

    println!("{} {} photo{} to delete", "🖼️".cyan(), counts.photos, plural(counts.photos));
    print_files(result.photo_files.iter().map(|f| (f.path.as_path(), f.size, None)));

    println!("{} {} short or duplicate video{} to delete",
        "🎞️".cyan(), counts.short_videos, plural(counts.short_videos));
    print_files(result.short_videos.iter().map(|f| {
        let note = if f.is_duplicate {
            Some("duplicate".to_string())
        } else {
            f.duration.map(|d| format!("{:.1}s", d))
        };
        (f.path.as_path(), f.size, note)
    }));

    if config.move_videos {
        println!("{} {} long video{} to move to {}",
            "📦".cyan(),
            counts.long_videos,
            plural(counts.long_videos),
            config.video_move_target.display().to_string().color(colors::PATH));
        print_files(result.long_videos.iter().map(|f| {
            let note = Some(match f.duration {
                Some(d) => format!("{:.1}s", d),
                None => "length unknown".to_string(),
            });
            (f.path.as_path(), f.size, note)
        }));
    } else if counts.long_videos > 0 {
        println!("{} {} long video{} will stay where they are",
            "📦".dimmed(), counts.long_videos, plural(counts.long_videos));
    }

    if config.delete_empty_folders {
        println!("{} {} empty folder{} to remove",
            "📁".cyan(), counts.empty_folders, plural(counts.empty_folders));
        print_files(result.deletable_folders().map(|f| (f.path.as_path(), 0, None)));
    }

    if counts.folders_needing_decision > 0 {
        println!("{} {} folder{} still hold other files and will be kept:",
            "⚠️".yellow(),
            counts.folders_needing_decision,
            plural(counts.folders_needing_decision));
        for folder in result.empty_folders.iter().filter(|f| f.requires_user_decision) {
            println!("   • {} ({} file{}, {})",
                folder.path.display().to_string().color(colors::WARNING),
                folder.non_media_files.len(),
                plural(folder.non_media_files.len()),
                format_size(folder.size));
        }
    }

    println!();
    println!("💾 Space to free: {}", format_size(result.reclaimable_bytes()).bold());
    println!("🗑️  Deletions go to: {}",
        if config.use_trash { "system trash" } else { "permanent delete" });
    println!();
}

fn print_files<'a, I>(files: I)
where
    I: Iterator<Item = (&'a Path, u64, Option<String>)>,
{
    let files: Vec<_> = files.collect();
    for (path, size, note) in files.iter().take(PREVIEW_LIMIT) {
        let mut line = format!("   • {}", path.display().to_string().color(colors::PATH));
        if *size > 0 {
            line.push_str(&format!(" ({})", format_size(*size)));
        }
        if let Some(note) = note {
            line.push_str(&format!(" [{}]", note));
        }
        println!("{}", line);
    }
    if files.len() > PREVIEW_LIMIT {
        println!("   {} and {} more", "…".dimmed(), files.len() - PREVIEW_LIMIT);
    }
}

fn print_paths(paths: &[std::path::PathBuf]) {
    if paths.is_empty() {
        println!("   {}", "none".dimmed());
    }
    for path in paths {
        println!("   • {}", path.display().to_string().color(colors::PATH));
    }
}

fn print_cleanup_summary(summary: &CleanupSummary) {
    println!();
    if summary.aborted {
        println!("{}", "⏹️  CLEANUP ABORTED".bold().color(colors::WARNING));
    } else if summary.dry_run {
        println!("{}", "🌵 DRY RUN COMPLETE".bold().color(colors::SUCCESS));
        println!("   No files were modified");
    } else {
        println!("{}", "✅ CLEANUP COMPLETE".bold().color(colors::SUCCESS));
    }

    let verb = if summary.dry_run { "Would delete" } else { "Deleted" };
    println!("{} {}: {}", "•".cyan(), verb, summary.deleted);
    let verb = if summary.dry_run { "Would move" } else { "Moved" };
    println!("{} {}: {}", "•".cyan(), verb, summary.moved);
    let verb = if summary.dry_run { "Would remove folders" } else { "Folders removed" };
    println!("{} {}: {}", "•".cyan(), verb, summary.folders_removed);

    if summary.failed > 0 {
        println!("{} Failed: {}", "⚠️".color(colors::DANGER), summary.failed);
    }

    if let Some(path) = &summary.log_path {
        println!();
        println!("{} Undo the moves with:", "↩️".cyan());
        println!("   mediasweep revert {}", path.display().to_string().color(colors::PATH));
    }
}

fn print_revert_summary(summary: &RevertSummary) {
    println!();
    if summary.aborted {
        println!("{}", "⏹️  REVERT ABORTED".bold().color(colors::WARNING));
    } else {
        println!("{}", "✅ REVERT COMPLETE".bold().color(colors::SUCCESS));
    }
    println!("{} Restored: {}", "•".cyan(), summary.restored);
    if summary.failed > 0 {
        println!("{} Failed: {}", "⚠️".color(colors::DANGER), summary.failed);
    }
    if !summary.not_recoverable.is_empty() {
        println!("{} Check the system trash for:", "🗑️".yellow());
        for path in &summary.not_recoverable {
            println!("   • {}", path.display().to_string().color(colors::PATH));
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
