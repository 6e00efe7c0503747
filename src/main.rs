use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use photoreject::dedup::DEFAULT_MOVE_DIR;
use photoreject::history::{self, Selection};
use photoreject::submissions::{self, Manifest, ReviewOptions};
use photoreject::{
    ApplyAction, ApplyOptions, ApplyReport, DedupConfig, DedupPlan, Deduplicator, HashAlgorithm,
    MatchKind, Progress, ResolveStrategy, SurvivorPolicy,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "photoreject",
    version,
    about = "Find and reject near-duplicate photo submissions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (default: per-user config dir, if present)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Max Hamming distance for two images to count as duplicates
    #[arg(long, global = true)]
    threshold: Option<u32>,

    /// Perceptual hash algorithm
    #[arg(long, value_enum, global = true)]
    hash: Option<HashAlgorithm>,

    /// Hash grid width and height
    #[arg(long, global = true)]
    hash_size: Option<u32>,

    /// How chained clusters are collapsed
    #[arg(long, value_enum, global = true)]
    strategy: Option<ResolveStrategy>,

    /// Which image of a cluster is kept
    #[arg(long, value_enum, global = true)]
    keep: Option<SurvivorPolicy>,

    /// Descend into subdirectories
    #[arg(long, global = true)]
    recursive: bool,

    /// Hash images in parallel
    #[arg(long, global = true)]
    parallel: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Work with reject history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },

    /// Map rejections back onto pool submissions
    Submissions {
        #[command(subcommand)]
        command: SubsCmd,
    },
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Find and list duplicate groups
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move duplicates into `<dir>/duplicates`
    Cull {
        /// Directory to cull
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Only show what would be moved
        #[arg(long)]
        dry_run: bool,
        /// Directory to move duplicates into (default: `<dir>/duplicates`)
        #[arg(long, value_name = "DIR")]
        target_dir: Option<PathBuf>,
        /// Do not append to the history log
        #[arg(long)]
        no_history: bool,
    },

    /// Permanently delete duplicate images
    Delete {
        /// Directory to clean
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Do not append to the history log
        #[arg(long)]
        no_history: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all history records
    List {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Restore moved files from history
    Restore {
        /// Directory containing the photos
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Restore a specific record index
        #[arg(long, conflicts_with = "all")]
        record: Option<usize>,
        /// Restore all records
        #[arg(long, conflicts_with = "record")]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SubsCmd {
    /// Rename colliding image names in a manifest, in place
    Name {
        /// Submissions manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
    },

    /// Delete duplicates and decide a verdict per submission
    Review {
        /// Submissions manifest (JSON); duplicate flags are written back
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
        /// Directory the submitted photos were downloaded into
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Reject submissions whose photo is a duplicate
        #[arg(long)]
        reject_duplicates: bool,
        /// Accept submissions whose photo is unique
        #[arg(long)]
        accept_uniques: bool,
        /// Reject submissions without a photo
        #[arg(long)]
        reject_missing: bool,
        /// Keep the duplicate files on disk
        #[arg(long)]
        dry_run: bool,
        /// Write verdicts here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Duplicates { command } => {
            let mut config = load_config(&cli)?;
            if let Dups::Cull {
                target_dir: Some(dir),
                ..
            } = command
            {
                // moved files must not be rescanned on a recursive rerun
                config.scan.exclude.push(std::path::absolute(dir)?);
            }
            let dedup = Deduplicator::new(config)?;
            match command {
                Dups::Scan { path, json } => {
                    if !json {
                        println!("▶ Scanning for duplicates in: {}", path.display());
                    }
                    let plan = plan_folder(&dedup, path)?;
                    if *json {
                        println!("{}", serde_json::to_string_pretty(&plan)?);
                    } else {
                        print_plan(&plan);
                    }
                }

                Dups::Cull {
                    path,
                    dry_run,
                    target_dir,
                    no_history,
                } => {
                    println!("▶ Culling duplicates in: {}", path.display());
                    let plan = plan_folder(&dedup, path)?;
                    if !plan.has_duplicates() {
                        println!("No duplicates found.");
                        return Ok(());
                    }
                    print_plan(&plan);

                    let target_dir = target_dir.clone().unwrap_or_else(|| path.join(DEFAULT_MOVE_DIR));
                    let options = ApplyOptions {
                        action: ApplyAction::Move { target_dir },
                        dry_run: *dry_run,
                        record_history: dedup.config().history && !no_history,
                    };
                    let report = dedup
                        .apply(&plan, &options)
                        .with_context(|| format!("Failed to cull {}", path.display()))?;
                    print_report(&report, path, options.record_history);
                }

                Dups::Delete {
                    path,
                    dry_run,
                    yes,
                    no_history,
                } => {
                    println!("▶ Deleting duplicates in: {}", path.display());
                    let plan = plan_folder(&dedup, path)?;
                    if !plan.has_duplicates() {
                        println!("No duplicates found.");
                        return Ok(());
                    }
                    print_plan(&plan);

                    if !dry_run && !yes {
                        let count = plan.rejected_in_order().len();
                        let confirmed = Confirm::new()
                            .with_prompt(format!("Permanently delete {} file(s)?", count))
                            .default(false)
                            .interact()?;
                        if !confirmed {
                            println!("Aborted; no files were changed.");
                            return Ok(());
                        }
                    }

                    let options = ApplyOptions {
                        action: ApplyAction::Delete,
                        dry_run: *dry_run,
                        record_history: dedup.config().history && !no_history,
                    };
                    let report = dedup
                        .apply(&plan, &options)
                        .with_context(|| format!("Failed to delete duplicates in {}", path.display()))?;
                    print_report(&report, path, options.record_history);
                }
            }
        }

        Commands::History { command } => match command {
            HistoryCmd::List { path } => {
                let records = history::read_records(path).with_context(|| {
                    format!("Could not read history in {}", path.display())
                })?;
                println!("🗂️  Reject History:");
                for (i, rec) in records.iter().enumerate() {
                    println!(
                        "[{}] {}\n     kept: {}\n     culled: {:?}\n     action: {:?}\n",
                        i, rec.timestamp, rec.retained, rec.culled, rec.action
                    );
                }
            }

            HistoryCmd::Restore { path, record, all } => {
                let selection = match (all, record) {
                    (true, _) => Selection::All,
                    (false, Some(idx)) => Selection::Index(*idx),
                    (false, None) => Selection::Latest,
                };
                let report = history::restore(path, selection)
                    .with_context(|| format!("Failed to restore in {}", path.display()))?;
                for name in &report.restored {
                    println!("🔄 Restored {}", name);
                }
                for name in &report.skipped {
                    eprintln!("⚠️  Could not restore {}; skipping", name);
                }
                println!(
                    "🧹 Updated history, removed {} record(s)",
                    report.records_removed
                );
            }
        },

        Commands::Submissions { command } => match command {
            SubsCmd::Name { manifest } => {
                let mut loaded = Manifest::load(manifest)
                    .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
                let renamed = loaded.assign_unique_names();
                loaded
                    .save(manifest)
                    .with_context(|| format!("Failed to write manifest {}", manifest.display()))?;
                println!("✅ Renamed {} image(s) in {}", renamed, manifest.display());
            }

            SubsCmd::Review {
                manifest,
                path,
                reject_duplicates,
                accept_uniques,
                reject_missing,
                dry_run,
                out,
            } => {
                let dedup = Deduplicator::new(load_config(&cli)?)?;
                let mut loaded = Manifest::load(manifest)
                    .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;

                println!("Checking for duplicates ...");
                let plan = plan_folder(&dedup, path)?;
                let options = ApplyOptions {
                    action: ApplyAction::Delete,
                    dry_run: *dry_run,
                    record_history: dedup.config().history,
                };
                dedup
                    .apply(&plan, &options)
                    .with_context(|| format!("Failed to delete duplicates in {}", path.display()))?;

                let verdicts = submissions::review(
                    &mut loaded,
                    &plan.rejected(),
                    &ReviewOptions {
                        reject_duplicates: *reject_duplicates,
                        accept_uniques: *accept_uniques,
                        reject_missing: *reject_missing,
                    },
                );
                loaded
                    .save(manifest)
                    .with_context(|| format!("Failed to write manifest {}", manifest.display()))?;

                let rendered = serde_json::to_string_pretty(&verdicts)?;
                match out {
                    Some(out) => {
                        fs::write(out, rendered)
                            .with_context(|| format!("Failed to write {}", out.display()))?;
                        println!("✅ Wrote {} verdict(s) to {}", verdicts.len(), out.display());
                    }
                    None => println!("{}", rendered),
                }
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the config file, then command-line overrides.
fn load_config(cli: &Cli) -> Result<DedupConfig> {
    let mut config =
        DedupConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(algorithm) = cli.hash {
        config.hash.algorithm = algorithm;
    }
    if let Some(size) = cli.hash_size {
        config.hash.size = size;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(keep) = cli.keep {
        config.keep = keep;
    }
    config.scan.recursive |= cli.recursive;
    config.parallel |= cli.parallel;
    Ok(config)
}

/// Hash and cluster `path` behind a progress bar.
fn plan_folder(dedup: &Deduplicator, path: &Path) -> Result<DedupPlan> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.set_message("Scanning for images…");
    bar.enable_steady_tick(Duration::from_millis(100));

    let hashing = ProgressStyle::with_template("{bar:40.green/white} {pos}/{len} {wide_msg}")?;
    let plan = benchmark("hashing all images", || {
        dedup.plan_with_progress(path, &|event: Progress<'_>| match event {
            Progress::Discovered { count } => {
                bar.set_style(hashing.clone());
                bar.set_length(count as u64);
                bar.set_message("hashing");
            }
            Progress::Hashed { name } => {
                bar.set_message(name.to_string());
                bar.inc(1);
            }
        })
    });
    bar.finish_and_clear();

    let plan = plan.with_context(|| format!("Failed to scan {}", path.display()))?;
    for skipped in &plan.skipped {
        eprintln!("⚠️  Skipped {}: {}", skipped.name, skipped.reason);
    }
    Ok(plan)
}

fn print_plan(plan: &DedupPlan) {
    if !plan.has_duplicates() {
        println!("No duplicates found among {} image(s).", plan.image_count);
        return;
    }
    println!(
        "Found {} duplicate group(s) among {} image(s):",
        plan.clusters.len(),
        plan.image_count
    );
    for (i, cluster) in plan.clusters.iter().enumerate() {
        println!("\n✨ Group {}:", i + 1);
        println!("   🏆 Keeping → {}", cluster.survivor);
        for rejected in &cluster.rejected {
            match rejected.kind {
                MatchKind::Identical => println!("   ▶ {} (identical)", rejected.name),
                MatchKind::Similar { distance } => {
                    println!("   ▶ {} (distance {})", rejected.name, distance)
                }
            }
        }
    }
    if plan.is_partial() {
        println!("\n⚠️  {} file(s) could not be read and were left out.", plan.skipped.len());
    }
}

fn print_report(report: &ApplyReport, folder: &Path, recorded: bool) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    for name in &report.removed {
        println!("   🗑️  {}Deleted {}", prefix, name);
    }
    for (name, dest) in &report.moved {
        println!("   📦 {}Moved {} → {}", prefix, name, dest.display());
    }
    for name in &report.already_gone {
        println!("   ⏭  {} was already gone", name);
    }

    if report.dry_run {
        println!("\n⚠️  Dry-run only; no files were changed.");
    } else if recorded {
        println!(
            "\n✅ Recorded history in {}",
            history::history_path(folder).display()
        );
    }
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
