//! # CLI Module
//!
//! Command-line interface for sample curation.
//!
//! ## Usage
//! ```bash
//! # Clean the new-sample area and merge it into the corpus
//! sample-curate curate
//!
//! # Custom directories and threshold
//! sample-curate curate --new-dir capture/new --persistent-dir capture/corpus --threshold 8
//!
//! # JSON report for scripting
//! sample-curate curate --output json
//!
//! # Distance between two samples
//! sample-curate diff a.png b.png
//!
//! # Label counts per area
//! sample-curate list
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use sample_curation::config::CurationConfig;
use sample_curation::core::pipeline::{CancellationToken, CurationPipeline, CurationReport};
use sample_curation::core::similarity::DistanceFormula;
use sample_curation::core::curation::diff_samples;
use sample_curation::core::store::{Label, SampleId, SampleName, SampleStore};
use sample_curation::events::{DedupEvent, Event, EventChannel, MergeEvent, PipelineEvent};
use sample_curation::Result;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use tracing::warn;

/// Exit code after Ctrl+C (128 + SIGINT)
const EXIT_CODE_INTERRUPTED: u8 = 130;

/// Sample Curation - Keep the training corpus free of near-duplicates
#[derive(Parser, Debug)]
#[command(name = "sample-curate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/sample-curation/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deduplicate new samples and merge them into the corpus
    Curate {
        #[command(flatten)]
        dirs: DirArgs,

        /// Near-duplicate distance threshold
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Cache budget in MiB
        #[arg(long)]
        cache_mb: Option<usize>,

        /// Deduplication workers
        #[arg(long)]
        dedup_workers: Option<usize>,

        /// Corpus search workers
        #[arg(long)]
        search_workers: Option<usize>,

        /// Blue-channel formula
        #[arg(long)]
        formula: Option<Formula>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Print the distance between two sample files
    Diff {
        a: PathBuf,
        b: PathBuf,

        /// Blue-channel formula
        #[arg(long)]
        formula: Option<Formula>,
    },

    /// Count samples per area and label
    List {
        #[command(flatten)]
        dirs: DirArgs,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
}

#[derive(clap::Args, Debug)]
struct DirArgs {
    /// New-sample directory
    #[arg(long)]
    new_dir: Option<PathBuf>,

    /// Persistent corpus directory
    #[arg(long)]
    persistent_dir: Option<PathBuf>,
}

impl DirArgs {
    fn apply(self, config: &mut CurationConfig) {
        if let Some(dir) = self.new_dir {
            config.new_dir = dir;
        }
        if let Some(dir) = self.persistent_dir {
            config.persistent_dir = dir;
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum Formula {
    /// Root-mean-square over red, green and blue (default)
    Rms,
    /// Blue term of corpora curated with the old tool
    LegacyGreenBlue,
}

impl From<Formula> for DistanceFormula {
    fn from(formula: Formula) -> Self {
        match formula {
            Formula::Rms => DistanceFormula::Rms,
            Formula::LegacyGreenBlue => DistanceFormula::LegacyGreenBlue,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    sample_curation::init_tracing(if cli.verbose { "debug" } else { "warn" });

    let mut config = CurationConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Curate {
            dirs,
            threshold,
            cache_mb,
            dedup_workers,
            search_workers,
            formula,
            output,
        } => {
            dirs.apply(&mut config);
            if let Some(threshold) = threshold {
                config.near_duplicate_threshold = threshold;
            }
            if let Some(mb) = cache_mb {
                config.cache_budget_bytes = mb.saturating_mul(1024 * 1024);
            }
            if dedup_workers.is_some() {
                config.dedup_workers = dedup_workers;
            }
            if search_workers.is_some() {
                config.search_workers = search_workers;
            }
            if let Some(formula) = formula {
                config.distance_formula = formula.into();
            }
            run_curate(&config, output, cli.verbose)
        }
        Commands::Diff { a, b, formula } => {
            if let Some(formula) = formula {
                config.distance_formula = formula.into();
            }
            run_diff(&config, &a, &b)
        }
        Commands::List { dirs, output } => {
            dirs.apply(&mut config);
            run_list(&config, output)
        }
    }
}

fn run_curate(config: &CurationConfig, output: OutputFormat, verbose: bool) -> Result<ExitCode> {
    let term = Term::stderr();
    let pipeline = CurationPipeline::from_config(config)?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing the current step...");
        handler_token.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl+C handler");
    }

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Sample Curation").bold().cyan(),
            style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line(&format!(
            "  {} → {}",
            style(config.new_dir.display()).dim(),
            style(config.persistent_dir.display()).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let (sender, receiver) = EventChannel::new();

    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress_clone else {
                continue;
            };
            match &event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    pb.set_position(0);
                    pb.set_message(phase.to_string());
                }
                Event::Dedup(DedupEvent::Progress { percent }) => pb.set_position(*percent as u64),
                Event::Merge(MergeEvent::Started { total }) => {
                    pb.set_length((*total).max(1) as u64);
                    pb.set_position(0);
                }
                Event::Merge(
                    MergeEvent::DuplicateFound { .. } | MergeEvent::Promoted { .. } | MergeEvent::Failed { .. },
                ) => pb.inc(1),
                Event::Merge(MergeEvent::SearchProgress { id, .. }) if verbose => {
                    pb.set_message(id.base_name().to_string());
                }
                Event::Pipeline(PipelineEvent::Completed { .. } | PipelineEvent::Cancelled { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
            if verbose && !matches!(
                event,
                Event::Dedup(DedupEvent::Progress { .. }) | Event::Merge(MergeEvent::SearchProgress { .. })
            ) {
                pb.println(event.to_string());
            }
        }
    });

    let result = pipeline.run_with_events(&token, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let report = result?;
    match output {
        OutputFormat::Pretty => print_pretty_report(&term, &report, verbose),
        OutputFormat::Json => print_json(&report),
    }

    if report.is_cancelled() {
        Ok(ExitCode::from(EXIT_CODE_INTERRUPTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_pretty_report(term: &Term, report: &CurationReport, verbose: bool) {
    let summary = &report.summary;
    let headline = if report.is_cancelled() {
        format!("{} Curation cancelled", style("!").yellow().bold())
    } else {
        format!("{} Curation complete", style("✓").green().bold())
    };
    term.write_line(&headline).ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} new samples processed in {:.1}s",
        style(summary.new_samples).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} near-duplicates removed from the new area",
        style(summary.duplicates_removed).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} already in the corpus",
        style(summary.redundant_with_corpus).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} promoted into the corpus",
        style(summary.promoted).green()
    ))
    .ok();

    if verbose {
        term.write_line(&format!(
            "  {} cache hit rate ({} evictions)",
            style(format!("{:.0}%", report.cache.hit_rate() * 100.0)).dim(),
            report.cache.evictions
        ))
        .ok();
    }

    if !report.failures.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!(
            "  {} samples were skipped and left in place:",
            style(report.failures.len()).yellow()
        ))
        .ok();
        for failure in &report.failures {
            term.write_line(&format!("    {} {}", style("○").dim(), failure)).ok();
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "failed to serialize output"),
    }
}

fn run_diff(config: &CurationConfig, a: &Path, b: &Path) -> Result<ExitCode> {
    config.validate()?;
    let store = config.store();
    let metric = config.metric();

    let distance = diff_samples(&store, &SampleId::from_path(a), &SampleId::from_path(b), &metric)?;
    let verdict = if metric.is_near_duplicate(distance) {
        style("near-duplicate").yellow().to_string()
    } else {
        style("distinct").green().to_string()
    };
    println!("{distance:.3} ({verdict})");
    Ok(ExitCode::SUCCESS)
}

/// Sample counts of one area
#[derive(Debug, Default, serde::Serialize)]
struct AreaCounts {
    positive: usize,
    negative: usize,
    /// Files not following the naming convention
    unnamed: usize,
}

impl AreaCounts {
    fn of(ids: &[SampleId]) -> Self {
        let mut counts = Self::default();
        for id in ids {
            match SampleName::parse(id.base_name()).map(|name| name.label) {
                Some(Label::Positive) => counts.positive += 1,
                Some(Label::Negative) => counts.negative += 1,
                None => counts.unnamed += 1,
            }
        }
        counts
    }
}

fn run_list(config: &CurationConfig, output: OutputFormat) -> Result<ExitCode> {
    let store = config.store();
    let new = AreaCounts::of(&store.list_new()?);
    let persistent = AreaCounts::of(&store.list_persistent()?);

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "new": new,
            "persistent": persistent,
        })),
        OutputFormat::Pretty => {
            let term = Term::stdout();
            for (name, dir, counts) in [
                ("new", &config.new_dir, &new),
                ("persistent", &config.persistent_dir, &persistent),
            ] {
                term.write_line(&format!(
                    "{:<11} {} positive, {} negative{}  {}",
                    style(name).bold(),
                    style(counts.positive).green(),
                    style(counts.negative).cyan(),
                    if counts.unnamed > 0 {
                        format!(", {} unnamed", style(counts.unnamed).yellow())
                    } else {
                        String::new()
                    },
                    style(dir.display()).dim()
                ))
                .ok();
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
