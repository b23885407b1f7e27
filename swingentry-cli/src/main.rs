//! SwingEntry CLI: evaluate, batch, compare and preset commands.
//!
//! Commands:
//! - `evaluate`: one instrument from a bar file and a snapshot file
//! - `batch`: every `{snapshot, bars}` JSON file in a directory, in parallel
//! - `compare`: buy-now vs wait report from a backtest events JSON file
//! - `presets`: print a mode preset as TOML

mod loader;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use swingentry_core::report::BuyNowReport;
use swingentry_core::{
    DebugLevel, Decision, EngineConfig, EvaluateOptions, Evaluator, ExternalScore, GuardSamples,
    MarketContext, Mode, Sentiment, SetupKind,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "swingentry", about = "SwingEntry CLI: entry-timing decisions for swing trades")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,
}

/// Options shared by `evaluate` and `batch`.
#[derive(clap::Args, Debug, Clone)]
struct EngineArgs {
    /// Mode preset: strict, balanced, loose.
    #[arg(long, default_value = "balanced")]
    preset: Mode,

    /// TOML file with partial overrides merged over the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Setup kinds to run, comma separated (default: all).
    #[arg(long, value_delimiter = ',')]
    kinds: Vec<SetupKind>,

    /// Telemetry detail: off, gates, full.
    #[arg(long, default_value = "off")]
    debug_level: DebugLevel,

    /// Index percent change today, enables the market impulse guard.
    #[arg(long, allow_hyphen_values = true)]
    index_change_pct: Option<f64>,

    /// Index ATR as a percent of its level.
    #[arg(long, requires = "index_change_pct")]
    index_atr_pct: Option<f64>,

    /// Short-term sentiment, 1 (bearish) to 7 (bullish).
    #[arg(long, requires = "lt_sentiment")]
    st_sentiment: Option<u8>,

    /// Long-term sentiment, 1 (bearish) to 7 (bullish).
    #[arg(long, requires = "st_sentiment")]
    lt_sentiment: Option<u8>,

    /// External model score in [0, 1], 0.5 neutral.
    #[arg(long, requires = "external_confidence")]
    external_score: Option<f64>,

    /// Confidence in the external score, [0, 1].
    #[arg(long, requires = "external_score")]
    external_confidence: Option<f64>,
}

impl EngineArgs {
    fn evaluator(&self) -> Result<Evaluator> {
        let config = loader::load_config(self.preset, self.config.as_deref())?;
        let sentiment = match (self.st_sentiment, self.lt_sentiment) {
            (Some(st), Some(lt)) => Some(Sentiment::new(st, lt)?),
            _ => None,
        };
        let options = EvaluateOptions {
            config,
            allowed_kinds: if self.kinds.is_empty() {
                SetupKind::ALL.to_vec()
            } else {
                self.kinds.clone()
            },
            sentiment,
            debug_level: self.debug_level,
            market: self.index_change_pct.map(|chg| MarketContext {
                index_change_pct: chg,
                index_atr_pct: self.index_atr_pct,
            }),
            external_score: self
                .external_score
                .zip(self.external_confidence)
                .map(|(score, confidence)| ExternalScore { score, confidence }),
        };
        let evaluator = Evaluator::new(options);
        info!(
            mode = %evaluator.config().mode.name(),
            fingerprint = %evaluator.fingerprint(),
            kinds = ?evaluator.kinds(),
            "evaluator ready"
        );
        Ok(evaluator)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate one instrument and print the decision as JSON.
    Evaluate {
        /// Daily bars, CSV (date,open,high,low,close,volume) or a JSON array.
        #[arg(long)]
        bars: PathBuf,

        /// Indicator snapshot JSON.
        #[arg(long)]
        snapshot: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Evaluate every `*.json` instrument file in a directory; one JSON line each.
    Batch {
        /// Directory of `{"snapshot": …, "bars": […]}` files.
        #[arg(long)]
        input: PathBuf,

        /// Worker threads (default: rayon's global pool).
        #[arg(long)]
        threads: Option<usize>,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the buy-now vs wait comparison for a backtest events file.
    Compare {
        /// Backtest JSON with an `events` array.
        path: PathBuf,
    },
    /// Print a mode preset as TOML.
    Presets {
        /// Mode preset: strict, balanced, loose.
        #[arg(long, default_value = "balanced")]
        mode: Mode,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Evaluate {
            bars,
            snapshot,
            engine,
        } => run_evaluate(&bars, &snapshot, &engine),
        Commands::Batch {
            input,
            threads,
            engine,
        } => run_batch(&input, threads, &engine),
        Commands::Compare { path } => run_compare(&path),
        Commands::Presets { mode } => run_presets(mode),
    }
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::WARN;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(verbose, quiet))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}

fn run_evaluate(bars: &Path, snapshot: &Path, engine: &EngineArgs) -> Result<()> {
    let evaluator = engine.evaluator()?;
    let bars = loader::load_bars(bars)?;
    let raw = loader::load_snapshot(snapshot)?;
    let decision = evaluator.evaluate(&raw, &bars);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

/// Per-file outcome of a batch run.
struct BatchItem {
    file: String,
    outcome: Result<(Decision, GuardSamples)>,
}

fn evaluate_file(evaluator: &Evaluator, path: &Path) -> BatchItem {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let outcome = loader::load_instrument(path).map(|inst| {
        let mut samples = GuardSamples::new();
        let decision = evaluator.evaluate_raw(&inst.snapshot, &inst.bars, &mut samples);
        (decision, samples)
    });
    BatchItem { file, outcome }
}

fn run_batch(input: &Path, threads: Option<usize>, engine: &EngineArgs) -> Result<()> {
    let evaluator = engine.evaluator()?;
    let files = loader::instrument_files(input)?;
    info!(count = files.len(), dir = %input.display(), "batch start");

    let evaluate_all = || -> Vec<BatchItem> {
        files
            .par_iter()
            .map(|path| evaluate_file(&evaluator, path))
            .collect()
    };
    let items = match threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .context("building worker pool")?
            .install(evaluate_all),
        None => evaluate_all(),
    };

    let mut merged = GuardSamples::new();
    let (mut buys, mut errors) = (0usize, 0usize);
    for item in items {
        let line = match item.outcome {
            Ok((decision, samples)) => {
                merged.merge(&samples);
                buys += usize::from(decision.buy_now);
                serde_json::json!({ "file": item.file, "decision": decision })
            }
            Err(e) => {
                errors += 1;
                warn!(file = %item.file, error = %format!("{e:#}"), "instrument skipped");
                serde_json::json!({ "file": item.file, "error": format!("{e:#}") })
            }
        };
        println!("{line}");
    }

    for (name, d) in merged.distributions() {
        info!(
            histogram = %name,
            count = d.count,
            min = d.min,
            max = d.max,
            mean = d.mean,
            median = d.median,
            "guard distribution"
        );
    }
    info!(
        evaluated = files.len() - errors,
        buy_now = buys,
        errors,
        "batch done"
    );
    Ok(())
}

fn run_compare(path: &Path) -> Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let report = BuyNowReport::from_json(&text)
        .with_context(|| format!("parsing backtest events in {}", path.display()))?;
    print!("{}", report.render());
    Ok(())
}

fn run_presets(mode: Mode) -> Result<()> {
    print!("{}", EngineConfig::preset(mode).to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_args_parse() {
        let cli = Cli::try_parse_from([
            "swingentry",
            "evaluate",
            "--bars",
            "b.csv",
            "--snapshot",
            "s.json",
            "--preset",
            "strict",
            "--kinds",
            "dip,breakout",
            "--debug-level",
            "gates",
            "--index-change-pct",
            "-1.2",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Evaluate { engine, .. } = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(engine.preset, Mode::Strict);
        assert_eq!(engine.kinds, vec![SetupKind::DipBounce, SetupKind::Breakout]);
        assert_eq!(engine.debug_level, DebugLevel::Gates);
        assert_eq!(engine.index_change_pct, Some(-1.2));
    }

    #[test]
    fn sentiment_needs_both_scores() {
        let parsed = Cli::try_parse_from([
            "swingentry",
            "evaluate",
            "--bars",
            "b.csv",
            "--snapshot",
            "s.json",
            "--st-sentiment",
            "6",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn out_of_range_sentiment_is_rejected() {
        let cli = Cli::try_parse_from([
            "swingentry",
            "batch",
            "--input",
            "dir",
            "--st-sentiment",
            "9",
            "--lt-sentiment",
            "4",
        ])
        .unwrap();
        let Commands::Batch { engine, .. } = cli.command else {
            panic!("expected batch");
        };
        assert!(engine.evaluator().is_err());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0, false), Level::INFO);
        assert_eq!(log_level(2, false), Level::TRACE);
        assert_eq!(log_level(2, true), Level::WARN);
    }

    #[test]
    fn batch_reports_bad_files_without_stopping() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(
            dir.path().join("short.json"),
            r#"{"snapshot":{"ticker":"S","price":10.0},"bars":[]}"#,
        )
        .unwrap();
        let evaluator = Evaluator::new(EvaluateOptions::default());
        let bad = evaluate_file(&evaluator, &dir.path().join("bad.json"));
        assert!(bad.outcome.is_err());
        let short = evaluate_file(&evaluator, &dir.path().join("short.json"));
        let (decision, samples) = short.outcome.unwrap();
        assert!(!decision.buy_now);
        assert!(decision.reason.contains("insufficient data"));
        assert!(samples.is_empty());
    }
}
