//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_tick_adapter::{parse_timestamp, CsvTickSource};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::adapters::memory_history_adapter::MemoryHistoryAdapter;
use crate::domain::config::{PipelineConfig, StorageConfig};
use crate::domain::error::ScalpwatchError;
use crate::domain::history::{HistoryQuery, SignalHistoryRecord};
use crate::domain::pipeline::Pipeline;
use crate::domain::query::PipelineSnapshot;
use crate::ports::history_port::HistoryPort;

#[derive(Parser, Debug)]
#[command(name = "scalpwatch", about = "Live trading-signal pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a CSV tick feed through the pipeline
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        ticks: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print stored signal history as CSV, newest first
    History {
        #[arg(short, long)]
        config: PathBuf,
        /// RFC 3339 or Unix milliseconds
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_timestamp)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run { config, ticks } => run_replay(&config, &ticks),
        Command::Validate { config } => run_validate(&config),
        Command::History {
            config,
            from,
            to,
            limit,
            offset,
        } => run_history(
            &config,
            &HistoryQuery {
                from,
                to,
                limit,
                offset,
            },
        ),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig, ScalpwatchError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    PipelineConfig::from_port(&adapter)
}

/// SQLite when a path is configured, otherwise an in-process store.
pub fn open_history(storage: &StorageConfig) -> Result<Arc<dyn HistoryPort>, ScalpwatchError> {
    match &storage.path {
        #[cfg(feature = "sqlite")]
        Some(path) => {
            use crate::adapters::sqlite_adapter::SqliteHistoryAdapter;
            Ok(Arc::new(SqliteHistoryAdapter::open(path, storage.pool_size)?))
        }
        #[cfg(not(feature = "sqlite"))]
        Some(_) => Err(ScalpwatchError::invalid(
            "history",
            "path",
            "the sqlite feature is required for persistent history",
        )),
        None => Ok(Arc::new(MemoryHistoryAdapter::new())),
    }
}

fn run_replay(config_path: &Path, ticks_path: &Path) -> Result<ExitCode, ScalpwatchError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let history = open_history(&config.storage)?;
    let mut pipeline = Pipeline::new(config, history, Box::new(LogNotifier))?;
    let query = pipeline.query_handle();

    eprintln!("Replaying ticks from {}", ticks_path.display());
    let mut source = CsvTickSource::from_path(ticks_path)?;
    let summary = pipeline.run_feed(&mut source);

    let snapshot = query.snapshot();
    eprintln!(
        "{} ticks, {} candles, {} rejected, {} feed errors",
        summary.ticks, summary.candles, summary.rejected, summary.feed_errors
    );
    print_summary(&snapshot, std::io::stdout().lock())?;

    if snapshot.health.history.is_degraded() {
        eprintln!(
            "error: {} history writes not persisted",
            snapshot.health.history.buffered as u64 + snapshot.health.history.dropped
        );
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate(config_path: &Path) -> Result<ExitCode, ScalpwatchError> {
    let config = load_config(config_path)?;
    let enabled: Vec<&str> = config.enabled.iter().map(|k| k.name()).collect();
    println!("Configuration OK: {}", config_path.display());
    println!("  interval: {}s", config.interval.num_seconds());
    println!("  enabled indicators: {}", enabled.join(", "));
    println!("  entry threshold: {}", config.position.entry_threshold);
    match &config.storage.path {
        Some(path) => println!("  history: {}", path.display()),
        None => println!("  history: in memory"),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_history(config_path: &Path, query: &HistoryQuery) -> Result<ExitCode, ScalpwatchError> {
    let config = load_config(config_path)?;
    if config.storage.path.is_none() {
        eprintln!("error: [history] path is not configured");
        return Ok(ExitCode::from(2));
    }
    let history = open_history(&config.storage)?;
    let page = history.query(query)?;
    write_history_csv(&page.records, std::io::stdout().lock())?;
    if page.has_more {
        eprintln!(
            "more records available; continue with --offset {}",
            query.offset + page.records.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn write_history_csv<W: Write>(
    records: &[SignalHistoryRecord],
    out: W,
) -> Result<(), ScalpwatchError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([
            "id",
            "timestamp",
            "signal_name",
            "signal_value",
            "score",
            "open_price",
            "close_price",
            "event",
            "result",
        ])
        .map_err(csv_err)?;
    for r in records {
        writer
            .write_record([
                r.id.to_string(),
                r.timestamp.to_rfc3339(),
                r.signal_name.clone(),
                format!("{:.6}", r.signal_value),
                format!("{:.6}", r.score),
                r.open_price.map(|p| p.to_string()).unwrap_or_default(),
                r.close_price.map(|p| p.to_string()).unwrap_or_default(),
                r.event.to_string(),
                r.result.to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_err(e: csv::Error) -> ScalpwatchError {
    ScalpwatchError::Io(e.into())
}

pub fn print_summary<W: Write>(snapshot: &PipelineSnapshot, mut out: W) -> std::io::Result<()> {
    match &snapshot.latest {
        Some(latest) => writeln!(out, "Latest price: {} at {}", latest.price, latest.timestamp)?,
        None => writeln!(out, "Latest price: none")?,
    }
    if let Some(score) = &snapshot.score {
        writeln!(
            out,
            "Score: {:+.3} ({:.1}/10): {}",
            score.composite_score,
            score.display_score(),
            score.advice()
        )?;
        for c in &score.breakdown {
            writeln!(
                out,
                "  {:<15} {:<8} strength {:.2} weight {:.3} -> {:+.4}",
                c.indicator.name(),
                c.direction,
                c.strength,
                c.weight,
                c.contribution
            )?;
        }
    }
    match &snapshot.position {
        Some(view) => writeln!(
            out,
            "Position: {} {:.6} @ {} stop {:.2} target {:.2} unrealized {:+.2}",
            view.position.side,
            view.position.size,
            view.position.entry_price,
            view.position.stop_loss,
            view.position.take_profit,
            view.unrealized_pnl
        )?,
        None => writeln!(out, "Position: none")?,
    }
    let capital = &snapshot.capital;
    writeln!(
        out,
        "Capital: equity {:.2} realized {:+.2} phase {} trades {} wins {}",
        capital.equity, capital.realized_pnl, capital.phase, capital.trades, capital.wins
    )?;
    Ok(())
}
