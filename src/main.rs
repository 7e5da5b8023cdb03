mod carriers;
mod db;
mod error;
mod expand;
mod export;
mod extract;
mod http;
mod model;
mod normalize;
mod pipeline;
mod random;
mod scheduler;
mod session;
mod settings;
#[cfg(test)]
mod testing;
mod worker;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use carriers::CarrierKind;
use http::HttpClient;
use model::RunResult;
use pipeline::Pipeline;
use random::{RandomSource, SeededRandom, ThreadRandom};
use session::Session;
use settings::Settings;

#[derive(Parser)]
#[command(name = "subsidy_crawler", about = "Carrier device subsidy crawler (SKT, LG U+)")]
struct Cli {
    /// Settings file (default: ./subsidy.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every plan x subscription type x term for one carrier
    Run {
        #[arg(short, long, value_enum)]
        carrier: CarrierKind,
        /// Concurrent fetch tasks (overrides settings)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Browser-exported cookie JSON (required for lguplus)
        #[arg(long)]
        cookies: Option<PathBuf>,
        /// Output directory for JSON and CSV files
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip TLS certificate validation
        #[arg(long)]
        insecure: bool,
        /// Stop scheduling new work after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
        /// Do not record the run in SQLite
        #[arg(long)]
        no_db: bool,
        /// Seed for pacing delays and User-Agent rotation (replayable runs)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List the plans a carrier currently advertises
    Catalog {
        #[arg(short, long, value_enum)]
        carrier: CarrierKind,
        #[arg(long)]
        cookies: Option<PathBuf>,
        #[arg(long)]
        insecure: bool,
        #[arg(long)]
        seed: Option<u64>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show recent runs stored in the database
    Runs {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run {
            carrier,
            workers,
            cookies,
            out,
            insecure,
            deadline,
            no_db,
            seed,
        } => {
            if let Some(n) = workers {
                settings.workers = n;
            }
            if let Some(dir) = out {
                settings.output_dir = dir;
            }
            settings.http.accept_invalid_certs |= insecure;

            let cancel = CancellationToken::new();
            spawn_cancel_triggers(cancel.clone(), deadline.map(Duration::from_secs));

            let pipeline = build_pipeline(carrier, cookies.as_deref(), seed, &settings, cancel)?
                .show_progress(std::io::stderr().is_terminal());
            let run = pipeline.run().await?;
            print_summary(&run);

            if run.records.is_empty() {
                println!("No subsidy records collected; no files written.");
            } else {
                let json = export::write_json(&settings.output_dir, &run)?;
                let csv = export::write_csv(&settings.output_dir, &run)?;
                println!("JSON: {}", json.display());
                println!("CSV:  {}", csv.display());
            }

            if !no_db {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                let id = db::save_run(&conn, &run)?;
                println!("Saved as run #{} in {}", id, settings.db_path.display());
            }
            Ok(())
        }
        Commands::Catalog {
            carrier,
            cookies,
            insecure,
            seed,
            limit,
        } => {
            settings.http.accept_invalid_certs |= insecure;
            let pipeline =
                build_pipeline(carrier, cookies.as_deref(), seed, &settings, CancellationToken::new())?;
            let entries = pipeline.catalog().await?;

            println!("{:>3} | {:<14} | {:<36} | {:<16}", "#", "Plan ID", "Plan", "Category");
            println!("{}", "-".repeat(78));
            for (i, e) in entries.iter().take(limit).enumerate() {
                println!(
                    "{:>3} | {:<14} | {:<36} | {:<16}",
                    i + 1,
                    e.id,
                    truncate(&e.name, 36),
                    truncate(&e.category, 16)
                );
            }
            println!("\n{} plans ({} shown)", entries.len(), entries.len().min(limit));
            Ok(())
        }
        Commands::Runs { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_runs(&conn, limit)?;
            if rows.is_empty() {
                println!("No runs recorded. Run 'run' first.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<8} | {:<25} | {:>6} | {:>5} | {:>5} | {:>6} | {:>6} | {:>7}",
                "#", "Carrier", "Started", "Tasks", "OK", "Empty", "Failed", "Cancel", "Records"
            );
            println!("{}", "-".repeat(98));
            for r in &rows {
                println!(
                    "{:>4} | {:<8} | {:<25} | {:>6} | {:>5} | {:>5} | {:>6} | {:>6} | {:>7}",
                    r.id,
                    r.carrier,
                    truncate(&r.started_at, 25),
                    r.tasks_total,
                    r.tasks_succeeded,
                    r.tasks_empty,
                    r.tasks_failed,
                    r.tasks_cancelled,
                    r.records
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_pipeline(
    kind: CarrierKind,
    cookies: Option<&Path>,
    seed: Option<u64>,
    settings: &Settings,
    cancel: CancellationToken,
) -> anyhow::Result<Pipeline> {
    let carrier = kind.build();
    let session = match cookies {
        Some(path) => Session::from_cookie_file(path)?,
        None => Session::anonymous(),
    };
    let client = HttpClient::from_settings(&settings.http).context("Failed to set up HTTP client")?;
    let random: Arc<dyn RandomSource> = match seed {
        Some(seed) => {
            info!("Using fixed random seed {}", seed);
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };
    Ok(Pipeline::new(
        carrier,
        client,
        Arc::new(session),
        random,
        settings,
        cancel,
    ))
}

/// Ctrl-C, or the optional deadline, cancels the run. Tasks already in
/// flight finish their current page; everything queued is dropped.
fn spawn_cancel_triggers(cancel: CancellationToken, deadline: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    warn!("Interrupted, cancelling remaining tasks");
                    token.cancel();
                }
            }
        }
    });

    if let Some(limit) = deadline {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    info!("Deadline of {} reached, cancelling remaining tasks", format_duration(limit));
                    cancel.cancel();
                }
            }
        });
    }
}

fn print_summary(run: &RunResult) {
    let s = &run.stats;
    println!("\n=== {} ===", run.carrier);
    println!("Tasks:     {} attempted of {}", s.attempted(), s.total);
    println!("Succeeded: {}", s.succeeded);
    println!("Empty:     {}", s.empty);
    println!("Failed:    {}", s.failed);
    for (reason, count) in s.top_failures(3) {
        println!("  {:>5} x {}", count, reason);
    }
    if s.cancelled > 0 {
        println!("Cancelled: {}", s.cancelled);
    }
    println!("Records:   {}", run.records.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
