//! CLI for Keel policy-governed stores.
//!
//! `demo` walks one store through every outcome; `stress` hammers a shared
//! store from many workers and checks that the commits form one chain.

use clap::{Parser, Subcommand};
use keel_harness::report::Report;
use keel_harness::sink::json_stream::JsonStreamSink;
use keel_harness::ContentionConfig;
use keel_store::{FnPolicy, Store};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keel", version, about = "Policy-governed value stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk a store through accepted, rejected, failed, adjusted and
    /// not-allowed changes.
    Demo {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the contention harness against one shared store.
    Stress {
        #[arg(short, long, env = "KEEL_WORKERS", default_value_t = 8)]
        workers: usize,

        #[arg(short, long, env = "KEEL_ATTEMPTS", default_value_t = 500)]
        attempts: usize,

        /// Counter value at which the store stops allowing changes.
        #[arg(short, long, env = "KEEL_LIMIT", default_value_t = 2_500)]
        limit: i64,

        #[arg(long, env = "KEEL_MAX_STEP", default_value_t = 2)]
        max_step: i64,

        /// Async driver only; 0 runs every worker at once.
        #[arg(long, env = "KEEL_MAX_IN_FLIGHT", default_value_t = 0)]
        max_in_flight: usize,

        /// Use the tokio driver instead of the rayon one.
        #[arg(long = "async", default_value_t = false)]
        use_async: bool,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long, value_parser = parse_sink)]
        sink: Option<SinkTarget>,
    },
}

/// Where `--sink` sends NDJSON rows.
#[derive(Debug, Clone, PartialEq)]
enum SinkTarget {
    Stdout,
    File(PathBuf),
}

fn parse_sink(spec: &str) -> Result<SinkTarget, String> {
    if spec == "ndjson" {
        return Ok(SinkTarget::Stdout);
    }
    match spec.strip_prefix("ndjson:") {
        Some(path) if !path.is_empty() => Ok(SinkTarget::File(PathBuf::from(path))),
        _ => Err(format!("unknown sink `{spec}`; use 'ndjson' or 'ndjson:/path'")),
    }
}

/// Reasons the demo store refuses a change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
enum DemoReason {
    NegativeValue,
    Frozen,
}

const CAP: i64 = 100;

fn demo(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let policy = FnPolicy::<i64, DemoReason>::new()
        .deny_if(|v| (*v >= CAP).then_some(DemoReason::Frozen))
        .map_proposal(|_, p| (*p).min(CAP))
        .reject_if(|v| (*v < 0).then_some(DemoReason::NegativeValue));
    let store = Store::with_policy("demo", 5i64, policy);

    let steps = [
        ("x + 1", store.update(|x| x + 1)),
        ("-1", store.update(|_| -1)),
        ("lookup", store.change(|_| Err::<i64, _>("upstream lookup failed"))),
        ("x * 1000", store.update(|x| x * 1000)),
        ("x + 1", store.update(|x| x + 1)),
    ];

    if json {
        let outcomes: Vec<_> = steps.iter().map(|(_, o)| o).collect();
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    println!("store {} starts at 5, caps proposals at {CAP}", store.handle());
    for (transform, outcome) in &steps {
        println!("  {transform:<10} {:<12} {outcome}", outcome.kind().as_str());
    }
    println!("store {} ends at {} after {} commits", store.handle(), store.current(), store.commits());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { json } => demo(json)?,
        Commands::Stress {
            workers,
            attempts,
            limit,
            max_step,
            max_in_flight,
            use_async,
            sink,
        } => {
            let config = ContentionConfig {
                workers,
                attempts_per_worker: attempts,
                limit,
                max_step,
                max_in_flight,
                ..ContentionConfig::default()
            };

            let run = if use_async {
                keel_harness::run_async(config).await?
            } else {
                tokio::task::spawn_blocking(move || keel_harness::run_blocking(config)).await??
            };
            let report = Report::build(&run);

            if let Some(target) = sink {
                let (summary, outcomes) = report.to_rows(&run);

                match target {
                    SinkTarget::Stdout => {
                        let mut s = JsonStreamSink::stdout();
                        s.write_summary(&summary)?;
                        s.write_outcomes(&outcomes)?;
                        let n = s.finish()?;
                        tracing::info!(rows = n, "ndjson sink: wrote to stdout");
                    }
                    SinkTarget::File(path) => {
                        let file = std::fs::File::create(&path)?;
                        let mut s = JsonStreamSink::new(file);
                        s.write_summary(&summary)?;
                        s.write_outcomes(&outcomes)?;
                        let n = s.finish()?;
                        tracing::info!(rows = n, path = %path.display(), "ndjson sink: wrote to file");
                    }
                }

                // Stdout is reserved for the rows.
                eprint!("{}", report.render());
            } else {
                print!("{}", report.render());
            }

            if !report.chain.is_ok() {
                return Err(format!(
                    "ordering check failed with {} violation(s)",
                    report.chain.violations.len()
                )
                .into());
            }
        }
    }

    Ok(())
}
