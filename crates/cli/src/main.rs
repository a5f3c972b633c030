//! hazardq CLI - Producer entry point and queue tools
//!
//! `produce` splits the loan population into jobs on Redis and sums the
//! results reported by `hazardq-worker` processes.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

use hazardq_core::application::producer::planned_jobs;
use hazardq_core::application::worker::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RESULT_TIMEOUT, DEFAULT_RETRY_DELAY,
};
use hazardq_core::application::{run_local, ConnectionManager, HazardKernel, Producer};
use hazardq_core::config::{
    BrokerConfig, RunConfig, DEFAULT_N_JOBS, DEFAULT_N_LOANS, DEFAULT_REDIS_HOST,
    DEFAULT_REDIS_PORT,
};
use hazardq_core::domain::survival::{DEFAULT_HAZARD_RATE, DEFAULT_TIME_HORIZON};
use hazardq_core::domain::{ModelParams, RunPlan, RunSummary, JOBS_QUEUE, RESULTS_QUEUE};
use hazardq_core::port::Broker;
use hazardq_core::AppError;
use hazardq_infra_redis::RedisConnector;

const DEFAULT_LOCAL_WORKERS: usize = 4;

#[derive(Parser)]
#[command(name = "hazardq")]
#[command(about = "Distributed constant-hazard default simulation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Broker host
    #[arg(long, global = true, env = "REDIS_HOST", default_value = DEFAULT_REDIS_HOST)]
    redis_host: String,

    /// Broker port
    #[arg(long, global = true, env = "REDIS_PORT", default_value_t = DEFAULT_REDIS_PORT)]
    redis_port: u16,

    /// Connection attempts before giving up
    #[arg(long, global = true, env = "BROKER_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Delay between connection attempts (ms)
    #[arg(
        long,
        global = true,
        env = "BROKER_RETRY_DELAY_MS",
        default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64
    )]
    retry_delay_ms: u64,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Total loan population
    #[arg(long, env = "N_LOANS", default_value_t = DEFAULT_N_LOANS)]
    loans: u64,

    /// Number of jobs to split the population into
    #[arg(long, env = "N_JOBS", default_value_t = DEFAULT_N_JOBS)]
    jobs: u64,

    /// Budget for collecting every result (seconds)
    #[arg(long, env = "RESULT_TIMEOUT_SECS", default_value_t = DEFAULT_RESULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

/// Hazard model for the in-process kernel; remote workers use their own
#[derive(Args, Clone)]
struct ModelArgs {
    /// Per-loan hazard rate
    #[arg(long, env = "HAZARD_RATE", default_value_t = DEFAULT_HAZARD_RATE)]
    hazard_rate: f64,

    /// Time horizon in years
    #[arg(long, env = "TIME_HORIZON", default_value_t = DEFAULT_TIME_HORIZON)]
    time_horizon: f64,
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            total_population: self.loans,
            job_count: self.jobs,
            result_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ModelArgs {
    fn model(&self) -> Result<ModelParams> {
        Ok(ModelParams::new(self.hazard_rate, self.time_horizon)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue jobs on the broker and wait for the workers' results
    Produce {
        #[command(flatten)]
        run: RunArgs,

        /// Write the run summary as JSON to this path
        #[arg(short, long)]
        output: Option<String>,

        /// Print the job plan without touching the broker
        #[arg(long)]
        dry_run: bool,
    },

    /// Run producer and consumers in this process (no broker needed)
    Local {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// In-process consumers
        #[arg(short, long, default_value_t = DEFAULT_LOCAL_WORKERS)]
        workers: usize,
    },

    /// Show queue depths on the broker
    Status,
}

#[derive(Tabled)]
struct SummaryRow {
    metric: &'static str,
    value: String,
}

#[derive(Tabled)]
struct JobRow {
    id: u64,
    load: u64,
}

#[derive(Tabled)]
struct QueueRow {
    queue: &'static str,
    depth: u64,
}

impl Cli {
    fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.redis_host.clone(),
            port: self.redis_port,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    async fn connect(&self) -> Result<Arc<dyn Broker>> {
        let config = self.broker_config();
        let manager = ConnectionManager::new(
            Arc::new(RedisConnector::from_config(&config)),
            config.retry_policy()?,
        );
        Ok(manager.connect().await?)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "hazardq=info" } else { "hazardq=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn row(metric: &'static str, value: impl ToString) -> SummaryRow {
    SummaryRow {
        metric,
        value: value.to_string(),
    }
}

fn summary_rows(summary: &RunSummary) -> Vec<SummaryRow> {
    let rate = summary.default_rate();
    vec![
        row("Method", &summary.method),
        row("Total loans", summary.total_population),
        row("Simulated loans", summary.simulated_loans),
        row("Excluded (remainder)", summary.excluded_loans),
        row("Jobs", summary.job_count),
        row("Chunk size", summary.chunk_size),
        row("Defaults", summary.total_defaults),
        row("Default rate", format!("{:.6} ({:.4}%)", rate, rate * 100.0)),
        row("Time taken", format!("{:.4} s", summary.elapsed.as_secs_f64())),
    ]
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "✓ Simulation complete".green().bold());
    println!();
    println!("{}", Table::new(summary_rows(summary)));
}

fn write_summary(summary: &RunSummary, path: &str) -> Result<()> {
    let path = shellexpand::tilde(path).into_owned();
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path))?;
    println!("{} {}", "Summary written to".bold(), path);
    Ok(())
}

fn report_failure(err: &AppError) {
    match err {
        AppError::ResultsTimeout { .. } => {
            println!("{} {}", "✗ Run timed out:".red().bold(), err);
            println!(
                "  {}",
                "Are workers running? Late results stay on the results queue.".yellow()
            );
        }
        AppError::BrokerUnavailable { .. } => {
            println!("{} {}", "✗ Broker unavailable:".red().bold(), err);
        }
        _ => println!("{} {}", "✗ Run failed:".red().bold(), err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Produce {
            run,
            output,
            dry_run,
        } => {
            let run_config = run.run_config();

            if *dry_run {
                let plan = RunPlan::new(run_config.total_population, run_config.job_count)?;
                let jobs: Vec<JobRow> = planned_jobs(&run_config)?
                    .into_iter()
                    .map(|job| JobRow {
                        id: job.id,
                        load: job.load,
                    })
                    .collect();
                println!("{}", "Job plan (dry run)".cyan().bold());
                println!("{}", Table::new(jobs));
                println!(
                    "  {} {} loans not simulated",
                    "Remainder:".bold(),
                    plan.excluded_loans()
                );
                return Ok(());
            }

            println!(
                "{} {} jobs of {} loans",
                "Pushing".cyan().bold(),
                run_config.job_count,
                run_config.total_population / run_config.job_count.max(1)
            );

            let outcome = match cli.connect().await {
                Ok(broker) => Producer::new(broker, run_config).run().await,
                Err(e) => match e.downcast::<AppError>() {
                    Ok(app) => Err(app),
                    Err(other) => return Err(other),
                },
            };

            match outcome {
                Ok(summary) => {
                    print_summary(&summary);
                    if let Some(path) = output {
                        write_summary(&summary, path)?;
                    }
                }
                Err(e) => {
                    report_failure(&e);
                    return Err(e.into());
                }
            }
        }

        Commands::Local {
            run,
            model,
            workers,
        } => {
            let kernel = Arc::new(HazardKernel::new(model.model()?)?);
            println!(
                "{} {} loans across {} in-process workers",
                "Simulating".cyan().bold(),
                run.loans,
                workers
            );

            match run_local(run.run_config(), kernel, *workers).await {
                Ok(summary) => print_summary(&summary),
                Err(e) => {
                    report_failure(&e);
                    return Err(e.into());
                }
            }
        }

        Commands::Status => {
            println!("{}", "Broker Status".cyan().bold());
            println!();

            match cli.connect().await {
                Ok(broker) => {
                    let mut rows = Vec::new();
                    for queue in [JOBS_QUEUE, RESULTS_QUEUE] {
                        rows.push(QueueRow {
                            queue,
                            depth: broker.depth(queue).await?,
                        });
                    }
                    println!("  {} {}:{}", "Broker:".bold(), cli.redis_host, cli.redis_port);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("{}", Table::new(rows));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "UNREACHABLE".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["hazardq", "produce"]).unwrap();
        let config = cli.broker_config();
        assert_eq!(config.port, 6379);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(1));

        match cli.command {
            Commands::Produce { run, dry_run, .. } => {
                assert!(!dry_run);
                assert_eq!(run.run_config().result_timeout, Duration::from_secs(300));
            }
            _ => panic!("expected produce"),
        }
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "hazardq",
            "local",
            "--loans",
            "1000",
            "--jobs",
            "7",
            "--workers",
            "3",
            "--hazard-rate",
            "0.2",
            "--redis-host",
            "broker.internal",
        ])
        .unwrap();
        assert_eq!(cli.redis_host, "broker.internal");

        match cli.command {
            Commands::Local {
                run,
                model,
                workers,
            } => {
                assert_eq!(workers, 3);
                assert_eq!(run.run_config().total_population, 1000);
                assert_eq!(run.run_config().job_count, 7);

                let params = model.model().unwrap();
                assert!((params.hazard_rate - 0.2).abs() < f64::EPSILON);
                assert!((params.time_horizon - DEFAULT_TIME_HORIZON).abs() < f64::EPSILON);
            }
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn test_produce_has_no_model_flags() {
        // The hazard model lives on the workers; produce cannot change it
        let result = Cli::try_parse_from(["hazardq", "produce", "--hazard-rate", "0.9"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["hazardq", "produce", "--time-horizon", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_local_rejects_invalid_model() {
        let cli = Cli::try_parse_from(["hazardq", "local", "--hazard-rate=-1"]).unwrap();
        match cli.command {
            Commands::Local { model, .. } => assert!(model.model().is_err()),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn test_summary_rows_report_remainder() {
        let plan = RunPlan::new(103, 10).unwrap();
        let summary =
            RunSummary::new("local", &plan, 5, Duration::from_millis(1), chrono::Utc::now());
        let rows = summary_rows(&summary);
        let excluded = rows
            .iter()
            .find(|r| r.metric == "Excluded (remainder)")
            .unwrap();
        assert_eq!(excluded.value, "3");
    }
}
