//! todo-e2e - entry point
//!
//! Runs the browser suites (optionally collecting coverage), merges coverage
//! artifacts, or drives the REST load scenario.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use todo_e2e::playwright::{Browser, PlaywrightHandle};
use todo_e2e::{run_load, CoverageCollector, CoverageFilter, HarnessConfig, TestRunner};

#[derive(Parser)]
#[command(name = "todo-e2e")]
#[command(author, version, about = "E2E, coverage and load harness for the todo app", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TODO_E2E_CONFIG", default_value = "todo-e2e.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run browser test suites
    Run(RunArgs),

    /// Merge existing coverage artifacts into one report
    Merge {
        /// Coverage directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run the REST API load scenario
    Load(LoadArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to suite specs directory
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only suites/tests matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run a single test (`<suite>/<test>` or test name)
    #[arg(short, long)]
    name: Option<String>,

    /// Application base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Collect JS coverage (also enabled by COVERAGE=true)
    #[arg(long)]
    coverage: bool,

    /// Keep only coverage for this deployed host instead of localhost
    #[arg(long)]
    hosted: Option<String>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct LoadArgs {
    /// API base URL
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Concurrent virtual users
    #[arg(short, long)]
    users: Option<usize>,

    /// Scenario iterations per user
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Write the JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.e2e.coverage.apply_env();

    match cli.command {
        Commands::Run(args) => {
            let success = run(config, args).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Merge { dir } => {
            let mut coverage = config.e2e.coverage;
            coverage.enabled = true;
            let dir = dir.unwrap_or(coverage.dir.clone());

            let collector = CoverageCollector::new(coverage.options(), coverage.filter, dir);
            if collector.generate_report()?.is_none() {
                warn!("Nothing to merge in {}", collector.coverage_dir().display());
            }
        }
        Commands::Load(args) => {
            let mut load = config.load;
            if let Some(host) = args.host {
                load.host = host;
            }
            if let Some(users) = args.users {
                load.users = users;
            }
            if let Some(iterations) = args.iterations {
                load.iterations = iterations;
            }

            let report = run_load(&load).await?;
            if let Some(path) = args.output {
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                info!("Load report written to: {}", path.display());
            }
            if report.total_failures() > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run(config: HarnessConfig, args: RunArgs) -> anyhow::Result<bool> {
    let mut e2e = config.e2e;

    if let Some(specs) = args.specs {
        e2e.specs_dir = specs;
    }
    if let Some(output) = args.output {
        e2e.output_dir = output;
    }
    if let Some(base_url) = args.base_url {
        e2e.app.base_url = base_url.clone();
        e2e.playwright.base_url = base_url;
    }
    if let Some(browser) = args.browser {
        e2e.playwright.browser = browser;
    }
    if args.headed {
        e2e.playwright.headless = false;
    }
    if args.coverage {
        e2e.coverage.enabled = true;
    }
    if let Some(host) = args.hosted {
        e2e.coverage.filter = CoverageFilter::hosted(host);
    }

    PlaywrightHandle::check_installed()?;

    let mut runner = TestRunner::with_config(e2e);
    let result = match (&args.name, &args.tag) {
        (Some(name), _) => runner.run_test(name).await?,
        (None, Some(tag)) => runner.run_tagged(tag).await?,
        (None, None) => runner.run_all().await?,
    };

    runner.write_results(&result)?;
    if let Some(merged) = &result.merged_coverage {
        info!("Coverage report: {}", merged.display());
    }
    runner.stop_app()?;

    Ok(result.success())
}
