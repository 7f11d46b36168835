use clap::{Args, Parser, Subcommand};
use scout_browser::{EokaSessions, SessionFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tariff_scout::aggregate::{self, SupplierSource};
use tariff_scout::batch::{self, BatchRunner, RunOverrides, SupplierMode};
use tariff_scout::{Config, Params, Supplier};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tariff-scout")]
#[command(about = "Config-driven energy tariff scraper")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every region of the given suppliers, then combine
    Run(RunArgs),
    /// Combine existing result files without scraping
    Combine(CombineArgs),
    /// Validate profiles without running
    Check(CheckArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Supplier profiles
    #[arg(required = true)]
    profiles: Vec<PathBuf>,

    /// Run in headless mode (overrides profile)
    #[arg(long)]
    headless: bool,

    /// Scrape a single postcode
    #[arg(long, value_name = "POSTCODE")]
    test: Option<String>,

    /// Seconds between regions (overrides profile)
    #[arg(long, value_name = "SECS")]
    wait: Option<u64>,

    /// Attempts per region (overrides profile)
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Run suppliers one at a time
    #[arg(long)]
    sequential: bool,

    /// Seconds between suppliers in sequential mode
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    supplier_wait: u64,

    /// Output directory
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Args)]
struct CombineArgs {
    /// Supplier profiles
    #[arg(required = true)]
    profiles: Vec<PathBuf>,

    /// Output directory (also where result files are read from)
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Rerun failed regions of suppliers that mostly worked
    #[arg(long)]
    retry_failed: bool,

    /// Minimum success rate for a supplier to be retried
    #[arg(long, value_name = "RATE", default_value_t = 0.5)]
    retry_threshold: f64,

    /// Seconds between retried regions
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    cooldown: u64,

    /// Run retries headless
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Args)]
struct CheckArgs {
    /// Supplier profiles
    #[arg(required = true)]
    profiles: Vec<PathBuf>,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[tokio::main]
async fn main() -> tariff_scout::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let succeeded = match cli.command {
        Command::Run(args) => run(args).await?,
        Command::Combine(args) => combine(args).await?,
        Command::Check(args) => check(args)?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn load_profiles(paths: &[PathBuf], params: &[String]) -> tariff_scout::Result<Vec<Config>> {
    let params = Params::from_args(params)?.with_env();
    paths
        .iter()
        .map(|p| Config::load_with_params(p, &params))
        .collect()
}

fn runner_for(config: Config, out: &Path) -> tariff_scout::Result<BatchRunner> {
    let sessions: Arc<dyn SessionFactory> =
        Arc::new(EokaSessions::new(config.browser.launch_options()));
    let supplier = Arc::new(Supplier::new(config)?);
    Ok(BatchRunner::new(supplier, sessions, out))
}

async fn run(args: RunArgs) -> tariff_scout::Result<bool> {
    let overrides = RunOverrides {
        test_postcode: args.test.clone(),
        wait_secs: args.wait,
        retries: args.retries,
        headless: args.headless.then_some(true),
    };

    let mut configs = load_profiles(&args.profiles, &args.params)?;
    let mut runners = Vec::with_capacity(configs.len());
    for config in &mut configs {
        overrides.apply(config)?;
        runners.push(runner_for(config.clone(), &args.out)?);
    }

    let mode = if args.sequential {
        println!("Mode: sequential ({}s between suppliers)", args.supplier_wait);
        SupplierMode::Sequential {
            wait: Duration::from_secs(args.supplier_wait),
        }
    } else {
        println!("Mode: parallel");
        SupplierMode::Parallel {
            stagger: Duration::from_secs(5),
        }
    };

    let mut any_success = false;
    for (name, outcome) in batch::run_suppliers(runners, mode).await {
        match outcome {
            Ok(run) => {
                let mark = if run.successes() > 0 { "✓" } else { "✗" };
                println!(
                    "  {} {}: {}/{} regions",
                    mark,
                    name,
                    run.successes(),
                    run.results.len()
                );
                any_success |= run.successes() > 0;
            }
            Err(e) => println!("  ✗ {}: {}", name, e),
        }
    }

    let sources: Vec<SupplierSource> = configs.iter().map(SupplierSource::from).collect();
    let rows = aggregate::combine(&args.out, &sources)?;
    if !rows.is_empty() {
        aggregate::write_aggregate(&args.out, &rows, &sources)?;
    }
    Ok(any_success)
}

async fn combine(args: CombineArgs) -> tariff_scout::Result<bool> {
    let configs = load_profiles(&args.profiles, &args.params)?;
    let sources: Vec<SupplierSource> = configs.iter().map(SupplierSource::from).collect();
    let mut rows = aggregate::combine(&args.out, &sources)?;

    if args.retry_failed {
        let plan = aggregate::plan_retries(&rows, args.retry_threshold);
        for (name, regions) in &plan.retry {
            let Some(config) = configs.iter().find(|c| &c.name == name) else {
                warn!("No profile for {}, skipping retries", name);
                continue;
            };
            let mut config = config.clone();
            if args.headless {
                config.browser.headless = true;
            }
            println!("Retrying {} regions for {}", regions.len(), name);
            let runner = runner_for(config, &args.out)?;
            let retried = runner
                .retry_regions(regions, Duration::from_secs(args.cooldown))
                .await?;
            aggregate::merge_retried(&mut rows, &retried);
        }
        if !plan.skip.is_empty() {
            println!("Suppliers that need a manual run:");
            for name in &plan.skip {
                println!("  - {}", name);
            }
        }
    }

    if rows.is_empty() {
        println!("No results");
        return Ok(false);
    }
    let report = aggregate::write_aggregate(&args.out, &rows, &sources)?;
    println!("Complete: {}/{}", report.complete, report.total);
    Ok(rows.iter().any(|r| r.is_success()))
}

fn check(args: CheckArgs) -> tariff_scout::Result<bool> {
    for config in load_profiles(&args.profiles, &args.params)? {
        // compiles the extraction patterns
        let config = Supplier::new(config)?.config;
        println!("Profile valid: {}", config.name);
        println!("  URL: {}", config.url);
        println!("  Output prefix: {}", config.output_prefix);
        println!("  Regions: {}", config.regions.len());
        if !config.start_index.overrides.is_empty() {
            println!(
                "  Start index: {} ({} overrides)",
                config.start_index.default,
                config.start_index.overrides.len()
            );
        }
        if !config.params.is_empty() {
            println!("  Parameters: {}", config.params.len());
            for (name, def) in &config.params {
                let req = if def.required { " (required)" } else { "" };
                let desc = def.description.as_deref().unwrap_or("");
                println!("    - {}{}: {}", name, req, desc);
            }
        }
        println!("  Retry attempts: {}", config.retry.max_attempts);
        println!(
            "  Batches: {} regions each, {}s between regions",
            config.batch.batch_size, config.batch.region_wait_secs
        );
    }
    Ok(true)
}
