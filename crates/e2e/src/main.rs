//! Goodbudget E2E runner - Main Entry Point
//!
//! Run with: cargo run --package goodbudget-e2e -- run --project chromium

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use goodbudget_e2e::playwright::PlaywrightHandle;
use goodbudget_e2e::runner::plan;
use goodbudget_e2e::{report, suites, RunConfig, Selection, Suite, TestRunner};
use goodbudget_fixtures::{FixtureGenerator, SelectorTable, SystemClock};

/// E2E test runner for Goodbudget
#[derive(Parser, Debug)]
#[command(name = "goodbudget-e2e")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./goodbudget-e2e.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios (the default)
    Run(RunArgs),

    /// List the scenarios a run would execute
    List(FilterArgs),

    /// Print freshly generated fixture records as YAML
    Fixtures {
        #[arg(value_enum, default_value = "all")]
        kind: FixtureKind,
    },

    /// Print the effective selector table as YAML
    Selectors,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Directory of extra YAML suites
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Only run scenarios whose "suite › scenario" title matches this regex
    #[arg(short, long)]
    grep: Option<String>,

    /// Only run scenarios with this tag (repeatable)
    #[arg(short, long)]
    tag: Vec<String>,

    /// Skip the built-in suites
    #[arg(long)]
    no_builtin: bool,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Site under test
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// CI mode: retries, one worker, no focused scenarios, no local server
    #[arg(long)]
    ci: bool,

    /// Browser project to run (repeatable, default all)
    #[arg(short, long)]
    project: Vec<String>,

    /// Parallel (project, suite) jobs
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    retries: Option<u32>,

    /// Artifact output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not start the local web server
    #[arg(long)]
    no_web_server: bool,

    /// Do not check the site is reachable before running
    #[arg(long)]
    skip_probe: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FixtureKind {
    User,
    Transaction,
    Split,
    All,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => rt.block_on(run_scenarios(config_path, args)),
        Commands::List(filter) => {
            let config = RunConfig::load(config_path)?;
            list_scenarios(&config, &filter)?;
            Ok(0)
        }
        Commands::Fixtures { kind } => {
            print_fixtures(kind)?;
            Ok(0)
        }
        Commands::Selectors => {
            let config = RunConfig::load(config_path)?;
            let table: SelectorTable = config.selector_table()?;
            print!("{}", serde_yaml::to_string(&table.to_map())?);
            Ok(0)
        }
    }
}

async fn run_scenarios(config_path: Option<&Path>, args: RunArgs) -> Result<i32> {
    let mut config = if args.ci {
        RunConfig::load_with(config_path, |key| match key {
            "CI" => Some("true".to_string()),
            other => std::env::var(other).ok(),
        })?
    } else {
        RunConfig::load(config_path)?
    };

    // CLI flags override file and environment
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    config.restrict_projects(&args.project)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if args.no_web_server {
        config.web_server = None;
    }
    if args.skip_probe {
        config.probe_site = false;
    }
    if args.headed {
        config.headless = false;
    }
    config.validate()?;

    info!(
        "Goodbudget E2E against {} (ci: {}, retries: {}, workers: {})",
        config.base_url, config.ci, config.retries, config.workers
    );

    let fixtures = fixture_generator();
    let suites = load_suites(&config, &args.filter, &fixtures)?;
    let selection = selection(&args.filter)?;

    let reports = config.reports.clone();
    let mut runner = TestRunner::<PlaywrightHandle>::new(config)?.with_fixtures(fixtures);
    runner.prepare().await?;

    let results = runner.run(&suites, &selection).await?;
    runner.stop_server()?;

    report::write_reports(&reports, &results)?;
    Ok(results.exit_code())
}

/// Fixture generator shared by suite construction and the runner
///
/// Counter tokens: a whole suite is generated within a few microseconds,
/// which timestamp tokens cannot tell apart.
fn fixture_generator() -> FixtureGenerator {
    FixtureGenerator::with_counter_tokens(SystemClock)
}

fn load_suites(
    config: &RunConfig,
    filter: &FilterArgs,
    fixtures: &FixtureGenerator,
) -> Result<Vec<Suite>> {
    let mut all = if filter.no_builtin {
        Vec::new()
    } else {
        suites::all(fixtures)?
    };

    if let Some(dir) = filter.scenarios.as_ref().or(config.scenarios_dir.as_ref()) {
        let extra = Suite::load_all(dir)
            .with_context(|| format!("loading scenarios from {}", dir.display()))?;
        info!("Loaded {} suite(s) from {}", extra.len(), dir.display());
        all.extend(extra);
    }
    Ok(all)
}

fn selection(filter: &FilterArgs) -> Result<Selection> {
    let selection = match &filter.grep {
        Some(pattern) => Selection::grep(pattern)?,
        None => Selection::default(),
    };
    Ok(selection.with_tags(&filter.tag))
}

fn list_scenarios(config: &RunConfig, filter: &FilterArgs) -> Result<()> {
    let suites = load_suites(config, filter, &fixture_generator())?;
    let planned = plan(&suites, &selection(filter)?, false)?;

    let mut count = 0;
    for planned in &planned {
        println!("{}", planned.suite.name);
        for scenario in &planned.suite.scenarios {
            count += 1;
            let mut line = format!("  {}", scenario.name);
            if !scenario.tags.is_empty() {
                line.push_str(&format!(" [{}]", scenario.tags.join(", ")));
            }
            if let Some(issue) = &scenario.known_defect {
                line.push_str(&format!(" (probes {})", issue));
            }
            if scenario.skip {
                line.push_str(" (skipped)");
            }
            println!("{}", line);
        }
    }

    let projects: Vec<&str> = config.projects.iter().map(|p| p.name.as_str()).collect();
    println!();
    println!(
        "{} scenario(s) x {} project(s): {}",
        count,
        projects.len(),
        projects.join(", ")
    );
    Ok(())
}

fn print_fixtures(kind: FixtureKind) -> Result<()> {
    let fixtures = fixture_generator();
    let yaml = match kind {
        FixtureKind::User => serde_yaml::to_string(&fixtures.generate_user())?,
        FixtureKind::Transaction => serde_yaml::to_string(&fixtures.generate_transaction())?,
        FixtureKind::Split => serde_yaml::to_string(&fixtures.generate_split_transaction())?,
        FixtureKind::All => {
            let mut doc = serde_yaml::Mapping::new();
            doc.insert("user".into(), serde_yaml::to_value(fixtures.generate_user())?);
            doc.insert("transaction".into(), serde_yaml::to_value(fixtures.generate_transaction())?);
            doc.insert(
                "splitTransaction".into(),
                serde_yaml::to_value(fixtures.generate_split_transaction())?,
            );
            serde_yaml::to_string(&doc)?
        }
    };
    print!("{}", yaml);
    Ok(())
}
