use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tagline::{InitReport, Page, Runtime, RuntimeConfig};
use tagline_core::logging::init_tracing;
use tagline_rules::load_rules;

mod replay;

use replay::{load_page, Replay, ReplayScript};

#[derive(Parser)]
#[command(name = "tagline")]
#[command(about = "Validate and replay Tagline rule sets", long_about = None)]
struct Cli {
    /// Log filter (overrides TAGLINE_LOG; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load rules and initialize them against the built-in delegates
    Validate {
        /// Rules file or directory (JSON or YAML)
        path: PathBuf,
    },
    /// Replay a scripted page session against a rule set
    Replay(ReplayArgs),
    /// Show version information
    Version,
}

#[derive(Args)]
struct ReplayArgs {
    /// Rules file or directory (JSON or YAML)
    #[arg(long)]
    rules: PathBuf,
    /// Page fixture (JSON)
    #[arg(long)]
    page: PathBuf,
    /// Replay script (JSON)
    #[arg(long)]
    script: PathBuf,
    /// Only print the summary
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env().context("reading TAGLINE_* configuration")?;
    init_tracing(Some(cli.log.as_deref().unwrap_or(&config.log_level)))?;

    match cli.command {
        Commands::Validate { path } => validate(path, config),
        Commands::Replay(args) => replay(args, config).await,
        Commands::Version => {
            println!("tagline v{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn validate(path: PathBuf, config: RuntimeConfig) -> Result<ExitCode> {
    let rules = load_rules(&path).with_context(|| format!("loading rules from {}", path.display()))?;
    let runtime = Runtime::builder(Page::default()).config(config).build();
    let report = runtime.load_rules(&rules);
    print_report(&report);
    Ok(exit_code(&report))
}

async fn replay(args: ReplayArgs, config: RuntimeConfig) -> Result<ExitCode> {
    let rules = load_rules(&args.rules)
        .with_context(|| format!("loading rules from {}", args.rules.display()))?;
    let page = load_page(&args.page)?;
    let script = ReplayScript::from_path(&args.script)?;

    let replay = Replay::new(page, config, &rules, args.quiet);
    let report = replay.runtime().load_rules(&rules);
    print_report(&report);

    let calls = replay.run(&script).await?;
    println!(
        "{} {} step(s), {} integration call(s)",
        "✔ Replay finished:".green().bold(),
        script.steps.len(),
        calls.len()
    );
    Ok(exit_code(&report))
}

fn print_report(report: &InitReport) {
    println!(
        "{} {} initialized, {} without events, {} rejected",
        "Rules:".bold(),
        report.initialized.len(),
        report.skipped.len(),
        report.errors.len()
    );
    for failure in &report.errors {
        println!("  {} {}: {}", "✘".red().bold(), failure.rule, failure.error);
    }
}

fn exit_code(report: &InitReport) -> ExitCode {
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
