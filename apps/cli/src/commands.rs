//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docweave_core::pipeline::{self, ProgressReporter, RunConfig};
use docweave_core::report::{DocumentReport, DocumentStatus, RunReport};
use docweave_shared::{
    AppConfig, DocumentTarget, InjectOptions, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docweave: harvest metadata from DITA maps and weave it into the documents they reference.
#[derive(Parser)]
#[command(
    name = "docweave",
    version,
    about = "Harvest metadata fragments from DITA maps and inject them into referenced topics and maps.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.docweave/docweave.toml).
    #[arg(long, global = true, env = "DOCWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Harvest fragments from source maps and print the fragment table.
    Harvest {
        /// Source maps to scan.
        #[arg(required = true)]
        maps: Vec<PathBuf>,

        /// Capture pattern, `trigger/terminal` (overrides config).
        #[arg(short, long)]
        pattern: Option<String>,

        /// Print the table as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Harvest fragments and inject them into every referenced document.
    Run {
        /// Source maps to scan.
        #[arg(required = true)]
        maps: Vec<PathBuf>,

        /// Capture pattern, `trigger/terminal` (overrides config).
        #[arg(short, long)]
        pattern: Option<String>,

        /// Maximum documents rewritten at once (overrides config).
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Stop scheduling after the first failed document.
        #[arg(long)]
        fail_fast: bool,

        /// Write a JSON run report to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inject one fragment file into a single target.
    Inject {
        /// Target document, optionally scoped: `path[#id[/child]]`.
        target: String,

        /// File holding the markup to inject.
        #[arg(short, long)]
        fragment: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docweave=info",
        1 => "docweave=debug",
        _ => "docweave=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Harvest {
            maps,
            pattern,
            json,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_harvest(&maps, pattern, json, &config)
        }
        Command::Run {
            maps,
            pattern,
            concurrency,
            fail_fast,
            report,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            let mut run_config = RunConfig::from(&config);
            if let Some(pattern) = pattern {
                run_config.pattern = pattern;
            }
            if let Some(concurrency) = concurrency {
                run_config.inject.concurrency = concurrency.max(1);
            }
            run_config.inject.fail_fast |= fail_fast;
            cmd_run(&maps, &run_config, report.as_deref()).await
        }
        Command::Inject { target, fragment } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_inject(&target, &fragment, &config)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_harvest(
    maps: &[PathBuf],
    pattern: Option<String>,
    json: bool,
    config: &AppConfig,
) -> Result<()> {
    let pattern = pattern.unwrap_or_else(|| config.harvest.pattern.clone());
    info!(sources = maps.len(), %pattern, "harvesting fragments");

    let reporter = CliProgress::new();
    let harvest = pipeline::harvest(maps, &pattern, &reporter)?;
    reporter.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&harvest.table)?);
    } else {
        for (key, markup) in harvest.table.iter() {
            println!("{key}  ({} bytes)", markup.len());
        }
        println!();
        println!("  Sources:   {}", harvest.sources);
        println!("  Fragments: {}", harvest.table.len());
        println!("  Failed:    {}", harvest.failures.len());
    }

    if !harvest.failures.is_empty() {
        return Err(eyre!("{} source(s) could not be harvested", harvest.failures.len()));
    }
    Ok(())
}

async fn cmd_run(maps: &[PathBuf], config: &RunConfig, report_path: Option<&Path>) -> Result<()> {
    info!(
        sources = maps.len(),
        pattern = %config.pattern,
        concurrency = config.inject.concurrency,
        "starting run"
    );

    let reporter = CliProgress::new();
    let report = pipeline::run(maps, config, &reporter).await?;

    if let Some(path) = report_path {
        report.write_json(path)?;
        info!(path = %path.display(), "run report written");
    }

    print_summary(&report);

    if !report.is_clean() {
        return Err(eyre!(
            "run {} finished with {} failed document(s) and {} failed source(s)",
            report.run_id,
            report.failed(),
            report.harvest_failures.len()
        ));
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    for doc in &report.documents {
        match &doc.error {
            Some(error) => println!("  {:<9} {}  {error}", status_label(doc.status), doc.key),
            None => println!("  {:<9} {}", status_label(doc.status), doc.key),
        }
    }
    println!();
    println!("  Run:       {}", report.run_id);
    println!("  Sources:   {}", report.sources);
    println!("  Fragments: {}", report.fragments);
    println!("  Injected:  {}", report.injected());
    println!("  Unchanged: {}", report.count(DocumentStatus::Unchanged));
    println!("  Skipped:   {}", report.count(DocumentStatus::Skipped));
    println!("  Failed:    {}", report.failed());
    if report.aborted {
        println!("  Aborted after first failure");
    }
    let elapsed = report.finished_at - report.started_at;
    println!("  Time:      {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
    println!();
}

fn status_label(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Injected => "injected",
        DocumentStatus::Unchanged => "unchanged",
        DocumentStatus::Skipped => "skipped",
        DocumentStatus::Failed => "FAILED",
    }
}

fn cmd_inject(target: &str, fragment: &Path, config: &AppConfig) -> Result<()> {
    let target = DocumentTarget::parse(target);
    let markup = std::fs::read_to_string(fragment)
        .map_err(|e| eyre!("cannot read fragment '{}': {e}", fragment.display()))?;
    let options = InjectOptions::from(config);

    info!(%target, fragment = %fragment.display(), "injecting fragment");
    let outcome = pipeline::inject_fragment(&target, &markup, &options)?;

    match outcome.anchor {
        Some(anchor) => {
            println!("  Injected into {target}");
            println!("  Kind:   {:?}", outcome.kind);
            println!("  Anchor: {anchor:?}");
            println!("  Bytes:  {}", outcome.bytes_written);
            println!("  SHA256: {}", outcome.sha256);
        }
        None => println!("  No injection point in {target}; file left unchanged"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_harvested(&self, path: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Harvesting [{current}/{total}] {path}"));
    }

    fn document_rewritten(&self, report: &DocumentReport, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Rewriting [{current}/{total}] {}",
            report.key
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.finish();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "docweave", "-vv", "run", "a.ditamap", "b.ditamap", "--concurrency", "8",
            "--fail-fast", "--report", "out.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run {
                maps,
                concurrency,
                fail_fast,
                report,
                pattern,
            } => {
                assert_eq!(maps.len(), 2);
                assert_eq!(concurrency, Some(8));
                assert!(fail_fast);
                assert_eq!(report, Some(PathBuf::from("out.json")));
                assert!(pattern.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn inject_requires_fragment() {
        assert!(Cli::try_parse_from(["docweave", "inject", "a.dita#t1"]).is_err());
        let cli = Cli::try_parse_from([
            "docweave", "--log-format", "json", "inject", "a.dita#t1", "--fragment", "f.xml",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Inject { .. }));
    }

    #[test]
    fn harvest_requires_sources() {
        assert!(Cli::try_parse_from(["docweave", "harvest"]).is_err());
    }
}
