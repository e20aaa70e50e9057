//! plastigit command-line tool.
//!
//! Replays a Plastic SCM changeset history export into a Git repository,
//! and provides subcommands for previewing the replay and generating /
//! validating configuration files.

mod progress;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plastigit_core::branch::map_branch_name;
use plastigit_core::message::CommitFormatter;
use plastigit_core::{migrate, History, MigrationConfig};

use progress::ConsoleObserver;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Replay a Plastic SCM history into Git.
#[derive(Parser, Debug)]
#[command(
    name = "plastigit",
    version,
    about = "Replay a Plastic SCM changeset history as Git commits"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./plastigit.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay every changeset into the destination repository.
    Run {
        /// Write the full migration report as JSON to this path.
        #[arg(long)]
        report: Option<String>,

        /// Exit non-zero if any changeset failed.
        #[arg(long)]
        strict: bool,
    },

    /// Show what would be replayed, without touching anything.
    Plan,

    /// Validate the configuration file and the history export.
    Validate,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./plastigit.toml")]
        output: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = expand_tilde(&cli.config);
    match cli.command {
        Commands::Init { output } => {
            init_tracing("warn");
            cmd_init(&expand_tilde(&output))
        }
        Commands::Validate => {
            init_tracing("warn");
            cmd_validate(&config_path)
        }
        Commands::Plan => {
            let config = load_config(&config_path)?;
            init_tracing(&config.migration.log_level);
            cmd_plan(&config)
        }
        Commands::Run { report, strict } => {
            let config = load_config(&config_path)?;
            init_tracing(&config.migration.log_level);
            cmd_run(&config, report.as_deref().map(expand_tilde), strict).await
        }
    }
}

/// Log to stderr so progress lines on stdout stay clean. `RUST_LOG` wins
/// over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<MigrationConfig> {
    let mut config = MigrationConfig::load(path).context("failed to load configuration file")?;
    config.migration.work_dir = expand_tilde(&config.migration.work_dir.to_string_lossy());
    config.migration.history_file = expand_tilde(&config.migration.history_file.to_string_lossy());
    Ok(config)
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: &MigrationConfig, report_path: Option<PathBuf>, strict: bool) -> Result<()> {
    let work_dir = &config.migration.work_dir;
    info!(
        work_dir = %work_dir.display(),
        strategy = %config.migration.strategy,
        "starting migration"
    );
    let mut observer = ConsoleObserver::new();
    let report = migrate(config, &mut observer)
        .await
        .context("migration could not start; nothing was migrated")?;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("{}", style::dim(&format!("Report written to {}", path.display())));
    }

    if strict && report.failed > 0 {
        anyhow::bail!("{} of {} changeset(s) failed", report.failed, report.total);
    }
    Ok(())
}

fn cmd_plan(config: &MigrationConfig) -> Result<()> {
    let history_path = config.migration.history_path();
    let history = History::load(&history_path).context("failed to read history export")?;
    let formatter = CommitFormatter::new(&config.commit_format);

    if history.is_empty() {
        println!("No changesets found in {}.", history_path.display());
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!(
            "Replay plan ({} changesets, strategy: {})",
            history.len(),
            config.migration.strategy
        ))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Changeset", "Source branch", "Git branch", "Changes", "Message"]);

    for (i, cs) in history.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(format!("cs:{}", cs.id)),
            Cell::new(&cs.branch),
            Cell::new(map_branch_name(&cs.branch)),
            Cell::new(cs.changes.len()),
            Cell::new(truncate(&formatter.format(cs), 60)),
        ]);
    }

    println!("{}", table);
    println!();
    println!(
        "{} destination branch(es) would be used.",
        history.branch_map().len()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        MigrationConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    let history_path = expand_tilde(&config.migration.history_path().to_string_lossy());
    let history = match History::load(&history_path) {
        Ok(history) => history,
        Err(e) => {
            println!("  {}", style::error(&format!("History export: {}", e)));
            anyhow::bail!("history validation failed");
        }
    };
    println!("  {}", style::success("History export is well-formed"));
    if history.is_empty() {
        println!("  {}", style::warn("History export contains no changesets"));
    }

    println!();
    println!("Configuration summary:");
    println!("  Work directory : {}", config.migration.work_dir.display());
    println!("  History file   : {}", history_path.display());
    println!("  Strategy       : {}", config.migration.strategy);
    println!(
        "  Author         : {} <{}>",
        config.author.name, config.author.email
    );
    println!("  cm binary      : {}", config.plastic.cm_binary);
    println!(
        "  cm timeout     : {}",
        config
            .plastic
            .timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Changesets     : {}", history.len());
    if let (Some(first), Some(last)) = (history.first_id(), history.last_id()) {
        println!("  Range          : cs:{} .. cs:{}", first, last);
    }
    println!("  Branches       :");
    for (dest, source) in history.branch_map() {
        println!("    {} → {}", source, style::branch(&dest));
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, MigrationConfig::default_template())
        .context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Set work_dir to the Plastic workspace that should become the Git repository");
    println!("  2. Set the author identity used for every migrated commit");
    println!("  3. Validate with: plastigit validate --config {}", output.display());
    println!("  4. Preview with:  plastigit plan --config {}", output.display());
    println!("  5. Migrate with:  plastigit run --config {}", output.display());

    Ok(())
}

/// First line of `s`, cut to `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() <= max_len && line.len() == s.trim_end().len() {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
