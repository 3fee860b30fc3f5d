use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lagwatch_core::{AssetKey, Config, Diagnostic, DiagnosticCode, Report, Severity};
use lagwatch_engine::FreshnessEvaluator;
use lagwatch_graph::{
    format_suggestions, unresolved_dependencies, AssetGraph, AssetSnapshot, GraphError,
    SimilarAssetIndex,
};
use lagwatch_partitions::PartitionsDefinition;

/// lagwatch - Freshness checks for asset graphs
#[derive(Parser)]
#[command(name = "lagwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: lagwatch.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every freshness policy in a snapshot
    Check {
        /// Path to the asset snapshot
        #[arg(short, long, default_value = "snapshot.json")]
        snapshot: PathBuf,

        /// Evaluation time (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`, UTC)
        #[arg(long)]
        at: Option<String>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// List the constraints an asset must satisfy in an upcoming window
    Constraints {
        /// Asset key (`a/b/c`)
        asset: String,

        /// Path to the asset snapshot
        #[arg(short, long, default_value = "snapshot.json")]
        snapshot: PathBuf,

        /// Window start (defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Window length in minutes (defaults to the configured lookahead)
        #[arg(short, long)]
        window_minutes: Option<f64>,
    },

    /// Suggest existing assets for a mistyped key
    Suggest {
        /// Asset key (`a/b/c`)
        query: String,

        /// Path to the asset snapshot
        #[arg(short, long, default_value = "snapshot.json")]
        snapshot: PathBuf,
    },

    /// Decode a serialized partitions subset
    Subset {
        /// Partitions definition as JSON, e.g. '{"type": "static", "keys": ["a", "b"]}'
        definition: String,

        /// Serialized subset
        serialized: String,

        /// Time at which to list missing partitions (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("lagwatch.toml").exists() {
        Config::from_file(Path::new("lagwatch.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Check { snapshot, at, output, markdown } => {
            check_command(&config, &snapshot, at.as_deref(), &output, markdown.as_deref(), cli.verbose)
        }
        Commands::Constraints { asset, snapshot, at, window_minutes } => {
            constraints_command(&config, &asset, &snapshot, at.as_deref(), window_minutes)
        }
        Commands::Suggest { query, snapshot } => suggest_command(&config, &query, &snapshot),
        Commands::Subset { definition, serialized, at } => {
            subset_command(&definition, &serialized, at.as_deref())
        }
    }
}

/// Log to stderr; `--verbose` lowers the default level, `RUST_LOG` wins
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Parse a UTC time given on the command line
fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::default()).and_utc());
    }
    Err(anyhow::anyhow!(
        "Cannot parse time '{}'. Use RFC 3339 (2023-03-01T12:00:00Z) or 'YYYY-MM-DD HH:MM:SS'",
        raw
    ))
}

fn load_snapshot(path: &Path) -> Result<AssetSnapshot> {
    AssetSnapshot::from_file(path).with_context(|| format!("Failed to load snapshot {}", path.display()))
}

/// Check command - evaluate every policy and write a report
fn check_command(
    config: &Config,
    snapshot_path: &Path,
    at: Option<&str>,
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Loading snapshot from:".cyan(), snapshot_path.display());
    }
    let snapshot = load_snapshot(snapshot_path)?;

    let evaluation_time = match at {
        Some(raw) => parse_time(raw)?,
        None => snapshot.evaluated_at.unwrap_or_else(Utc::now),
    };
    if verbose {
        eprintln!("{} {}", "Evaluating at:".cyan(), evaluation_time.to_rfc3339());
    }

    let cutoff = config.suggestions.similarity_cutoff;
    let unresolved = unresolved_dependencies(&snapshot, cutoff);

    let report = if unresolved.is_empty() {
        let graph = AssetGraph::from_snapshot(&snapshot, cutoff)?;
        let evaluation = FreshnessEvaluator::new(&graph, config).evaluate(evaluation_time);

        if verbose {
            eprintln!(
                "Checked {} assets ({} with freshness policies)",
                evaluation.assets_checked,
                evaluation.policies_evaluated()
            );
        }

        let assets_checked = evaluation.assets_checked;
        let policies_evaluated = evaluation.policies_evaluated();
        let mut report = Report::from_diagnostics(evaluation_time, evaluation.diagnostics)
            .with_counts(assets_checked, policies_evaluated);
        report.metadata = Some(serde_json::to_value(&evaluation.assets)?);
        report
    } else {
        // The graph cannot be built; report every dangling dependency at once
        let diagnostics = unresolved
            .iter()
            .map(|err| unresolved_diagnostic(config, err))
            .collect();
        Report::from_diagnostics(evaluation_time, diagnostics).with_counts(snapshot.assets.len(), 0)
    };

    // Save JSON report
    report.save_to_file(output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    // Save markdown report if requested
    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn unresolved_diagnostic(config: &Config, err: &GraphError) -> Diagnostic {
    let code = DiagnosticCode::AssetUnresolvedDependency;
    let diagnostic = Diagnostic::new(
        code,
        config.severity.get_severity(code, Severity::Error),
        err.to_string(),
    );
    match err {
        GraphError::UnresolvedDependency { asset, .. } => diagnostic.with_asset(asset.to_user_string()),
        _ => diagnostic,
    }
}

/// Constraints command - show what an asset must do next
fn constraints_command(
    config: &Config,
    asset: &str,
    snapshot_path: &Path,
    at: Option<&str>,
    window_minutes: Option<f64>,
) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path)?;
    let graph = AssetGraph::from_snapshot(&snapshot, config.suggestions.similarity_cutoff)?;
    let key = AssetKey::from_user_string(asset);

    let window_start = match at {
        Some(raw) => parse_time(raw)?,
        None => snapshot.evaluated_at.unwrap_or_else(Utc::now),
    };
    let minutes = window_minutes.unwrap_or(config.evaluation.lookahead_minutes);
    if !minutes.is_finite() || minutes < 0.0 {
        anyhow::bail!("Window length must be a non-negative number of minutes, got {}", minutes);
    }
    let window_end = window_start
        .checked_add_signed(chrono::Duration::milliseconds((minutes * 60_000.0).round() as i64))
        .ok_or_else(|| anyhow::anyhow!("Window of {} minutes is too long", minutes))?;

    let constraints = FreshnessEvaluator::new(&graph, config).constraints_for(&key, window_start, window_end)?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Freshness Constraints".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("{} {}", "Asset:".bold(), key.to_user_string().green());
    println!(
        "{} {} .. {}",
        "Window:".bold(),
        window_start.to_rfc3339(),
        window_end.to_rfc3339()
    );
    println!();

    if constraints.is_empty() {
        println!("{}", "✓ No constraints in this window".green());
    } else {
        for (i, constraint) in constraints.iter().enumerate() {
            println!(
                "  {}. data from {} of {} by {}",
                i + 1,
                constraint.asset_key.to_user_string().yellow(),
                constraint.required_data_time.to_rfc3339(),
                constraint.required_by_time.to_rfc3339()
            );
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Suggest command - near-miss keys for a query
fn suggest_command(config: &Config, query: &str, snapshot_path: &Path) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path)?;
    let key = AssetKey::from_user_string(query);

    if snapshot.get_asset(&key).is_some() {
        println!("{} {}", "✓ Asset exists:".green(), key.to_user_string());
        return Ok(());
    }

    let index = SimilarAssetIndex::new(snapshot.keys(), config.suggestions.similarity_cutoff);
    let matches = index.similar_to(&key);

    if matches.is_empty() {
        println!("{} {}", "No assets similar to".yellow(), key.to_user_string());
    } else {
        println!("{}", "Did you mean one of the following?".bold());
        println!("\t{}", format_suggestions(&matches));
    }
    Ok(())
}

/// Subset command - decode a persisted partitions subset
fn subset_command(definition: &str, serialized: &str, at: Option<&str>) -> Result<()> {
    let definition: PartitionsDefinition =
        serde_json::from_str(definition).context("Invalid partitions definition")?;
    let subset = definition.deserialize_subset(serialized)?;
    let current_time = match at {
        Some(raw) => parse_time(raw)?,
        None => Utc::now(),
    };

    let keys = subset.get_partition_keys();
    println!("{} {}", "Partitions in subset:".bold(), keys.len());
    for key in &keys {
        println!("  - {}", key.green());
    }

    let missing = subset.get_partition_keys_not_in_subset(&definition, current_time);
    if !missing.is_empty() {
        println!("{} {}", "Missing partitions:".bold(), missing.len());
        for key in &missing {
            println!("  - {}", key.yellow());
        }
    }
    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Freshness Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Evaluated at: {}", report.evaluated_at);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Assets checked:     {}", report.summary.assets_checked);
    println!("  Policies evaluated: {}", report.summary.policies_evaluated);
    println!("  Total diagnostics:  {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    let issues: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity != Severity::Info)
        .collect();

    if issues.is_empty() {
        println!("{}", "✓ All assets are fresh!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in issues {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(exp) = &diag.expected {
                println!("    Expected: {}", exp);
            }
            if let Some(act) = &diag.actual {
                println!("    Actual:   {}", act);
            }

            if !diag.impact.is_empty() {
                println!("    Impact: {} downstream assets", diag.impact.len());
                for asset in &diag.impact {
                    println!("      - {}", asset);
                }
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Generate markdown report
fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Freshness Check Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Evaluated at:** {}\n\n", report.evaluated_at));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Assets checked: {}\n", report.summary.assets_checked));
    md.push_str(&format!("- Policies evaluated: {}\n", report.summary.policies_evaluated));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Info: {}\n", report.summary.info));
    md.push('\n');

    if !report.has_errors() && report.summary.warnings == 0 {
        md.push_str("✅ **All assets are fresh!**\n");
    }

    if !report.diagnostics.is_empty() {
        md.push_str("## Diagnostics\n\n");

        for diag in &report.diagnostics {
            let severity_emoji = match diag.severity {
                Severity::Error => "❌",
                Severity::Warn => "⚠️",
                Severity::Info => "ℹ️",
            };

            md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
            md.push_str(&format!("{}\n\n", diag.message));

            if let Some(asset) = &diag.asset {
                md.push_str(&format!("**Asset:** `{}`\n\n", asset));
            }
            if let Some(exp) = &diag.expected {
                md.push_str(&format!("**Expected:** `{}`\n\n", exp));
            }
            if let Some(act) = &diag.actual {
                md.push_str(&format!("**Actual:** `{}`\n\n", act));
            }

            if !diag.impact.is_empty() {
                md.push_str(&format!("**Impact:** {} downstream assets\n\n", diag.impact.len()));
                for asset in &diag.impact {
                    md.push_str(&format!("- {}\n", asset));
                }
                md.push('\n');
            }
        }
    }

    md
}
