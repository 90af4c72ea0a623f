//! Chartbox CLI
//!
//! A command-line tool for running chart snippets in the chartbox sandbox.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chartbox::{
    Config, Context, EXAMPLE_CONFIG, ExecutionResult, LimitsOverride, Sandbox, SecurityLevel,
    validate,
};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chartbox")]
#[command(about = "Run model-generated chart snippets in a sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
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
    /// Initialize a new configuration file
    Init {
        /// Output path (default: chartbox.toml)
        #[arg(short, long, default_value = "chartbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate and run a snippet
    Run {
        /// Snippet file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Security level (strict, moderate, permissive)
        #[arg(short, long)]
        level: Option<SecurityLevel>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Memory limit in MB
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Lines kept from each output stream
        #[arg(long)]
        max_output_lines: Option<usize>,

        /// Largest accepted artifact in KB
        #[arg(long)]
        max_file_size: Option<u64>,

        /// JSON object whose entries become globals
        #[arg(long, value_name = "JSON")]
        context: Option<String>,

        /// Copy generated files into this directory
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a snippet without running it
    Validate {
        /// Snippet file to check
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Security level (strict, moderate, permissive)
        #[arg(short, long)]
        level: Option<SecurityLevel>,
    },

    /// Show the effective configuration
    ShowConfig,
}

/// Options of the `run` subcommand
struct RunOptions {
    level: Option<SecurityLevel>,
    overrides: LimitsOverride,
    context: Option<String>,
    output_dir: Option<PathBuf>,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            level,
            time_limit,
            memory_limit,
            max_output_lines,
            max_file_size,
            context,
            output_dir,
            json,
        } => {
            let options = RunOptions {
                level,
                overrides: LimitsOverride {
                    max_execution_time: time_limit,
                    max_memory_mb: memory_limit,
                    max_output_lines,
                    max_file_size_kb: max_file_size,
                },
                context,
                output_dir,
                json,
            };
            run_snippet(config, &source, options).await
        }
        Commands::Validate { source, level } => validate_snippet(&config, &source, level).await,
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_snippet(mut config: Config, source: &Path, options: RunOptions) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read snippet file")?;

    let context = match options.context.as_deref() {
        Some(raw) => Some(parse_context(raw)?),
        None => None,
    };

    if let Some(level) = options.level {
        config.security_level = level;
    }
    if !options.overrides.is_empty() {
        config.limits = config.effective_limits(Some(&options.overrides));
    }
    if options.output_dir.is_some() {
        config.export_dir = options.output_dir;
    }

    info!(level = %config.security_level, "running snippet");
    let sandbox = Sandbox::new(config);
    let result = sandbox
        .execute_code_async(code, context)
        .await
        .context("invalid execution limits")?;

    if options.json {
        let rendered =
            serde_json::to_string_pretty(&result).context("failed to serialize result")?;
        println!("{rendered}");
    } else {
        print_result(&result);
    }

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn parse_context(raw: &str) -> Result<Context> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--context is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--context must be a JSON object"),
    }
}

fn print_result(result: &ExecutionResult) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }

    for warning in &result.security_warnings {
        warn!("{warning}");
    }
    for file in &result.generated_files {
        info!(file = %file, "generated");
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        status = %result.status,
        time = format_args!("{:.3}s", result.execution_time),
        memory = format_args!("{} bytes", result.memory_used),
        error = result.error.as_deref().unwrap_or(""),
        "execution result"
    );
}

async fn validate_snippet(config: &Config, source: &Path, level: Option<SecurityLevel>) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read snippet file")?;
    let level = level.unwrap_or(config.security_level);

    let finding = validate(&code, level);
    if finding.accepted {
        println!("Snippet accepted at {level} level");
        return Ok(());
    }

    let kind = if finding.syntax_error {
        "syntax error"
    } else {
        "security violation"
    };
    println!("Snippet rejected ({kind}):");
    for warning in &finding.warnings {
        println!("  - {warning}");
    }
    std::process::exit(1);
}

fn show_config(config: &Config) {
    println!("Security level: {}", config.security_level);
    println!();
    println!("Default limits:");
    println!("  Time limit: {}s", config.limits.max_execution_time);
    println!("  Memory limit: {} MB", config.limits.max_memory_mb);
    println!("  Output lines: {}", config.limits.max_output_lines);
    println!("  File size limit: {} KB", config.limits.max_file_size_kb);
    println!();
    match &config.scratch_root {
        Some(root) => println!("Scratch root: {}", root.display()),
        None => println!("Scratch root: {}", std::env::temp_dir().display()),
    }
    match &config.export_dir {
        Some(dir) => println!("Export directory: {}", dir.display()),
        None => println!("Export directory: (none)"),
    }
    println!("Grace period: {} ms", config.grace_period_ms);
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "chartbox",
            "run",
            "chart.py",
            "--level",
            "moderate",
            "--time-limit",
            "2.5",
            "--context",
            "{\"label\": \"x\"}",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { level, time_limit, context, json, .. } => {
                assert_eq!(level, Some(SecurityLevel::Moderate));
                assert_eq!(time_limit, Some(2.5));
                assert!(context.is_some());
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(Cli::try_parse_from(["chartbox", "validate", "x.py", "--level", "open"]).is_err());
    }

    #[test]
    fn context_must_be_an_object() {
        assert!(parse_context("{\"a\": 1}").is_ok());
        assert!(parse_context("[1, 2]").is_err());
        assert!(parse_context("not json").is_err());
    }
}
