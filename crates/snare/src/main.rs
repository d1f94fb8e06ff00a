//! Snare CLI
//!
//! Usage:
//!   snare serve --config <file> [--port N]
//!   snare lint <rules-file> [--output text|json] [--strict]

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use snare::config::{Config, LogFormat, LoggingConfig, RuleSet};
use snare::diagnostics::{analyze_rules, DiagnosticsReport};
use snare::proxy::ProxyServer;
use snare::RuleEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "snare")]
#[command(author, version, about = "Rule-based mocking and interception for HTTP proxies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the forward proxy with the rules from a config file
    Serve {
        /// Path to the YAML config file
        #[arg(short, long, env = "SNARE_CONFIG")]
        config: PathBuf,

        /// Override listen.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check a rules file for rules that can never fire
    Lint {
        /// Path to a rules or config file
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Strict mode - treat warnings as errors
        #[arg(short, long)]
        strict: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve { config, port } => serve(config, port).await,
        Command::Lint {
            path,
            output,
            strict,
        } => lint(path, output, strict),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {e}");
    }
}

async fn serve(path: PathBuf, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_file(&path)?;
    if let Some(port) = port {
        config.listen.port = port;
        config.validate()?;
    }
    init_logging(&config.logging);

    let engine = Arc::new(RuleEngine::new(config.build_rules()));
    let report = engine.diagnostics();
    info!(
        "Loaded {} rule(s) from {} ({} invalid)",
        engine.len(),
        path.display(),
        report.rules.iter().filter(|r| !r.valid).count()
    );
    for warning in report.warnings.iter().filter(|w| w.warning_type.is_error()) {
        tracing::warn!(rule = warning.rule_index, "{}", warning.message);
    }

    let server = ProxyServer::new(&config);
    engine.attach(&server.hook_points());

    tokio::select! {
        result = server.run() => result.context("Proxy server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    engine.detach();
    Ok(())
}

fn lint(path: PathBuf, output: OutputFormat, strict: bool) -> anyhow::Result<()> {
    init_logging(&LoggingConfig {
        level: "warn".to_string(),
        ..LoggingConfig::default()
    });

    let rule_set = RuleSet::from_file(&path)?;
    let rules = rule_set.build_rules();
    let report = analyze_rules(&rules);

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&path, &report),
    }

    let failed = report.has_errors() || (strict && report.has_warnings());
    std::process::exit(if failed { 1 } else { 0 });
}

fn print_report(path: &std::path::Path, report: &DiagnosticsReport) {
    println!("{BOLD}{CYAN}Snare Rule Linter{RESET}");
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", path.display());
    println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} rule(s)\n", report.rules.len());

    for rule in &report.rules {
        let status = if rule.valid {
            format!("{GREEN}ok{RESET}")
        } else {
            format!("{RED}invalid{RESET}")
        };
        println!("  [{}] {} {DIM}({}){RESET} {}", rule.index, rule.label, rule.method, status);
    }
    println!();

    if report.warnings.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
        return;
    }

    for warning in &report.warnings {
        let tag = if warning.warning_type.is_error() {
            format!("{RED}error{RESET}")
        } else {
            format!("{YELLOW}warning{RESET}")
        };
        let kind = serde_json::to_value(warning.warning_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "  {tag} {DIM}[{kind}]{RESET} rule {}: {}",
            warning.rule_index, warning.message
        );
    }

    let errors = report
        .warnings
        .iter()
        .filter(|w| w.warning_type.is_error())
        .count();
    let warnings = report.warnings.len() - errors;
    println!("\n{BOLD}Summary:{RESET} {RED}{errors} error(s){RESET}, {YELLOW}{warnings} warning(s){RESET}");
}
