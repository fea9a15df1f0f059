//! DeepResearch CLI entry point

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use deepresearch::cli::{Cli, Command, generate_after_help};
use deepresearch::config::Config;
use deepresearch::context::ResearchContext;
use deepresearch::research::{Orchestrator, RunReport};
use deepresearch::server::{self, AppState};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deepresearch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("deepresearch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Log level is needed before the full config load
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(llm = %config.llm.provider, model = %config.llm.model, "DeepResearch loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => {
            debug!(?bind, "main: matched Serve command");
            cmd_serve(&config, bind).await
        }
        Command::Ask {
            question,
            max_revisions,
            json,
        } => {
            debug!(?max_revisions, json, "main: matched Ask command");
            cmd_ask(&config, &question, max_revisions, json).await
        }
        Command::Context => {
            debug!("main: matched Context command");
            cmd_context(&config)
        }
    }
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    config.validate()?;
    let context = ResearchContext::shared(&config.context)?;
    Orchestrator::from_config(config, context)
}

/// Serve the HTTP API
async fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    debug!(?bind, "cmd_serve: called");
    let orchestrator = build_orchestrator(config)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    println!("{} http://{}/deepresearch", "Serving".green().bold(), bind);
    server::serve(&bind, AppState::new(orchestrator)).await
}

/// Research one question from the command line
async fn cmd_ask(config: &Config, question: &str, max_revisions: Option<u32>, json: bool) -> Result<()> {
    debug!(?max_revisions, json, "cmd_ask: called");
    let mut orchestrator = build_orchestrator(config)?;
    if let Some(max) = max_revisions {
        orchestrator = orchestrator.with_max_revisions(max);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, &flag).await == Interrupt::Abort {
            warn!("Second interrupt, aborting");
            eprintln!("{}", "Aborted".red());
            std::process::exit(130);
        }
    });

    let report = orchestrator.run_cancellable(question, &cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Signal handling could not be installed or stopped working
    Unavailable,
    /// Interrupted twice
    Abort,
}

/// First interrupt sets `cancel` so the run stops at the next stage boundary;
/// a second one asks for an immediate abort
async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: &AtomicBool) -> Interrupt
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        return Interrupt::Unavailable;
    }
    warn!("Interrupted, stopping at the next stage boundary");
    eprintln!(
        "{}",
        "Interrupted, stopping at the next stage boundary (Ctrl-C again to abort)...".yellow()
    );
    cancel.store(true, Ordering::SeqCst);

    match next_signal().await {
        Ok(()) => Interrupt::Abort,
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            Interrupt::Unavailable
        }
    }
}

fn print_report(report: &RunReport) {
    let answer = &report.final_answer;
    println!("{}", "Answer".green().bold());
    println!("{}\n", answer.answer);

    if !answer.details.is_empty() {
        println!("{}", "Details".cyan().bold());
        println!("{}\n", answer.details);
    }

    if !answer.sources.is_empty() {
        println!("{}", "Sources".cyan().bold());
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  [{}] {}", i + 1, source);
        }
        println!();
    }

    println!(
        "{}",
        format!(
            "{} cycle(s), {} revision(s), {:.1}s",
            report.research_cycles(),
            report.revisions,
            report.elapsed_ms as f64 / 1000.0
        )
        .dimmed()
    );
}

/// Show what the research context would contain
fn cmd_context(config: &Config) -> Result<()> {
    debug!("cmd_context: called");
    let context = ResearchContext::load(&config.context)?;
    println!("{} {}", "Directory:".bold(), config.context.dir.display());
    println!("{} {}", "Pattern:".bold(), config.context.pattern);
    println!("{} {}", "Documents:".bold(), context.document_count());
    println!("{} {}", "Characters:".bold(), context.chars().count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_second_interrupt_aborts() {
        let cancel = AtomicBool::new(false);
        let mut signals = 0;
        let outcome = watch_interrupts(
            || {
                signals += 1;
                async { Ok(()) }
            },
            &cancel,
        )
        .await;

        assert_eq!(outcome, Interrupt::Abort);
        assert_eq!(signals, 2);
        assert!(cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_interrupt_only_cancels() {
        let cancel = AtomicBool::new(false);
        let mut signals = 0;
        let outcome = watch_interrupts(
            || {
                signals += 1;
                let result = if signals == 1 {
                    Ok(())
                } else {
                    Err(io::Error::other("signal stream closed"))
                };
                async move { result }
            },
            &cancel,
        )
        .await;

        assert_eq!(outcome, Interrupt::Unavailable);
        assert!(cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_signal_handler_leaves_run_alone() {
        let cancel = AtomicBool::new(false);
        let outcome = watch_interrupts(|| async { Err(io::Error::other("unsupported")) }, &cancel).await;

        assert_eq!(outcome, Interrupt::Unavailable);
        assert!(!cancel.load(Ordering::SeqCst));
    }
}
