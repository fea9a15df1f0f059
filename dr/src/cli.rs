//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// DeepResearch - iterative web research agent
#[derive(Parser)]
#[command(
    name = "dr",
    about = "Iterative research agent: generate queries, search, reflect, answer",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve POST /deepresearch over HTTP
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Research a single question and print the answer
    Ask {
        /// The question to research
        question: String,

        /// Revision bound (overrides research.max-revisions)
        #[arg(short, long)]
        max_revisions: Option<u32>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the loaded research context
    Context,
}

/// Path of the log file written by `dr`
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deepresearch")
        .join("logs")
        .join("deepresearch.log")
}

/// Help footer listing credential status and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let defaults = Config::default();
    let vars = [
        defaults.llm.api_key_env.as_str(),
        defaults.search.engine_id_env.as_str(),
    ];

    let mut help = String::from("Environment:\n");
    for var in vars {
        let icon = if std::env::var(var).is_ok() {
            debug!(%var, "generate_after_help: variable set");
            "\u{2705}"
        } else {
            debug!(%var, "generate_after_help: variable missing");
            "\u{274C}"
        };
        help.push_str(&format!("  {} {}\n", icon, var));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["dr", "-l", "debug", "ask", "What changed?", "--max-revisions", "0", "--json"])
            .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Ask {
                question,
                max_revisions,
                json,
            } => {
                assert_eq!(question, "What changed?");
                assert_eq!(max_revisions, Some(0));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_with_global_config() {
        let cli = Cli::try_parse_from(["dr", "serve", "--bind", "0.0.0.0:9000", "--config", "x.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        assert!(matches!(cli.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:9000"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["dr"]).is_err());
    }

    #[test]
    fn test_after_help_mentions_log_path() {
        assert!(generate_after_help().contains("deepresearch.log"));
    }
}
