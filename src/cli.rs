//! CLI argument parsing for rastro

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for level listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "rastro")]
#[command(version)]
#[command(about = "Inspect execution-provenance graphs", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print call counts and dependency reference counts of a saved graph
    Summary {
        /// Graph artifact (.json or MessagePack)
        graph: PathBuf,
    },

    /// Print the level of every node
    Levels {
        /// Graph artifact (.json or MessagePack)
        graph: PathBuf,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Render a saved graph as DOT (or a JSON render description for .json)
    Render {
        /// Graph artifact (.json or MessagePack)
        graph: PathBuf,

        /// Output path; left untouched if it already exists
        #[arg(short = 'o', long = "out", value_name = "PATH")]
        out: PathBuf,
    },

    /// Parse a trace configuration and list its targets
    CheckConfig {
        /// Configuration file (.toml or .json)
        config: PathBuf,

        /// Name of the target list inside the document
        #[arg(long = "list", default_value = crate::config::DEFAULT_TRACE_LIST)]
        list: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_summary() {
        let cli = Cli::parse_from(["rastro", "summary", "graph.json"]);
        assert!(!cli.debug);
        assert!(matches!(cli.command, Command::Summary { graph } if graph == PathBuf::from("graph.json")));
    }

    #[test]
    fn test_cli_levels_json() {
        let cli = Cli::parse_from(["rastro", "levels", "g.msgpack", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Command::Levels {
                format: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_render_with_debug() {
        let cli = Cli::parse_from(["rastro", "--debug", "render", "g.json", "--out", "g.dot"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Render { out, .. } if out == PathBuf::from("g.dot")));
    }

    #[test]
    fn test_cli_check_config_default_list() {
        let cli = Cli::parse_from(["rastro", "check-config", "trace.toml"]);
        assert!(matches!(
            cli.command,
            Command::CheckConfig { list, .. } if list == "functions_to_trace"
        ));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["rastro"]).is_err());
    }
}
