//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SignalCoord - four-phase right-of-way coordinator
#[derive(Parser)]
#[command(
    name = "sc",
    about = "Coordinates two networked signal units through a four-phase right-of-way cycle",
    version
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
    /// Run the coordinator and accept signal units
    Serve {
        /// Address to listen on (overrides coordinator.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a signal unit that answers the coordinator's commands
    Unit {
        /// Identifier announced to the coordinator
        id: String,

        /// Coordinator address (overrides unit.server)
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Launch a coordinator and the configured units for a fixed duration
    Demo {
        /// Seconds to run before stopping everything (overrides demo.duration-secs)
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_globals() {
        let cli = Cli::try_parse_from(["sc", "-l", "debug", "serve", "--bind", "0.0.0.0:7000"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:7000"));
    }

    #[test]
    fn test_parse_unit() {
        let cli = Cli::try_parse_from(["sc", "unit", "north", "-c", "sc.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sc.yml")));
        let Command::Unit { id, server } = cli.command else {
            panic!("expected unit command");
        };
        assert_eq!(id, "north");
        assert!(server.is_none());
    }

    #[test]
    fn test_parse_demo() {
        let cli = Cli::try_parse_from(["sc", "demo", "--duration-secs", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Demo { duration_secs: Some(5) }));
    }

    #[test]
    fn test_unit_requires_id() {
        assert!(Cli::try_parse_from(["sc", "unit"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["sc"]).is_err());
    }
}
