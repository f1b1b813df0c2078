//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vigil: browser acceptance scenarios for the Akshaya Services portal
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures and summary only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Harness configuration file (YAML)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Application origin, overriding config and environment
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run acceptance scenarios
    Run(RunArgs),

    /// List scenarios
    List(ListArgs),

    /// Show the effective configuration
    Config,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Only scenarios whose name or tag contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Stop at the first failing scenario
    #[arg(long)]
    pub fail_fast: bool,

    /// Write a JSON report to this file
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Run against the built-in mock portal instead of a browser
    #[arg(long)]
    pub mock: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Launch Chromium without its sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only scenarios whose name or tag contains this text
    #[arg(short, long)]
    pub filter: Option<String>,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "vigil",
            "-vv",
            "--base-url",
            "http://portal.test",
            "run",
            "--filter",
            "login",
            "--fail-fast",
            "--report",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.base_url.as_deref(), Some("http://portal.test"));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.filter.as_deref(), Some("login"));
                assert!(args.fail_fast);
                assert_eq!(args.report, Some(PathBuf::from("out.json")));
                assert!(!args.mock);
                assert!(!args.no_sandbox);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_no_sandbox() {
        let cli = Cli::try_parse_from(["vigil", "run", "--no-sandbox", "--headed"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.no_sandbox);
                assert!(args.headed);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vigil", "list", "-q", "--config", "vigil.yaml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("vigil.yaml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["vigil"]).is_err());
    }
}
