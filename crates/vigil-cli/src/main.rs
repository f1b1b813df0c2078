//! Vigil CLI: browser acceptance scenarios for the portal
//!
//! ## Usage
//!
//! ```bash
//! vigil list                        # Show scenarios
//! vigil run                         # Run everything in Chromium
//! vigil run --filter login          # Only login scenarios
//! vigil run --mock --report out.json
//! vigil config                      # Effective configuration
//! ```

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vigil_cli::{runner, Cli, CliConfig, CliResult, Commands, Reporter, Verbosity};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into());
    init_tracing(config.verbosity);

    match run(&cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, config: CliConfig) -> CliResult<()> {
    let harness = runner::harness_config(cli.config.as_deref(), cli.base_url.as_deref())?;
    match &cli.command {
        Commands::Run(args) => {
            let harness = runner::with_run_flags(harness, args);
            let reporter =
                Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
            runner::run_scenarios(harness, args, &reporter)
        }
        Commands::List(args) => runner::list_scenarios(args),
        Commands::Config => runner::show_config(&harness),
    }
}
