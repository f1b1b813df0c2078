//! Command execution

use crate::commands::{ListArgs, RunArgs};
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use crate::scenarios::{portal_suite, with_default_credentials};
use std::path::Path;
use vigil::{HarnessConfig, Launcher, ScenarioRunner, Suite};

/// Build the harness configuration: defaults, then `file`, then the
/// environment, then `base_url` from the command line.
pub fn harness_config(file: Option<&Path>, base_url: Option<&str>) -> CliResult<HarnessConfig> {
    let config = match file {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let mut config = config.with_env()?;
    if let Some(url) = base_url {
        config = config.with_base_url(url);
    }
    let config = with_default_credentials(config);
    config.validate()?;
    Ok(config)
}

/// Apply `run` flags on top of the harness configuration
#[must_use]
pub fn with_run_flags(config: HarnessConfig, args: &RunArgs) -> HarnessConfig {
    let headless = config.headless && !args.headed;
    let no_sandbox = config.no_sandbox || args.no_sandbox;
    config.with_headless(headless).with_no_sandbox(no_sandbox)
}

fn select(filter: Option<&str>) -> CliResult<Suite> {
    let suite = portal_suite();
    let Some(filter) = filter else {
        return Ok(suite);
    };
    let selected = suite.filter(filter);
    if selected.is_empty() {
        return Err(CliError::NoScenarios {
            filter: filter.to_string(),
        });
    }
    Ok(selected)
}

#[cfg(feature = "browser")]
fn browser_launcher(config: &HarnessConfig) -> CliResult<Box<dyn Launcher>> {
    Ok(Box::new(vigil::ChromiumLauncher::from_config(config)))
}

#[cfg(not(feature = "browser"))]
fn browser_launcher(_config: &HarnessConfig) -> CliResult<Box<dyn Launcher>> {
    Err(vigil::VigilError::unavailable(
        "vigil was built without the `browser` feature; rebuild with --features browser or pass --mock",
    )
    .into())
}

fn launcher(config: &HarnessConfig, args: &RunArgs) -> CliResult<Box<dyn Launcher>> {
    if args.mock {
        tracing::info!(origin = %config.base_url, "using the mock portal");
        return Ok(Box::new(vigil::mock::MockLauncher::new(
            crate::mock_portal::demo_site_at(&config.base_url),
        )));
    }
    browser_launcher(config)
}

/// `vigil run`
pub fn run_scenarios(config: HarnessConfig, args: &RunArgs, reporter: &Reporter) -> CliResult<()> {
    let suite = select(args.filter.as_deref())?;
    let launcher = launcher(&config, args)?;

    reporter.header(&format!(
        "Running {} scenarios against {}",
        suite.len(),
        config.base_url
    ))?;
    let report = ScenarioRunner::new(launcher.as_ref(), config)
        .with_fail_fast(args.fail_fast)
        .run_suite(&suite);

    for scenario in &report.reports {
        reporter.scenario(scenario)?;
    }
    reporter.summary(&report)?;

    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?)?;
        reporter.info(&format!("Report written to {}", path.display()))?;
    }

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::ScenariosFailed {
            failed: report.failed_count() + report.skipped,
            total: suite.len(),
        })
    }
}

/// Scenario listing, one `name [tags]` line each
pub fn list_lines(args: &ListArgs) -> CliResult<Vec<String>> {
    Ok(select(args.filter.as_deref())?
        .scenarios
        .iter()
        .map(|s| format!("{} [{}]", s.name(), s.tags().join(", ")))
        .collect())
}

/// `vigil list`
pub fn list_scenarios(args: &ListArgs) -> CliResult<()> {
    for line in list_lines(args)? {
        println!("{line}");
    }
    Ok(())
}

/// Effective configuration as YAML, passwords masked
pub fn render_config(config: &HarnessConfig) -> CliResult<String> {
    let mut shown = config.clone();
    for credentials in shown.credentials.values_mut() {
        credentials.password = "********".to_string();
    }
    Ok(shown.to_yaml()?)
}

/// `vigil config`
pub fn show_config(config: &HarnessConfig) -> CliResult<()> {
    print!("{}", render_config(config)?);
    Ok(())
}
