//! Terminal reporting

use console::{style, Style, Term};
use std::cell::RefCell;
use std::io::{self, Write};
use std::time::Duration;
use vigil::{FailureKind, ScenarioOutcome, ScenarioReport, SuiteReport};

/// Prints scenario results as they finish and a summary at the end
pub struct Reporter {
    out: RefCell<Box<dyn Write>>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("use_color", &self.use_color)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Reporter {
    /// Create a reporter writing to stdout
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self::with_writer(Term::stdout(), use_color, quiet)
    }

    /// Create a reporter writing to `writer`
    #[must_use]
    pub fn with_writer(writer: impl Write + 'static, use_color: bool, quiet: bool) -> Self {
        Self {
            out: RefCell::new(Box::new(writer)),
            use_color,
            quiet,
        }
    }

    fn line(&self, text: &str) -> io::Result<()> {
        writeln!(self.out.borrow_mut(), "{text}")
    }

    /// Print a section header
    ///
    /// # Errors
    ///
    /// Returns the writer's error, e.g. a closed pipe.
    pub fn header(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.line(&styled)
    }

    /// Print an informational line
    pub fn info(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.line(message)
    }

    /// One line for a finished scenario
    #[must_use]
    pub fn format_scenario(&self, report: &ScenarioReport) -> String {
        let prefix = match (report.passed(), self.use_color) {
            (true, true) => style("✓").green().bold().to_string(),
            (true, false) => "PASS".to_string(),
            (false, true) => style("✗").red().bold().to_string(),
            (false, false) => "FAIL".to_string(),
        };
        let timing = format!("({}ms)", report.duration_ms);
        let timing = if self.use_color {
            style(timing).dim().to_string()
        } else {
            timing
        };
        format!("{prefix} {} {timing}", report.name)
    }

    /// Print a finished scenario; failures print even in quiet mode
    pub fn scenario(&self, report: &ScenarioReport) -> io::Result<()> {
        if self.quiet && report.passed() {
            return Ok(());
        }
        self.line(&self.format_scenario(report))
    }

    /// Failure details, one block per failed scenario
    #[must_use]
    pub fn format_failures(&self, report: &SuiteReport) -> Vec<String> {
        report
            .reports
            .iter()
            .filter_map(|r| match &r.outcome {
                ScenarioOutcome::Passed => None,
                ScenarioOutcome::Failed { kind, message } => {
                    let kind = kind_label(*kind);
                    let kind = if self.use_color {
                        style(kind).red().to_string()
                    } else {
                        kind.to_string()
                    };
                    Some(format!("  {} [{kind}]\n    {message}", r.name))
                }
            })
            .collect()
    }

    /// Summary line for the suite
    #[must_use]
    pub fn format_summary(&self, report: &SuiteReport) -> String {
        let passed = report.passed_count();
        let failed = report.failed_count();
        let skipped = report.skipped;
        let total = passed + failed + skipped;
        let secs = Duration::from_millis(report.duration_ms).as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let status = if report.all_passed() {
                passed_style.apply_to("PASSED")
            } else {
                failed_style.apply_to("FAILED")
            };
            format!(
                "{status} {total} scenarios in {secs:.2}s ({} passed, {} failed, {} skipped)",
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                Style::new().yellow().apply_to(skipped),
            )
        } else {
            let status = if report.all_passed() { "PASSED" } else { "FAILED" };
            format!(
                "{status} {total} scenarios in {secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)"
            )
        }
    }

    /// Print failure details and the summary
    pub fn summary(&self, report: &SuiteReport) -> io::Result<()> {
        let failures = self.format_failures(report);
        if !failures.is_empty() {
            self.line("")?;
            self.line("Failures:")?;
            for failure in &failures {
                self.line(failure)?;
            }
        }
        self.line("")?;
        self.line(&self.format_summary(report))
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::ConditionTimedOut => "timed out",
        FailureKind::ConditionFailed => "failed",
        FailureKind::LocatorNotFound => "not found",
        FailureKind::DriverUnavailable => "no browser",
        FailureKind::SessionClosed => "session closed",
        FailureKind::Panicked => "panicked",
        FailureKind::Teardown => "teardown",
        FailureKind::Other => "error",
    }
}
