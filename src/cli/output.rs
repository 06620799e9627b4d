//! Handles all user-facing output for the CLI.
//!
//! The report mimics `go test -v`: one `=== RUN` / `--- PASS|FAIL|SKIP` pair
//! per test case followed by a per-suite `ok` / `FAIL` line. Sections of a
//! result are shown when they explain a failure or when requested through
//! [`RenderOptions`].

use std::io;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::errors::indent_lines;
use crate::runner::result::{TestCaseResult, TestStatus};
use crate::runner::SuiteResult;

// ============================================================================
// OPTIONS
// ============================================================================

/// Formatting knobs passed to the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Indentation of the first level of detail under a test case.
    pub indent: usize,
    pub show_render: bool,
    pub show_validate: bool,
    pub show_hooks: bool,
    pub show_assertions: bool,
    pub color: ColorChoice,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            show_render: false,
            show_validate: false,
            show_hooks: false,
            show_assertions: false,
            color: if atty::is(atty::Stream::Stdout) {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            },
        }
    }
}

impl RenderOptions {
    pub fn stdout(&self) -> StandardStream {
        StandardStream::stdout(self.color)
    }
}

// ============================================================================
// PRINTER
// ============================================================================

pub struct ReportPrinter<W: WriteColor> {
    out: W,
    options: RenderOptions,
}

impl<W: WriteColor> ReportPrinter<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Self { out, options }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn print_suite(&mut self, suite: &SuiteResult) -> io::Result<()> {
        for result in &suite.results {
            self.print_test_case(result)?;
        }
        let (label, color) = if suite.passed() {
            ("ok", Color::Green)
        } else {
            ("FAIL", Color::Red)
        };
        self.colored(label, color)?;
        writeln!(
            self.out,
            "\t{}\t{:.3}s",
            suite.file.display(),
            suite.duration.as_secs_f64()
        )
    }

    /// A suite that could not be loaded or run at all.
    pub fn print_suite_error(&mut self, file: &std::path::Path, error: &str) -> io::Result<()> {
        self.colored("FAIL", Color::Red)?;
        writeln!(self.out, "\t{} [setup failed]", file.display())?;
        writeln!(self.out, "{}", indent_lines(error, self.options.indent))
    }

    pub fn print_test_case(&mut self, result: &TestCaseResult) -> io::Result<()> {
        writeln!(self.out, "=== RUN   {}", result.name)?;
        let color = match result.status {
            TestStatus::Pass => Color::Green,
            TestStatus::Fail => Color::Red,
            TestStatus::Skip => Color::Yellow,
        };
        write!(self.out, "--- ")?;
        self.colored(result.status.as_str(), color)?;
        writeln!(
            self.out,
            ": {} ({:.2}s)",
            result.name,
            result.duration.as_secs_f64()
        )?;

        let failed = result.status == TestStatus::Fail;
        let opts = self.options;
        if let Some(reason) = &result.skip_reason {
            self.section(None, reason)?;
        }
        if opts.show_hooks || (failed && !result.formatted_pre_test_hooks_output.is_empty()) {
            self.section(Some("pre-test hooks"), &result.formatted_pre_test_hooks_output)?;
        }
        if opts.show_render || result.render_failed {
            self.section(Some("render"), &result.formatted_render_output)?;
        }
        if opts.show_validate || result.validate_failed {
            self.section(Some("validate"), &result.formatted_validate_output)?;
        }
        if opts.show_assertions || !result.failed_assertions.is_empty() {
            self.section(Some("assertions"), &result.formatted_assertions_output)?;
        }
        if opts.show_hooks || (failed && !result.formatted_post_test_hooks_output.is_empty()) {
            self.section(Some("post-test hooks"), &result.formatted_post_test_hooks_output)?;
        }
        if let Some(error) = &result.error {
            self.section(None, error)?;
        }
        Ok(())
    }

    pub fn print_summary(&mut self, passed: usize, failed: usize, skipped: usize) -> io::Result<()> {
        let total = passed + failed + skipped;
        write!(self.out, "\n{total} tests: ")?;
        self.colored(&format!("{passed} passed"), Color::Green)?;
        write!(self.out, ", ")?;
        if failed > 0 {
            self.colored(&format!("{failed} failed"), Color::Red)?;
        } else {
            write!(self.out, "0 failed")?;
        }
        writeln!(self.out, ", {skipped} skipped")
    }

    // ------------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------------

    fn section(&mut self, title: Option<&str>, body: &str) -> io::Result<()> {
        let body = body.trim_end();
        if body.is_empty() {
            return Ok(());
        }
        let indent = self.options.indent;
        match title {
            Some(title) => {
                writeln!(self.out, "{}{title}:", " ".repeat(indent))?;
                writeln!(self.out, "{}", indent_lines(body, indent * 2))
            }
            None => writeln!(self.out, "{}", indent_lines(body, indent)),
        }
    }

    fn colored(&mut self, text: &str, color: Color) -> io::Result<()> {
        self.out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }
}
