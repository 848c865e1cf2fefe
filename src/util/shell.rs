//! Status lines and progress bars.
//!
//! Every user-facing line of a build goes through [`Shell`]: right-aligned
//! cargo-style status words on stderr, plus an indicatif progress bar per
//! platform while packages are compiled. Bars are only drawn on a terminal
//! and never in verbose mode, where the tracing output would tear them.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only, no progress.
    Quiet,
    #[default]
    Normal,
    /// Debug logging enabled; status lines only, no progress bars.
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status words printed in front of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Created,
    Finished,
    Packaged,

    // In-progress statuses (cyan)
    Installing,
    Updating,
    Synthesizing,
    Compiling,
    Merging,
    Assembling,

    // Warning statuses (yellow)
    Skipped,
    Warning,

    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "Created",
            Status::Finished => "Finished",
            Status::Packaged => "Packaged",
            Status::Installing => "Installing",
            Status::Updating => "Updating",
            Status::Synthesizing => "Synthesizing",
            Status::Compiling => "Compiling",
            Status::Merging => "Merging",
            Status::Assembling => "Assembling",
            Status::Skipped => "Skipped",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Created | Status::Finished | Status::Packaged => "\x1b[1;32m",
            Status::Installing
            | Status::Updating
            | Status::Synthesizing
            | Status::Compiling
            | Status::Merging
            | Status::Assembling => "\x1b[1;36m",
            Status::Skipped | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }
}

/// Width the status word is right-aligned to.
const STATUS_WIDTH: usize = 12;

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
    interactive: bool,
}

impl Shell {
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let interactive = io::stderr().is_terminal();
        let use_color = match color {
            ColorChoice::Auto => interactive,
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };

        Shell {
            verbosity,
            use_color,
            interactive,
        }
    }

    /// Create a shell from the global CLI flags.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        Shell::new(verbosity, color)
    }

    /// A shell that prints nothing, for tests and library callers.
    pub fn quiet() -> Self {
        Shell {
            verbosity: Verbosity::Quiet,
            use_color: false,
            interactive: false,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print `{status:>12} {message}` to stderr.
    ///
    /// In quiet mode only errors are printed.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && status != Status::Error {
            return;
        }
        eprintln!("{} {}", self.format_status(status), msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        if self.use_color {
            format!(
                "{}{:>width$}\x1b[0m",
                status.color_code(),
                text,
                width = STATUS_WIDTH
            )
        } else {
            format!("{:>width$}", text, width = STATUS_WIDTH)
        }
    }

    /// Start timing an operation. Finishing the span prints a `Finished`
    /// line with the elapsed time; dropping it silently (on error) doesn't.
    pub fn span(self: &Arc<Self>) -> Span {
        Span {
            shell: Arc::clone(self),
            start: Instant::now(),
        }
    }

    /// A progress bar over `total` items, drawn only on an interactive
    /// terminal in normal verbosity.
    pub fn progress(self: &Arc<Self>, total: u64, msg: impl Display) -> Progress {
        let pb = if self.interactive && self.verbosity == Verbosity::Normal && total > 1 {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb.set_message(msg.to_string());
            Some(pb)
        } else {
            None
        };

        Progress {
            shell: Arc::clone(self),
            pb,
            total,
            current: 0,
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}

/// A timed operation.
pub struct Span {
    shell: Arc<Shell>,
    start: Instant,
}

impl Span {
    /// Print `Finished <msg> in <elapsed>`.
    pub fn finish_with_message(self, msg: impl Display) {
        self.shell.status(
            Status::Finished,
            format!("{} in {}", msg, format_duration(self.start.elapsed())),
        );
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Progress bar wrapper that respects the shell's mode.
///
/// Status lines printed while a bar is visible are routed through
/// [`Progress::status`] so they appear above it.
pub struct Progress {
    shell: Arc<Shell>,
    pb: Option<ProgressBar>,
    total: u64,
    current: u64,
}

impl Progress {
    pub fn inc(&mut self, delta: u64) {
        self.current += delta;
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    /// Print a status line without breaking the bar.
    pub fn status(&self, status: Status, msg: impl Display) {
        match &self.pb {
            Some(pb) => pb.suspend(|| self.shell.status(status, msg)),
            None => self.shell.status(status, msg),
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }

    pub fn position(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
