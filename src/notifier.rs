//! Advisory logging and progress UI.
//!
//! [`Notifier`] puts the `log` facade and an `indicatif` spinner behind one
//! verbosity switch:
//! - [`VerbosityLevel::Quiet`] → no step messages or notices; warnings still reach stderr.
//! - [`VerbosityLevel::Info`] → one log line per step, or a single live spinner
//!   line when progress display is requested.
//! - [`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`] → standard logs, including
//!   every engine command line.
//!
//! Nothing here writes to stdout; stdout carries only the resulting image id.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    Quiet,
    Info,
    Debug,
    Trace,
}

impl VerbosityLevel {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => VerbosityLevel::Quiet,
            (false, 0) => VerbosityLevel::Info,
            (false, 1) => VerbosityLevel::Debug,
            (false, _) => VerbosityLevel::Trace,
        }
    }

    pub fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    spinner: Option<ProgressBar>,
}

impl Notifier {
    /// `progress` only takes effect at [`VerbosityLevel::Info`]; the spinner hides
    /// itself when stderr is not a terminal.
    pub fn new(verbosity: VerbosityLevel, progress: bool) -> Self {
        let spinner = (progress && verbosity == VerbosityLevel::Info).then(|| {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
            {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });

        Self { verbosity, spinner }
    }

    pub fn quiet() -> Self {
        Self::new(VerbosityLevel::Quiet, false)
    }

    pub fn info(&self, message: &str) {
        match (&self.spinner, self.verbosity) {
            (_, VerbosityLevel::Quiet) => {}
            (Some(spinner), _) => spinner.set_message(message.to_string()),
            (None, _) => info!("{}", message),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            debug!("{}", message);
        }
    }

    /// Advisory warning about the result; silenced by `--quiet`.
    pub fn notice(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.warn(message);
        }
    }

    /// Shown at every verbosity, `--quiet` included.
    pub fn warn(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| warn!("{}", message)),
            None => warn!("{}", message),
        }
    }

    /// Clears the spinner line, if any.
    pub fn finish(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }

    pub fn use_spinner(&self) -> bool {
        self.spinner.is_some()
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }
}
