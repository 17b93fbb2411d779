//! Deferred release of temporary resources.
//!
//! [`CleanupStack`] holds the cleanup actions of a run in the order their
//! resources were acquired and executes them newest-first. Each action runs at
//! most once. A failing action is logged and does not stop the ones after it.
//! Actions still pending when the stack is dropped run from `Drop`, so early
//! returns and panics release resources too.

use anyhow::Result;
use log::{debug, warn};

type Action<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// A cleanup action that returned an error.
#[derive(Debug)]
pub struct CleanupFailure {
    pub label: String,
    pub error: anyhow::Error,
}

#[derive(Default)]
pub struct CleanupStack<'a> {
    pending: Vec<(String, Action<'a>)>,
}

impl<'a> CleanupStack<'a> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<()> + 'a,
    {
        let label = label.into();
        debug!("Registered cleanup: {}", label);
        self.pending.push((label, Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Runs every pending action in reverse registration order.
    pub fn run(&mut self) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        while let Some((label, action)) = self.pending.pop() {
            debug!("Running cleanup: {}", label);
            if let Err(error) = action() {
                warn!("Cleanup step '{}' failed: {:#}", label, error);
                failures.push(CleanupFailure { label, error });
            }
        }
        failures
    }
}

impl Drop for CleanupStack<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.run();
        }
    }
}
