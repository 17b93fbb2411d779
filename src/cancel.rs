use anyhow::{Context, Result};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag that tells a running flatten to stop at the next step boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token cancelled. Returns `true` if it already was.
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Routes Ctrl-C into this token.
    ///
    /// The first interrupt lets the current engine call fail and the cleanup
    /// actions run. A second interrupt exits immediately with status 130.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.cancel() {
                std::process::exit(130);
            }
            warn!("Interrupted, cleaning up (press Ctrl-C again to exit immediately)");
        })
        .context("setting up signal handler")
    }
}
