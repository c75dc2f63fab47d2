//! Cooperative shutdown signal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag raised once to stop the session
///
/// Audio loops poll it once per frame.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create a lowered flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn raise(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown requested");
        }
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag when the process receives Ctrl-C
    pub fn raise_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => flag.raise(),
                Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
            }
        })
    }
}
