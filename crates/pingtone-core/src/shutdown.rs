//! Cooperative shutdown signal
//!
//! One [`Shutdown`] per process. Every long-running loop holds a
//! [`ShutdownListener`] and checks it once per iteration (threads) or
//! `select!`s on [`ShutdownListener::wait`] (async tasks).

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the stop signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask every loop to stop. Idempotent.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Shutdown requested");
        }
    }

    /// Whether the signal has been raised
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a listener for a loop
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop side of the stop signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Non-blocking check for threads
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal is raised (or its owner is gone)
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
