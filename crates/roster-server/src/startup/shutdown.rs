//! Graceful shutdown handling for the Roster server

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown signal sender and receiver
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a receiver for shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }

    /// Resolve once shutdown has been requested, including before this call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the Ctrl+C / SIGTERM handlers.
///
/// Returns the signal that fires when either is received.
pub fn wait_for_shutdown_signal() -> ShutdownSignal {
    let shutdown = ShutdownSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        shutdown_clone.shutdown();
    });

    shutdown
}

/// Wait for every task to finish, giving up after `timeout`.
///
/// Returns true when all tasks finished in time.
pub async fn join_with_timeout(handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
    let count = handles.len();
    match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    warn!(error = %e, "Task ended abnormally during shutdown");
                }
            }
            info!(tasks = count, "Shutdown complete");
            true
        }
        Err(_) => {
            warn!(
                tasks = count,
                "Tasks did not finish within {:?}, exiting anyway", timeout
            );
            false
        }
    }
}

/// Block until shutdown is requested, then give `handles` up to `timeout`
/// to finish.
pub async fn drain_on_shutdown(
    signal: &ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
    timeout: Duration,
) -> bool {
    signal.wait().await;
    info!(tasks = handles.len(), "Shutdown requested, draining tasks");
    join_with_timeout(handles, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();

        signal.shutdown();

        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_join_with_timeout() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        let handle = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        signal.shutdown();
        assert!(join_with_timeout(vec![handle], Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_join_gives_up_on_stuck_task() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!join_with_timeout(vec![handle], Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_wait_after_signal_already_sent() {
        let signal = ShutdownSignal::new();
        signal.shutdown();

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait resolves for an earlier shutdown");
    }

    #[tokio::test]
    async fn test_drain_waits_for_signal_before_timing_out() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        let consumer = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        // Much longer than the drain timeout, with no signal the drain must not return
        let drain = drain_on_shutdown(&signal, vec![consumer], Duration::from_millis(50));
        tokio::pin!(drain);
        let early = tokio::time::timeout(Duration::from_millis(300), &mut drain).await;
        assert!(early.is_err(), "drain returned before shutdown was requested");

        signal.shutdown();
        assert!(drain.await);
    }
}
