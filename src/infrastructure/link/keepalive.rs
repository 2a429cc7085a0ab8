//! Periodic keep-alive writes while a session is live.

use crate::infrastructure::link::manager::ConnectionManager;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Background task that writes `command` every `interval` while the manager
/// reports a live connection. A failed write goes through the normal loss
/// path; the monitor itself only logs it.
pub struct KeepAlive {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn(manager: ConnectionManager, interval: Duration, command: String) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !manager.is_connected() {
                    continue;
                }
                match manager.write(command.as_bytes()).await {
                    Ok(()) => debug!("Keep-alive sent"),
                    Err(e) => warn!("Keep-alive failed: {}", e),
                }
            }
            debug!("Keep-alive stopped");
        });

        Self { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
