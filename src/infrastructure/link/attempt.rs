//! One connection attempt, run off the manager task.

use crate::domain::error::LinkError;
use crate::domain::models::Endpoint;
use crate::infrastructure::link::report::TaskReport;
use crate::infrastructure::link::resolver;
use crate::infrastructure::link::transport::{LinkTransport, OpenedLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to an in-flight attempt. Dropping or cancelling it abandons the
/// attempt; a half-open socket is closed when the open future is dropped.
pub(crate) struct PendingAttempt {
    generation: u64,
    cancel: CancellationToken,
}

impl PendingAttempt {
    pub fn spawn(
        generation: u64,
        endpoint: Endpoint,
        transport: Arc<dyn LinkTransport>,
        connect_timeout: Duration,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let cancel = CancellationToken::new();
        tokio::spawn(run_attempt(
            generation,
            endpoint,
            transport,
            connect_timeout,
            reports,
            cancel.clone(),
        ));
        Self { generation, cancel }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_attempt(
    generation: u64,
    endpoint: Endpoint,
    transport: Arc<dyn LinkTransport>,
    connect_timeout: Duration,
    reports: mpsc::UnboundedSender<TaskReport>,
    cancel: CancellationToken,
) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Connection attempt {} cancelled", generation);
            return;
        }
        outcome = open_link(transport.as_ref(), &endpoint, connect_timeout) => outcome,
    };

    // Superseded while the open was completing: dropping the link closes it.
    if cancel.is_cancelled() {
        debug!("Connection attempt {} finished after cancellation", generation);
        return;
    }

    let report = match outcome {
        Ok(link) => TaskReport::AttemptSucceeded {
            generation,
            endpoint,
            link,
        },
        Err(error) => TaskReport::AttemptFailed { generation, error },
    };
    let _ = reports.send(report);
}

async fn open_link(
    transport: &dyn LinkTransport,
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<OpenedLink, LinkError> {
    transport.check_permission()?;
    resolver::ensure_adapter(transport).await?;
    transport.cancel_discovery().await;

    info!("Attempting to connect socket to {}...", endpoint);
    match tokio::time::timeout(connect_timeout, transport.open(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(LinkError::ConnectTimeout(connect_timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AdapterState;
    use crate::infrastructure::link::testing::{MockTransport, OpenOutcome};

    fn endpoint() -> Endpoint {
        Endpoint::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    #[tokio::test]
    async fn test_successful_attempt_reports_link() {
        let (transport, _remotes) = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _attempt =
            PendingAttempt::spawn(3, endpoint(), transport, Duration::from_secs(15), tx);

        match rx.recv().await.unwrap() {
            TaskReport::AttemptSucceeded {
                generation, link, ..
            } => {
                assert_eq!(generation, 3);
                assert_eq!(link.name.as_deref(), Some("TreeBot"));
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_adapter_switched_off_fails_attempt() {
        let (transport, _remotes) = MockTransport::new();
        transport.set_adapter(AdapterState::Disabled);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _attempt = PendingAttempt::spawn(
            1,
            endpoint(),
            transport.clone(),
            Duration::from_secs(15),
            tx,
        );

        match rx.recv().await.unwrap() {
            TaskReport::AttemptFailed { error, .. } => {
                assert_eq!(error, LinkError::AdapterDisabled)
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_open_times_out() {
        let (transport, _remotes) = MockTransport::new();
        transport.push_outcome(OpenOutcome::Hang);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _attempt =
            PendingAttempt::spawn(1, endpoint(), transport, Duration::from_secs(15), tx);

        match rx.recv().await.unwrap() {
            TaskReport::AttemptFailed { error, .. } => {
                assert_eq!(error, LinkError::ConnectTimeout(15))
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_attempt_reports_nothing() {
        let (transport, _remotes) = MockTransport::new();
        transport.push_outcome(OpenOutcome::Hang);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attempt =
            PendingAttempt::spawn(1, endpoint(), transport, Duration::from_secs(15), tx);

        tokio::task::yield_now().await;
        attempt.cancel();
        drop(attempt);

        // The task drops its sender on exit, closing the channel.
        assert!(rx.recv().await.is_none());
    }
}
