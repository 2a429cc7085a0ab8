//! Reconnection policy: a single cancelable timer gated by two flags.
//!
//! `enabled` is the auto-reconnect switch; `stopped` is raised by a user
//! disconnect (or by switching auto-reconnect off) and only a fresh connect
//! lowers it again.

use crate::domain::models::Endpoint;
use crate::infrastructure::link::report::TaskReport;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fixed delay before an automatic reconnect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

struct ScheduledReconnect {
    ticket: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct ReconnectPolicy {
    enabled: bool,
    /// Last value set through the public switch; restored by a fresh connect.
    preferred: bool,
    stopped: bool,
    timer: Option<ScheduledReconnect>,
    next_ticket: u64,
}

impl ReconnectPolicy {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            preferred: enabled,
            stopped: false,
            timer: None,
            next_ticket: 0,
        }
    }

    pub fn permits(&self) -> bool {
        self.enabled && !self.stopped
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer.is_some()
    }

    /// Arm the timer, replacing any earlier one. No-op (returns `false`) when
    /// the flags forbid it or no endpoint is known.
    pub fn schedule(
        &mut self,
        endpoint: Option<&Endpoint>,
        reports: &mpsc::UnboundedSender<TaskReport>,
    ) -> bool {
        if !self.permits() {
            debug!("Auto-reconnect not permitted, skipping");
            return false;
        }
        let Some(endpoint) = endpoint else {
            debug!("No endpoint to reconnect to");
            return false;
        };

        self.cancel();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let reports = reports.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_DELAY).await;
            let _ = reports.send(TaskReport::ReconnectDue { ticket });
        });
        self.timer = Some(ScheduledReconnect { ticket, handle });

        info!(
            "Starting auto-reconnection attempt to {} in {} seconds",
            endpoint,
            RECONNECT_DELAY.as_secs()
        );
        true
    }

    /// Consume a fired timer. Returns `false` for a ticket that was
    /// cancelled or replaced after it fired.
    pub fn take_due(&mut self, ticket: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.ticket == ticket => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            debug!("Cancelled pending reconnect {}", timer.ticket);
        }
    }

    /// Public auto-reconnect switch. Turning it off also stops pending and
    /// future retries until the next fresh connect.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.preferred = enabled;
        if !enabled {
            self.stopped = true;
            self.cancel();
        }
    }

    /// Fresh user connect: clear the stop flag and restore the switch.
    pub fn rearm(&mut self) {
        self.stopped = false;
        self.enabled = self.preferred;
    }

    /// Successful connection clears the stop flag.
    pub fn clear_stop(&mut self) {
        self.stopped = false;
    }

    /// User disconnect or teardown: no retries until the next fresh connect.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.stopped = true;
        self.cancel();
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn due_ticket(report: TaskReport) -> u64 {
        match report {
            TaskReport::ReconnectDue { ticket } => ticket,
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_fixed_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut policy = ReconnectPolicy::new(true);
        let started = tokio::time::Instant::now();

        assert!(policy.schedule(Some(&endpoint()), &tx));
        let ticket = due_ticket(rx.recv().await.unwrap());

        assert!(started.elapsed() >= RECONNECT_DELAY);
        assert!(policy.take_due(ticket));
        assert!(!policy.is_scheduled());
        assert!(!policy.take_due(ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut policy = ReconnectPolicy::new(true);

        assert!(policy.schedule(Some(&endpoint()), &tx));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(policy.schedule(Some(&endpoint()), &tx));

        let ticket = due_ticket(rx.recv().await.unwrap());
        assert_eq!(ticket, 2);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut policy = ReconnectPolicy::new(true);

        assert!(policy.schedule(Some(&endpoint()), &tx));
        policy.set_enabled(false);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(rx.try_recv().is_err());
        assert!(!policy.schedule(Some(&endpoint()), &tx));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_blocks_until_rearmed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut policy = ReconnectPolicy::new(true);

        policy.stop();
        assert!(!policy.permits());
        assert!(!policy.schedule(Some(&endpoint()), &tx));

        policy.rearm();
        assert!(policy.permits());
        assert!(policy.schedule(Some(&endpoint()), &tx));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_endpoint() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut policy = ReconnectPolicy::new(true);
        assert!(!policy.schedule(None, &tx));
    }

    #[test]
    fn test_switch_preference_survives_rearm() {
        let mut policy = ReconnectPolicy::new(true);
        policy.set_enabled(false);
        policy.rearm();
        assert!(!policy.permits());

        policy.set_enabled(true);
        assert!(!policy.permits(), "still stopped until a fresh connect");
        policy.rearm();
        assert!(policy.permits());
    }
}
