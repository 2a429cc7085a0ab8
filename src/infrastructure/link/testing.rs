//! Scriptable in-memory transport for tests.

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterState, Endpoint};
use crate::infrastructure::link::transport::{LinkReader, LinkTransport, LinkWriter, OpenedLink};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum OpenOutcome {
    Succeed,
    Fail(LinkError),
    /// Never completes; only cancellation ends the attempt.
    Hang,
    /// Opens a link whose reader never returns and whose writes all fail.
    BrokenWriter,
}

/// Reader that waits forever, as on a quiet but healthy link.
pub struct StalledReader;

#[async_trait]
impl LinkReader for StalledReader {
    async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, LinkError> {
        std::future::pending().await
    }
}

/// Writer whose every write fails.
pub struct FailingWriter;

#[async_trait]
impl LinkWriter for FailingWriter {
    async fn write(&mut self, _bytes: &[u8]) -> Result<(), LinkError> {
        Err(LinkError::StreamIo("write rejected".into()))
    }
}

/// A link that stays readable but cannot be written to.
pub fn broken_writer_link(name: Option<String>) -> OpenedLink {
    OpenedLink {
        name,
        reader: Box::new(StalledReader),
        writer: Box::new(FailingWriter),
    }
}

pub struct MockTransport {
    adapter: Mutex<AdapterState>,
    permitted: AtomicBool,
    outcomes: Mutex<VecDeque<OpenOutcome>>,
    opens: AtomicUsize,
    device_name: Option<String>,
    remotes: mpsc::UnboundedSender<DuplexStream>,
}

impl MockTransport {
    /// Returns the transport and a receiver yielding the device side of
    /// every successfully opened link.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        Self::with_name(Some("TreeBot".to_string()))
    }

    pub fn with_name(
        device_name: Option<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        let transport = Self {
            adapter: Mutex::new(AdapterState::Enabled),
            permitted: AtomicBool::new(true),
            outcomes: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
            device_name,
            remotes,
        };
        (Arc::new(transport), rx)
    }

    pub fn set_adapter(&self, state: AdapterState) {
        *self.adapter.lock().unwrap() = state;
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    /// Queue the outcome of a future `open`; unscripted opens succeed.
    pub fn push_outcome(&self, outcome: OpenOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkTransport for MockTransport {
    async fn adapter_state(&self) -> AdapterState {
        *self.adapter.lock().unwrap()
    }

    fn check_permission(&self) -> Result<(), LinkError> {
        if self.permitted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LinkError::PermissionDenied)
        }
    }

    async fn open(&self, _endpoint: &Endpoint) -> Result<OpenedLink, LinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OpenOutcome::Succeed);

        match outcome {
            OpenOutcome::Succeed => {
                let (local, remote) = tokio::io::duplex(1024);
                let _ = self.remotes.send(remote);
                Ok(OpenedLink::from_io(self.device_name.clone(), local))
            }
            OpenOutcome::Fail(error) => Err(error),
            OpenOutcome::Hang => std::future::pending().await,
            OpenOutcome::BrokenWriter => Ok(broken_writer_link(self.device_name.clone())),
        }
    }
}
