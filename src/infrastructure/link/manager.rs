//! Connection manager: public handle plus the actor that owns all link state.
//!
//! Every mutation of connection state, session, pending attempt, endpoint and
//! reconnect flags happens on the actor task. Callers talk to it through a
//! command channel; attempt, session and timer tasks talk to it through a
//! report channel. Blocking transport calls never run on the actor.

use crate::domain::commands::RobotCommand;
use crate::domain::error::LinkError;
use crate::domain::models::{
    ConnectionState, Endpoint, LinkEvent, LinkStatus, Transition, DEFAULT_DEVICE_NAME,
};
use crate::domain::settings::Settings;
use crate::infrastructure::link::attempt::PendingAttempt;
use crate::infrastructure::link::reconnect::{ReconnectPolicy, RECONNECT_DELAY};
use crate::infrastructure::link::report::TaskReport;
use crate::infrastructure::link::resolver;
use crate::infrastructure::link::session::{Session, WriteAck, WriteRequest};
use crate::infrastructure::link::sink::{EventSink, EventSinkSlot};
use crate::infrastructure::link::transport::{LinkTransport, OpenedLink};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Runtime knobs for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound on a single socket open.
    pub connect_timeout: Duration,
    /// Initial value of the auto-reconnect switch.
    pub auto_reconnect: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            auto_reconnect: true,
        }
    }
}

impl From<&Settings> for LinkConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            auto_reconnect: settings.auto_reconnect,
        }
    }
}

enum ManagerCommand {
    Connect {
        endpoint: Endpoint,
        ack: oneshot::Sender<()>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    Send {
        bytes: Vec<u8>,
        ack: Option<WriteAck>,
    },
    SetAutoReconnect {
        enabled: bool,
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Shared handle to the link. Cheap to clone; all clones drive the same
/// actor. Dropping the last clone shuts the actor down.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    status: watch::Receiver<LinkStatus>,
    sink: EventSinkSlot,
    transport: Arc<dyn LinkTransport>,
}

impl ConnectionManager {
    /// Spawn the manager actor. Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn LinkTransport>, config: LinkConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let sink = EventSinkSlot::new();

        let actor = LinkActor {
            transport: transport.clone(),
            connect_timeout: config.connect_timeout,
            sink: sink.clone(),
            status: status_tx,
            state: ConnectionState::Idle,
            generation: 0,
            attempt: None,
            session: None,
            endpoint: None,
            device_name: String::new(),
            reconnect: ReconnectPolicy::new(config.auto_reconnect),
            reports: reports_tx,
        };
        tokio::spawn(actor.run(commands_rx, reports_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            sink,
            transport,
        }
    }

    /// Replace the current event listener.
    pub fn register_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.sink.register(sink);
    }

    /// Start connecting to `address`, superseding any attempt or session.
    ///
    /// Returns whether an attempt was started; the outcome arrives through
    /// the event sink. Permission, adapter and address problems are reported
    /// immediately and return `false` without starting anything.
    pub async fn connect(&self, address: &str) -> bool {
        if let Err(e) = self.transport.check_permission() {
            warn!("Cannot connect: {}", e);
            self.sink.emit(LinkEvent::for_attempt_failure(&e));
            return false;
        }

        let endpoint = match resolver::resolve(self.transport.as_ref(), address).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Cannot connect to {}: {}", address, e);
                self.sink.emit(LinkEvent::for_attempt_failure(&e));
                return false;
            }
        };

        let (ack, done) = oneshot::channel();
        if self
            .commands
            .send(ManagerCommand::Connect { endpoint, ack })
            .is_err()
        {
            error!("Connection manager is no longer running");
            return false;
        }
        done.await.is_ok()
    }

    /// User-initiated disconnect. Idempotent; stops auto-reconnect until the
    /// next `connect`.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(ManagerCommand::Disconnect { ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Fire-and-forget send. Failures are reported through the event sink.
    pub fn send_command(&self, command: &str) {
        let request = ManagerCommand::Send {
            bytes: command.as_bytes().to_vec(),
            ack: None,
        };
        if self.commands.send(request).is_err() {
            self.sink.emit(LinkEvent::NotConnected);
        }
    }

    pub fn send(&self, command: &RobotCommand) {
        self.send_command(&command.to_wire());
    }

    /// Send and wait until the bytes were flushed to the link. Fails with
    /// [`LinkError::AlreadyConnecting`] while an attempt is still in flight.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Send {
                bytes: bytes.to_vec(),
                ack: Some(ack),
            })
            .map_err(|_| LinkError::ManagerClosed)?;
        done.await.unwrap_or(Err(LinkError::NotConnected))
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().state.is_connected()
    }

    /// Name of the connected device, empty when not connected.
    pub fn connected_endpoint_name(&self) -> String {
        let status = self.status.borrow();
        if status.state.is_connected() {
            status.device_name.clone()
        } else {
            String::new()
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Watch every published status change.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub async fn enable_auto_reconnect(&self, enabled: bool) {
        let (ack, done) = oneshot::channel();
        let command = ManagerCommand::SetAutoReconnect { enabled, ack };
        if self.commands.send(command).is_ok() {
            let _ = done.await;
        }
    }

    /// Full teardown: disconnect, disable auto-reconnect, stop the actor and
    /// release the listener. Later calls on any clone are no-ops.
    pub async fn cleanup(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(ManagerCommand::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }
        self.sink.clear();
    }
}

struct LinkActor {
    transport: Arc<dyn LinkTransport>,
    connect_timeout: Duration,
    sink: EventSinkSlot,
    status: watch::Sender<LinkStatus>,

    state: ConnectionState,
    /// Bumped for every attempt; the session started from an attempt keeps
    /// its number, so late reports from superseded work are recognizable.
    generation: u64,
    attempt: Option<PendingAttempt>,
    session: Option<Session>,
    endpoint: Option<Endpoint>,
    device_name: String,
    reconnect: ReconnectPolicy,
    reports: mpsc::UnboundedSender<TaskReport>,
}

impl LinkActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
        mut reports: mpsc::UnboundedReceiver<TaskReport>,
    ) {
        debug!("Connection manager started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(report) = reports.recv() => self.handle_report(report),
            }
        }
        debug!("Connection manager stopped");
    }

    /// Breaks once the actor should stop.
    fn handle_command(&mut self, command: ManagerCommand) -> ControlFlow<()> {
        match command {
            ManagerCommand::Connect { endpoint, ack } => {
                self.reconnect.cancel();
                self.reconnect.rearm();
                self.begin_attempt(endpoint);
                let _ = ack.send(());
            }
            ManagerCommand::Disconnect { ack } => {
                self.disconnect();
                let _ = ack.send(());
            }
            ManagerCommand::Send { bytes, ack } => self.send(bytes, ack),
            ManagerCommand::SetAutoReconnect { enabled, ack } => {
                info!("Auto-reconnect {}", if enabled { "enabled" } else { "disabled" });
                self.reconnect.set_enabled(enabled);
                let _ = ack.send(());
            }
            ManagerCommand::Shutdown { ack } => {
                self.shutdown();
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_report(&mut self, report: TaskReport) {
        match report {
            TaskReport::AttemptSucceeded {
                generation,
                endpoint,
                link,
            } => self.on_attempt_succeeded(generation, endpoint, link),
            TaskReport::AttemptFailed { generation, error } => {
                self.on_attempt_failed(generation, error)
            }
            TaskReport::SessionLost { generation, error } => {
                self.on_session_lost(generation, error)
            }
            TaskReport::ReconnectDue { ticket } => self.on_reconnect_due(ticket),
        }
    }

    fn transition(&mut self, transition: Transition) -> bool {
        match self.state.apply(transition) {
            Some(next) => {
                debug!("Connection state {:?} -> {:?}", self.state, next);
                self.state = next;
                self.publish();
                true
            }
            None => {
                debug!("Ignoring {:?} in state {:?}", transition, self.state);
                false
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(LinkStatus {
            state: self.state,
            endpoint: self.endpoint.clone(),
            device_name: self.device_name.clone(),
        });
    }

    fn is_current_attempt(&self, generation: u64) -> bool {
        self.attempt.as_ref().map(PendingAttempt::generation) == Some(generation)
    }

    /// Cancel the pending attempt and close the live session, if any.
    fn teardown(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            info!("Cancelling connection attempt {}", attempt.generation());
            attempt.cancel();
        }
        if let Some(session) = self.session.take() {
            info!("Closing session {}", session.generation());
            session.close();
        }
    }

    fn begin_attempt(&mut self, endpoint: Endpoint) {
        self.teardown();
        self.generation += 1;
        self.endpoint = Some(endpoint.clone());
        self.device_name.clear();
        self.transition(Transition::Connect);

        info!("Connecting to {} (attempt {})", endpoint, self.generation);
        self.sink.emit(LinkEvent::Connecting {
            address: endpoint.to_string(),
        });
        self.attempt = Some(PendingAttempt::spawn(
            self.generation,
            endpoint,
            self.transport.clone(),
            self.connect_timeout,
            self.reports.clone(),
        ));
    }

    fn on_attempt_succeeded(&mut self, generation: u64, endpoint: Endpoint, link: OpenedLink) {
        if !self.is_current_attempt(generation) {
            debug!("Dropping link from superseded attempt {}", generation);
            return;
        }
        self.attempt = None;

        let name = link
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        self.device_name = name.clone();
        self.endpoint = Some(endpoint);
        self.reconnect.clear_stop();
        if !self.transition(Transition::AttemptSucceeded) {
            return;
        }

        info!("Connected to {}", name);
        self.sink.emit(LinkEvent::Connected { name });
        self.sink.emit(LinkEvent::ReadyForCommands);
        self.session = Some(Session::start(
            generation,
            link,
            self.sink.clone(),
            self.reports.clone(),
        ));
    }

    fn on_attempt_failed(&mut self, generation: u64, error: LinkError) {
        if !self.is_current_attempt(generation) {
            debug!("Ignoring failure of superseded attempt {}", generation);
            return;
        }
        self.attempt = None;
        self.transition(Transition::AttemptFailed);

        error!("Connection attempt {} failed: {}", generation, error);
        self.sink.emit(LinkEvent::for_attempt_failure(&error));
        if error.is_retryable() {
            self.schedule_reconnect();
        } else {
            info!("Not retrying after: {}", error);
        }
    }

    fn on_session_lost(&mut self, generation: u64, error: LinkError) {
        match &self.session {
            Some(session) if session.generation() == generation => {}
            _ => {
                debug!("Ignoring loss report for stale session {}", generation);
                return;
            }
        }
        self.session = None;
        self.device_name.clear();
        if !self.transition(Transition::SessionLost) {
            return;
        }

        warn!("Session {} lost: {}", generation, error);
        self.sink.emit(LinkEvent::for_session_loss(&error));
        if error.is_retryable() {
            self.schedule_reconnect();
        }
    }

    fn on_reconnect_due(&mut self, ticket: u64) {
        if !self.reconnect.take_due(ticket) {
            debug!("Ignoring stale reconnect timer {}", ticket);
            return;
        }
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!("Reconnect skipped, state is {:?}", self.state);
            return;
        }
        if !self.reconnect.permits() {
            debug!("Reconnect skipped, auto-reconnect no longer permitted");
            return;
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        info!("Auto-reconnecting to {}", endpoint);
        self.begin_attempt(endpoint);
    }

    fn schedule_reconnect(&mut self) {
        if self
            .reconnect
            .schedule(self.endpoint.as_ref(), &self.reports)
        {
            self.sink.emit(LinkEvent::ReconnectScheduled {
                delay: RECONNECT_DELAY,
            });
        }
    }

    fn send(&mut self, bytes: Vec<u8>, ack: Option<WriteAck>) {
        if let Some(session) = self.session.as_ref().filter(|_| self.state.is_connected()) {
            // A failed submit drops the ack; the waiting caller sees NotConnected.
            // The writer already reported the loss, which drives reconnection.
            if session.writer().submit(WriteRequest { bytes, ack }).is_err() {
                warn!("Cannot send data: session is closing");
                self.sink.emit(LinkEvent::NotConnected);
            }
            return;
        }

        if let Some(ack) = ack {
            let error = if self.state == ConnectionState::Connecting {
                LinkError::AlreadyConnecting
            } else {
                LinkError::NotConnected
            };
            let _ = ack.send(Err(error));
        }

        warn!("Cannot send data: not connected");
        self.sink.emit(LinkEvent::NotConnected);
        if self.state != ConnectionState::Connecting && !self.reconnect.is_scheduled() {
            self.schedule_reconnect();
        }
    }

    fn disconnect(&mut self) {
        let active = self.attempt.is_some()
            || self.session.is_some()
            || self.state != ConnectionState::Idle;

        self.reconnect.stop();
        self.teardown();
        self.endpoint = None;
        self.device_name.clear();

        if !active {
            debug!("Disconnect requested while idle");
            return;
        }

        self.transition(Transition::DisconnectRequested);
        self.transition(Transition::DisconnectCompleted);
        info!("Disconnected");
        self.sink.emit(LinkEvent::Disconnected { reason: None });
    }

    fn shutdown(&mut self) {
        info!("Cleaning up connection manager");
        self.disconnect();
    }
}
