use crate::domain::error::LinkError;
use std::fmt;
use std::time::Duration;

/// Name reported when the remote device does not advertise one.
pub const DEFAULT_DEVICE_NAME: &str = "Harvesting Device";

/// Address of the remote serial device, normalized to `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: String,
}

impl Endpoint {
    /// Parse a Bluetooth MAC address. Accepts `:` or `-` separators in
    /// either case.
    pub fn parse(address: &str) -> Result<Self, LinkError> {
        let trimmed = address.trim();
        let octets: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();

        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(LinkError::InvalidEndpoint(address.to_string()));
        }

        Ok(Self {
            address: octets.join(":").to_ascii_uppercase(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 48-bit address packed into the low bytes of a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.address
            .split(':')
            .filter_map(|o| u8::from_str_radix(o, 16).ok())
            .fold(0u64, |acc, b| (acc << 8) | b as u64)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Adapter availability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Missing,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

/// Inputs that drive [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    AttemptSucceeded,
    AttemptFailed,
    SessionLost,
    DisconnectRequested,
    DisconnectCompleted,
}

impl ConnectionState {
    /// Transition table. `None` means the input does not apply in this
    /// state and must be ignored (e.g. a second loss report for a session
    /// that is already gone).
    pub fn apply(self, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState::*;
        match (self, transition) {
            (_, Transition::Connect) => Some(Connecting),
            (Connecting, Transition::AttemptSucceeded) => Some(Connected),
            (Connecting, Transition::AttemptFailed) => Some(Failed),
            (Connected, Transition::SessionLost) => Some(Failed),
            (_, Transition::DisconnectRequested) => Some(Disconnecting),
            (Disconnecting, Transition::DisconnectCompleted) => Some(Idle),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Snapshot published by the manager after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub endpoint: Option<Endpoint>,
    pub device_name: String,
}

/// Events delivered to the registered sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connecting { address: String },
    Connected { name: String },
    ReadyForCommands,
    /// `reason` is `None` for a user-initiated disconnect.
    Disconnected { reason: Option<String> },
    ConnectionFailed { reason: String },
    PermissionDenied,
    AdapterUnavailable,
    AdapterDisabled,
    InvalidEndpoint { address: String },
    NotConnected,
    ReconnectScheduled { delay: Duration },
    /// A decoded inbound message from the controller.
    Message(String),
}

impl LinkEvent {
    /// Stable category tag for collaborators that switch on event kind.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::ReadyForCommands => "ready-for-commands",
            Self::Disconnected { .. } => "disconnected",
            Self::ConnectionFailed { .. } => "connection-failed",
            Self::PermissionDenied => "permission-denied",
            Self::AdapterUnavailable => "adapter-unavailable",
            Self::AdapterDisabled => "adapter-disabled",
            Self::InvalidEndpoint { .. } => "invalid-endpoint",
            Self::NotConnected => "not-connected",
            Self::ReconnectScheduled { .. } => "reconnect-scheduled",
            Self::Message(_) => "message",
        }
    }

    pub fn severity(&self) -> MessageSeverity {
        match self {
            Self::Connected { .. } | Self::ReadyForCommands => MessageSeverity::Success,
            Self::Disconnected { reason: Some(_) }
            | Self::NotConnected
            | Self::ReconnectScheduled { .. } => MessageSeverity::Warning,
            Self::ConnectionFailed { .. }
            | Self::PermissionDenied
            | Self::AdapterUnavailable
            | Self::AdapterDisabled
            | Self::InvalidEndpoint { .. } => MessageSeverity::Error,
            _ => MessageSeverity::Info,
        }
    }

    /// Event reported for a failed connection attempt.
    pub fn for_attempt_failure(error: &LinkError) -> Self {
        match error {
            LinkError::PermissionDenied => Self::PermissionDenied,
            LinkError::AdapterUnavailable => Self::AdapterUnavailable,
            LinkError::AdapterDisabled => Self::AdapterDisabled,
            LinkError::InvalidEndpoint(address) => Self::InvalidEndpoint {
                address: address.clone(),
            },
            other => Self::ConnectionFailed {
                reason: other.to_string(),
            },
        }
    }

    /// Event reported when a live session is lost.
    pub fn for_session_loss(error: &LinkError) -> Self {
        match error {
            LinkError::PermissionDenied => Self::PermissionDenied,
            other => Self::Disconnected {
                reason: Some(other.to_string()),
            },
        }
    }
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { address } => write!(f, "Connecting to {}...", address),
            Self::Connected { name } => write!(f, "Bluetooth: Connected to {}", name),
            Self::ReadyForCommands => f.write_str("Harvesting System: Ready for commands"),
            Self::Disconnected { reason: None } => f.write_str("Bluetooth: Disconnected"),
            Self::Disconnected {
                reason: Some(reason),
            } => write!(f, "Bluetooth: Connection lost ({})", reason),
            Self::ConnectionFailed { reason } => {
                write!(f, "Bluetooth: Connection failed ({})", reason)
            }
            Self::PermissionDenied => f.write_str("Bluetooth: Permission denied"),
            Self::AdapterUnavailable => f.write_str("Bluetooth: Adapter not available"),
            Self::AdapterDisabled => f.write_str("Bluetooth: Please enable Bluetooth"),
            Self::InvalidEndpoint { address } => {
                write!(f, "Bluetooth: Invalid device address '{}'", address)
            }
            Self::NotConnected => f.write_str("Bluetooth: Not connected"),
            Self::ReconnectScheduled { delay } => {
                write!(f, "Reconnecting in {}s...", delay.as_secs())
            }
            Self::Message(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl From<&LinkEvent> for StatusMessage {
    fn from(event: &LinkEvent) -> Self {
        Self {
            message: event.to_string(),
            severity: event.severity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
