//! Serial-link connection manager for the TreeBot harvesting controller.
//!
//! [`ConnectionManager`] keeps one RFCOMM link to the controller: it frames
//! outbound commands and inbound `*`/newline delimited messages, reconnects
//! after unexpected drops, and reports every state change to a replaceable
//! [`EventSink`].

pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::commands::{Joint, RobotCommand, SpeedLevel};
pub use domain::error::LinkError;
pub use domain::models::{ConnectionState, Endpoint, LinkEvent, LinkStatus};
pub use infrastructure::link::{
    default_transport, ConnectionManager, EventSink, KeepAlive, LinkConfig, LinkTransport,
};
