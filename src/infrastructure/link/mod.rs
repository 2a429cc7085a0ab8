//! Link Module
//!
//! Maintains one RFCOMM serial link to the harvesting controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ConnectionManager                      │
//! │  (cloneable handle; commands go to the LinkActor task)   │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┬──────────────┐
//!         │             │              │              │
//!         ▼             ▼              ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌───────────┐ ┌────────────┐
//! │  Attempt   │ │   Session   │ │ Reconnect │ │ EventSink  │
//! │            │ │             │ │           │ │            │
//! │ - adapter  │ │ - reader    │ │ - 5s timer│ │ - one slot │
//! │ - open     │ │ - writer    │ │ - flags   │ │ - replace  │
//! │ - timeout  │ │ - framing   │ │           │ │            │
//! └────────────┘ └─────────────┘ └───────────┘ └────────────┘
//! ```
//!
//! Tasks report back to the actor with a generation number. Reports from
//! superseded attempts or sessions are dropped there.
//!
//! ## Modules
//!
//! - [`transport`] - Platform seam: adapter state, permission, socket open
//! - [`resolver`] - Address validation and adapter checks
//! - [`framing`] - Inbound delimiter framing
//! - `session` - Reader and writer tasks for a live link
//! - [`reconnect`] - Auto-reconnect timer and flags
//! - [`manager`] - Public handle and state machine
//! - [`keepalive`] - Periodic keep-alive writes
//! - [`sink`] - Replaceable event listener

mod attempt;
pub mod framing;
pub mod keepalive;
pub mod manager;
pub mod reconnect;
mod report;
pub mod resolver;
#[cfg(windows)]
pub mod rfcomm;
mod session;
pub mod sink;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

pub use keepalive::KeepAlive;
pub use manager::{ConnectionManager, LinkConfig};
pub use sink::EventSink;
pub use transport::{LinkTransport, OpenedLink};

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterState, Endpoint};
use async_trait::async_trait;
use std::sync::Arc;

/// Stand-in for platforms without a supported Bluetooth stack. Reports a
/// missing adapter so every connect fails fast.
#[derive(Debug, Default)]
pub struct UnsupportedTransport;

#[async_trait]
impl LinkTransport for UnsupportedTransport {
    async fn adapter_state(&self) -> AdapterState {
        AdapterState::Missing
    }

    async fn open(&self, _endpoint: &Endpoint) -> Result<OpenedLink, LinkError> {
        Err(LinkError::AdapterUnavailable)
    }
}

/// Transport for the current platform.
pub fn default_transport() -> Arc<dyn LinkTransport> {
    #[cfg(windows)]
    {
        Arc::new(rfcomm::RfcommTransport::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedTransport)
    }
}
