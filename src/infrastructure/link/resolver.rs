//! Endpoint resolution: adapter checks plus address validation.

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterState, Endpoint};
use crate::infrastructure::link::transport::LinkTransport;

/// Fail unless an adapter is present and powered on.
pub async fn ensure_adapter(transport: &dyn LinkTransport) -> Result<(), LinkError> {
    match transport.adapter_state().await {
        AdapterState::Missing => Err(LinkError::AdapterUnavailable),
        AdapterState::Disabled => Err(LinkError::AdapterDisabled),
        AdapterState::Enabled => Ok(()),
    }
}

/// Turn a caller-supplied address into a connectable endpoint.
pub async fn resolve(transport: &dyn LinkTransport, address: &str) -> Result<Endpoint, LinkError> {
    ensure_adapter(transport).await?;
    Endpoint::parse(address)
}
