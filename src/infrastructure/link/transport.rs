//! Transport seam between the link runtime and the platform Bluetooth stack.

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterState, Endpoint};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Inbound half of an open stream.
#[async_trait]
pub trait LinkReader: Send {
    /// Read available bytes. `Ok(0)` means the remote closed the stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
}

/// Outbound half of an open stream.
#[async_trait]
pub trait LinkWriter: Send {
    /// Write all bytes and flush them to the device.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Close the outbound direction. Errors are ignored.
    async fn close(&mut self) {}
}

/// A freshly opened connection, ready to become a session.
pub struct OpenedLink {
    /// Name the device reported, if any.
    pub name: Option<String>,
    pub reader: Box<dyn LinkReader>,
    pub writer: Box<dyn LinkWriter>,
}

impl OpenedLink {
    /// Wrap any tokio byte stream.
    pub fn from_io<S>(name: Option<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            name,
            reader: Box::new(IoReader(reader)),
            writer: Box::new(IoWriter(writer)),
        }
    }
}

impl std::fmt::Debug for OpenedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedLink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct IoReader<S>(ReadHalf<S>);

#[async_trait]
impl<S: AsyncRead + Send> LinkReader for IoReader<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.0.read(buf).await.map_err(|e| LinkError::from_io(&e))
    }
}

struct IoWriter<S>(WriteHalf<S>);

#[async_trait]
impl<S: AsyncWrite + Send> LinkWriter for IoWriter<S> {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0
            .write_all(bytes)
            .await
            .map_err(|e| LinkError::from_io(&e))?;
        self.0.flush().await.map_err(|e| LinkError::from_io(&e))
    }

    async fn close(&mut self) {
        let _ = self.0.shutdown().await;
    }
}

/// Platform Bluetooth stack as seen by the connection manager.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Whether an adapter exists and is powered on.
    async fn adapter_state(&self) -> AdapterState;

    /// Whether the process may open Bluetooth connections.
    fn check_permission(&self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Stop any running inquiry; discovery slows down connection setup.
    async fn cancel_discovery(&self) {}

    /// Open a serial-port stream to `endpoint`. Dropping the returned
    /// future or the link closes the underlying socket.
    async fn open(&self, endpoint: &Endpoint) -> Result<OpenedLink, LinkError>;
}
