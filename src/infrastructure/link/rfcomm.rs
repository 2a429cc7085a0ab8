//! RFCOMM serial-port transport on the Windows Bluetooth stack.

use crate::domain::error::LinkError;
use crate::domain::models::{AdapterState, Endpoint};
use crate::infrastructure::link::transport::{LinkReader, LinkTransport, LinkWriter, OpenedLink};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::Rfcomm::{RfcommDeviceService, RfcommServiceId};
use windows::Devices::Bluetooth::{BluetoothAdapter, BluetoothDevice, BluetoothError};
use windows::Devices::Enumeration::DeviceAccessStatus;
use windows::Devices::Radios::RadioState;
use windows::Networking::Sockets::StreamSocket;
use windows::Storage::Streams::{DataReader, DataWriter, InputStreamOptions};
use windows::core::Interface;
use windows_future::IAsyncOperation;

fn stream_error(e: windows::core::Error) -> LinkError {
    LinkError::StreamIo(e.to_string())
}

fn socket_error(e: windows::core::Error) -> LinkError {
    LinkError::SocketOpen(e.to_string())
}

/// Opens the Serial Port Profile service (UUID 0x1101) on a paired device.
pub struct RfcommTransport;

impl RfcommTransport {
    pub fn new() -> Self {
        Self
    }

    async fn find_serial_service(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(BluetoothDevice, RfcommDeviceService), LinkError> {
        let device = BluetoothDevice::FromBluetoothAddressAsync(endpoint.as_u64())
            .map_err(socket_error)?
            .await
            .map_err(|e| {
                warn!("Device {} not reachable: {}", endpoint, e);
                LinkError::InvalidEndpoint(endpoint.to_string())
            })?;

        let access = device
            .RequestAccessAsync()
            .map_err(socket_error)?
            .await
            .map_err(socket_error)?;
        if access != DeviceAccessStatus::Allowed {
            warn!("Device access status: {:?}", access);
            return Err(LinkError::PermissionDenied);
        }

        let services = device
            .GetRfcommServicesForIdAsync(&RfcommServiceId::SerialPort().map_err(socket_error)?)
            .map_err(socket_error)?
            .await
            .map_err(socket_error)?;
        if services.Error().map_err(socket_error)? != BluetoothError::Success {
            return Err(LinkError::ServiceNotFound(endpoint.to_string()));
        }

        let list = services.Services().map_err(socket_error)?;
        if list.Size().map_err(socket_error)? == 0 {
            return Err(LinkError::ServiceNotFound(endpoint.to_string()));
        }
        let service = list.GetAt(0).map_err(socket_error)?;
        Ok((device, service))
    }
}

impl Default for RfcommTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkTransport for RfcommTransport {
    async fn adapter_state(&self) -> AdapterState {
        let adapter = match BluetoothAdapter::GetDefaultAsync() {
            Ok(op) => op.await,
            Err(e) => Err(e),
        };
        let adapter = match adapter {
            Ok(adapter) => adapter,
            Err(e) => {
                debug!("No Bluetooth adapter: {}", e);
                return AdapterState::Missing;
            }
        };

        let radio = match adapter.GetRadioAsync() {
            Ok(op) => op.await,
            Err(e) => Err(e),
        };
        match radio.and_then(|radio| radio.State()) {
            Ok(RadioState::On) => AdapterState::Enabled,
            Ok(state) => {
                debug!("Bluetooth radio state: {:?}", state);
                AdapterState::Disabled
            }
            Err(e) => {
                debug!("Bluetooth radio unavailable: {}", e);
                AdapterState::Missing
            }
        }
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<OpenedLink, LinkError> {
        let (device, service) = self.find_serial_service(endpoint).await?;
        let name = device
            .Name()
            .ok()
            .map(|name| name.to_string())
            .filter(|name| !name.is_empty());

        let socket = StreamSocket::new().map_err(socket_error)?;
        let host = service.ConnectionHostName().map_err(socket_error)?;
        let service_name = service.ConnectionServiceName().map_err(socket_error)?;
        socket
            .ConnectAsync(&host, &service_name)
            .map_err(socket_error)?
            .await
            .map_err(|e| {
                let _ = socket.Close();
                socket_error(e)
            })?;
        info!("RFCOMM socket connected to {}", endpoint);

        let input = socket.InputStream().map_err(socket_error)?;
        let reader = DataReader::CreateDataReader(&input).map_err(socket_error)?;
        reader
            .SetInputStreamOptions(InputStreamOptions::Partial)
            .map_err(socket_error)?;
        let output = socket.OutputStream().map_err(socket_error)?;
        let writer = DataWriter::CreateDataWriter(&output).map_err(socket_error)?;

        Ok(OpenedLink {
            name,
            reader: Box::new(RfcommReader {
                reader,
                socket: socket.clone(),
            }),
            writer: Box::new(RfcommWriter { writer, socket }),
        })
    }
}

struct RfcommReader {
    reader: DataReader,
    socket: StreamSocket,
}

#[async_trait]
impl LinkReader for RfcommReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        // Load operations are classes; await them through the interface.
        let load: IAsyncOperation<u32> = self
            .reader
            .LoadAsync(buf.len() as u32)
            .and_then(|op| op.cast())
            .map_err(stream_error)?;
        let loaded = load.await.map_err(stream_error)? as usize;
        if loaded == 0 {
            return Ok(0);
        }
        self.reader
            .ReadBytes(&mut buf[..loaded])
            .map_err(stream_error)?;
        Ok(loaded)
    }
}

impl Drop for RfcommReader {
    fn drop(&mut self) {
        // Closing the socket completes any outstanding load.
        let _ = self.socket.Close();
    }
}

struct RfcommWriter {
    writer: DataWriter,
    socket: StreamSocket,
}

#[async_trait]
impl LinkWriter for RfcommWriter {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.writer.WriteBytes(bytes).map_err(stream_error)?;
        let store: IAsyncOperation<u32> = self
            .writer
            .StoreAsync()
            .and_then(|op| op.cast())
            .map_err(stream_error)?;
        store.await.map_err(stream_error)?;
        self.writer
            .FlushAsync()
            .map_err(stream_error)?
            .await
            .map_err(stream_error)?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.socket.Close();
    }
}
