//! Live session: one reader task and one writer task over an open link.

use crate::domain::error::LinkError;
use crate::domain::models::LinkEvent;
use crate::infrastructure::link::framing::MessageBuffer;
use crate::infrastructure::link::report::TaskReport;
use crate::infrastructure::link::sink::EventSinkSlot;
use crate::infrastructure::link::transport::{LinkReader, LinkWriter, OpenedLink};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const READ_CHUNK: usize = 1024;

pub(crate) type WriteAck = oneshot::Sender<Result<(), LinkError>>;

pub(crate) struct WriteRequest {
    pub bytes: Vec<u8>,
    pub ack: Option<WriteAck>,
}

/// Queue in front of the writer task. Requests are written one at a time
/// in arrival order, so concurrent producers never interleave on the stream.
#[derive(Clone)]
pub(crate) struct SessionWriter {
    queue: mpsc::UnboundedSender<WriteRequest>,
}

impl SessionWriter {
    /// Enqueue without waiting. Fails once the writer task has exited.
    pub fn submit(&self, request: WriteRequest) -> Result<(), LinkError> {
        self.queue.send(request).map_err(|_| LinkError::NotConnected)
    }
}

pub(crate) struct Session {
    generation: u64,
    cancel: CancellationToken,
    writer: SessionWriter,
}

impl Session {
    pub fn start(
        generation: u64,
        link: OpenedLink,
        sink: EventSinkSlot,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (queue, requests) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            generation,
            link.reader,
            sink,
            reports.clone(),
            cancel.clone(),
        ));
        tokio::spawn(write_loop(
            generation,
            link.writer,
            requests,
            reports,
            cancel.clone(),
        ));

        debug!("Session {} started", generation);
        Self {
            generation,
            cancel,
            writer: SessionWriter { queue },
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn writer(&self) -> &SessionWriter {
        &self.writer
    }

    /// Stop both tasks; they drop their halves, which closes the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    generation: u64,
    mut reader: Box<dyn LinkReader>,
    sink: EventSinkSlot,
    reports: mpsc::UnboundedSender<TaskReport>,
    cancel: CancellationToken,
) {
    let mut buffer = MessageBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];

    info!("Starting to listen for messages...");
    let error = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Reader for session {} cancelled", generation);
                return;
            }
            read = reader.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                if let Some(rest) = buffer.finish() {
                    sink.emit(LinkEvent::Message(rest));
                }
                break LinkError::StreamClosed;
            }
            Ok(n) => match buffer.feed(&chunk[..n]) {
                Ok(messages) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    for message in messages {
                        sink.emit(LinkEvent::Message(message));
                    }
                }
                Err(e) => break e,
            },
            Err(e) => break e,
        }
    };

    if !cancel.is_cancelled() {
        error!("Connection lost during read: {}", error);
        let _ = reports.send(TaskReport::SessionLost { generation, error });
    }
}

async fn write_loop(
    generation: u64,
    mut writer: Box<dyn LinkWriter>,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    reports: mpsc::UnboundedSender<TaskReport>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = writer.write(&request.bytes) => result,
        };

        match result {
            Ok(()) => {
                debug!("Data sent: {}", String::from_utf8_lossy(&request.bytes));
                if let Some(ack) = request.ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(error) => {
                error!("Error sending data: {}", error);
                if let Some(ack) = request.ack {
                    let _ = ack.send(Err(error.clone()));
                }
                if !cancel.is_cancelled() {
                    let _ = reports.send(TaskReport::SessionLost { generation, error });
                }
                break;
            }
        }
    }

    writer.close().await;
    debug!("Writer for session {} stopped", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn write(writer: &SessionWriter, bytes: Vec<u8>) -> Result<(), LinkError> {
        let (ack, done) = oneshot::channel();
        writer.submit(WriteRequest {
            bytes,
            ack: Some(ack),
        })?;
        done.await.unwrap_or(Err(LinkError::NotConnected))
    }

    fn start_session(
        generation: u64,
    ) -> (
        Session,
        tokio::io::DuplexStream,
        mpsc::UnboundedReceiver<LinkEvent>,
        mpsc::UnboundedReceiver<TaskReport>,
    ) {
        let (local, remote) = tokio::io::duplex(256);
        let sink = EventSinkSlot::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        sink.register(Arc::new(events_tx));
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let session = Session::start(
            generation,
            OpenedLink::from_io(None, local),
            sink,
            reports_tx,
        );
        (session, remote, events, reports)
    }

    #[tokio::test]
    async fn test_inbound_messages_are_framed() {
        let (_session, mut remote, mut events, _reports) = start_session(1);

        remote.write_all(b"ARM READY*BASE").await.unwrap();
        remote.write_all(b":90\n").await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::Message("ARM READY".into())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::Message("BASE:90".into())
        );
    }

    #[tokio::test]
    async fn test_concurrent_writes_do_not_interleave() {
        let (session, mut remote, _events, _reports) = start_session(1);
        let writer = session.writer().clone();

        let mut handles = Vec::new();
        for i in 0..8 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                write(&writer, format!("CMD{}*", i).into_bytes()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut received = vec![0u8; 8 * 5];
        remote.read_exact(&mut received).await.unwrap();
        let text = String::from_utf8(received).unwrap();
        let mut commands: Vec<&str> = text.split_terminator('*').collect();
        commands.sort();
        assert_eq!(
            commands,
            vec!["CMD0", "CMD1", "CMD2", "CMD3", "CMD4", "CMD5", "CMD6", "CMD7"]
        );
    }

    #[tokio::test]
    async fn test_remote_close_reports_loss_and_flushes_tail() {
        let (_session, mut remote, mut events, mut reports) = start_session(7);

        remote.write_all(b"DONE*PARTIAL").await.unwrap();
        drop(remote);

        assert_eq!(events.recv().await.unwrap(), LinkEvent::Message("DONE".into()));
        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::Message("PARTIAL".into())
        );
        match reports.recv().await.unwrap() {
            TaskReport::SessionLost { generation, error } => {
                assert_eq!(generation, 7);
                assert_eq!(error, LinkError::StreamClosed);
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_shuts_the_stream() {
        let (session, mut remote, _events, mut reports) = start_session(1);
        session.close();

        let mut buf = [0u8; 8];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
        assert!(write(session.writer(), b"X".to_vec()).await.is_err());
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_failure_reports_loss() {
        let sink = EventSinkSlot::new();
        let (reports_tx, mut reports) = mpsc::unbounded_channel();
        let session = Session::start(
            4,
            crate::infrastructure::link::testing::broken_writer_link(None),
            sink,
            reports_tx,
        );

        let result = write(session.writer(), b"FORWARD*".to_vec()).await;
        assert!(matches!(result, Err(LinkError::StreamIo(_))));

        match reports.recv().await.unwrap() {
            TaskReport::SessionLost { generation, error } => {
                assert_eq!(generation, 4);
                assert!(matches!(error, LinkError::StreamIo(_)));
            }
            other => panic!("unexpected report: {:?}", other),
        }
        // The reader is still blocked; only the writer reported.
        assert!(reports.try_recv().is_err());
    }
}
