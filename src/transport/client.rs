//! Worker side of the local-socket connection.

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::GenericNamespaced;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info_span, warn, Instrument};

use super::codec::{decode_frame, encode_frame, FrameCodec};
use super::{LeaderFrame, StatusReporter, WorkerFrame, WorkerLink};
use crate::models::status::StatusReport;
use crate::{AppError, Result};

const INBOUND_DEPTH: usize = 32;
const OUTBOUND_DEPTH: usize = 64;

/// Greeting a worker sends when it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Worker name.
    pub worker: String,
    /// Leader the worker serves.
    pub leader: String,
    /// Identifying count of the process.
    pub count_id: u32,
}

/// Connect to the leader listening on `endpoint`.
///
/// # Errors
///
/// Returns `AppError::Connection` if the endpoint is invalid or refuses the
/// connection, or if the hello frame cannot be written.
pub async fn connect(endpoint: &str, hello: Hello) -> Result<WorkerLink> {
    let name = endpoint
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Connection(format!("invalid endpoint '{endpoint}': {err}")))?;
    let stream = Stream::connect(name)
        .await
        .map_err(|err| AppError::Connection(format!("leader at '{endpoint}' refused: {err}")))?;
    let (reader, writer) = stream.split();
    bridge(reader, writer, hello).await
}

/// Send `hello` over `writer`, then pump frames between the stream halves
/// and a [`WorkerLink`].
///
/// The link's inbound channel closes when the leader side of the stream
/// does.
///
/// # Errors
///
/// Returns `AppError::Connection` if the hello frame cannot be written.
pub async fn bridge<R, W>(reader: R, writer: W, hello: Hello) -> Result<WorkerLink>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(writer, FrameCodec::new());
    let worker = hello.worker.clone();
    let greeting = encode_frame(&WorkerFrame::Hello {
        worker: hello.worker,
        leader: hello.leader,
        count_id: hello.count_id,
    })?;
    sink.send(greeting)
        .await
        .map_err(|err| AppError::Connection(format!("hello failed: {err}")))?;

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_DEPTH);
    let (status_tx, status_rx) = mpsc::channel(OUTBOUND_DEPTH);

    let span = info_span!("leader_link", worker = %worker);
    tokio::spawn(read_frames(reader, inbound_tx).instrument(span.clone()));
    tokio::spawn(write_reports(sink, status_rx).instrument(span));

    Ok(WorkerLink {
        inbound: inbound_rx,
        reporter: StatusReporter::new(status_tx),
    })
}

async fn read_frames<R>(reader: R, tx: mpsc::Sender<LeaderFrame>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, FrameCodec::new());
    while let Some(item) = frames.next().await {
        match item {
            Ok(line) => match decode_frame::<LeaderFrame>(&line) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        debug!("worker stopped listening to the leader");
                        return;
                    }
                }
                Err(err) => warn!(%err, "malformed leader frame skipped"),
            },
            Err(err) => {
                warn!(%err, "leader connection read failed");
                return;
            }
        }
    }
    debug!("leader closed connection");
}

async fn write_reports<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::Receiver<StatusReport>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(report) = rx.recv().await {
        let line = match encode_frame(&WorkerFrame::Status(report)) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to encode status report");
                continue;
            }
        };
        if let Err(err) = sink.send(line).await {
            warn!(%err, "status write failed");
            return;
        }
    }
}
