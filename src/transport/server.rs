//! Local-socket listener that connects worker processes to a [`LeaderHub`].
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Each connection must open with a `hello`
//! frame naming the worker and this leader; after that the connection
//! carries `command`/`shutdown` frames out and `status` frames in.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::{decode_frame, encode_frame, FrameCodec};
use super::{LeaderFrame, LeaderHub, WorkerFrame};
use crate::{AppError, Result};

/// Spawn the listener task for `hub` on `endpoint`.
///
/// # Errors
///
/// Returns `AppError::Transport` if the endpoint name is invalid or the
/// listener cannot be created.
pub fn spawn_hub_server(
    hub: Arc<LeaderHub>,
    endpoint: &str,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = endpoint.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Transport(format!("invalid endpoint name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Transport(format!("failed to create listener: {err}")))?;

    info!(endpoint = %name, leader = hub.leader(), "leader hub listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("hub_server", endpoint = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("leader hub shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let (reader, writer) = stream.split();
                                tokio::spawn(serve_connection(
                                    Arc::clone(&hub),
                                    reader,
                                    writer,
                                    ct.child_token(),
                                ));
                            }
                            Err(err) => {
                                warn!(%err, "hub accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Serve one worker connection until it closes or `ct` fires.
///
/// Generic over the stream halves so tests can drive it with in-memory
/// duplex pipes.
pub async fn serve_connection<R, W>(hub: Arc<LeaderHub>, reader: R, writer: W, ct: CancellationToken)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, FrameCodec::new());

    let (worker, count_id) = match frames.next().await {
        Some(Ok(line)) => match decode_frame::<WorkerFrame>(&line) {
            Ok(WorkerFrame::Hello {
                worker,
                leader,
                count_id,
            }) => {
                if leader != hub.leader() {
                    warn!(
                        worker,
                        leader,
                        expected = hub.leader(),
                        "worker asked for another leader, closing"
                    );
                    return;
                }
                (worker, count_id)
            }
            Ok(other) => {
                warn!(?other, "first frame was not a hello, closing");
                return;
            }
            Err(err) => {
                warn!(%err, "malformed hello, closing");
                return;
            }
        },
        Some(Err(err)) => {
            warn!(%err, "connection failed before hello");
            return;
        }
        None => {
            debug!("connection closed before hello");
            return;
        }
    };

    let span = info_span!("hub_conn", worker = %worker, count_id);
    async move {
        let attachment = hub.attach(&worker);
        let connection = attachment.connection;
        let writer_task = tokio::spawn(
            write_frames(writer, attachment.rx, ct.clone()).instrument(tracing::Span::current()),
        );
        let reporter = hub.status_reporter();

        loop {
            tokio::select! {
                () = ct.cancelled() => break,
                item = frames.next() => match item {
                    None => {
                        debug!("worker closed connection");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "worker connection read failed");
                        break;
                    }
                    Some(Ok(line)) => match decode_frame::<WorkerFrame>(&line) {
                        Ok(WorkerFrame::Status(report)) => {
                            if report.worker == worker {
                                reporter.report(report);
                            } else {
                                warn!(claimed = report.worker, "status for another worker ignored");
                            }
                        }
                        Ok(WorkerFrame::Hello { .. }) => {
                            debug!("repeated hello ignored");
                        }
                        Err(err) => {
                            warn!(%err, "malformed worker frame skipped");
                        }
                    },
                }
            }
        }

        hub.detach(&worker, connection);
        writer_task.abort();
    }
    .instrument(span)
    .await;
}

async fn write_frames<W>(writer: W, mut rx: mpsc::Receiver<LeaderFrame>, ct: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, FrameCodec::new());
    loop {
        tokio::select! {
            biased;
            () = ct.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    debug!("worker route closed, writer stopping");
                    break;
                };
                let line = match encode_frame(&frame) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(%err, "failed to encode leader frame");
                        continue;
                    }
                };
                if let Err(err) = sink.send(line).await {
                    warn!(%err, "write to worker failed");
                    break;
                }
            }
        }
    }
}
