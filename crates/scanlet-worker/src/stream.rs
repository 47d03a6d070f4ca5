//! Serving the worker loop over a byte stream (child process stdio, sockets).

use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use scanlet_bridge::{ContextMessage, HostMessage, JsonCodec};
use tokio::io::{AsyncRead, AsyncWrite, stdin, stdout};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::engine::Engine;
use crate::tracing_layer::ContextTracingLayer;
use crate::worker::{WorkerExit, run_worker};

/// Serve `engine` over a framed byte stream until the worker loop exits.
pub async fn serve_stream<E, R, W>(engine: Arc<E>, reader: R, writer: W) -> io::Result<WorkerExit>
where
    E: Engine,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();
    serve_stream_with(engine, reader, writer, resp_tx, resp_rx).await
}

/// Entry point for a compute context running as a child process.
///
/// Reads host messages from stdin, writes context messages to stdout. When
/// `forward_logs` is set, this process's tracing events are shipped to the host
/// as `ContextMessage::Log` (stdout is the protocol channel, so nothing else may
/// write there).
pub async fn run_stdio<E: Engine>(engine: Arc<E>, forward_logs: bool) -> io::Result<WorkerExit> {
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();

    if forward_logs {
        let layer = ContextTracingLayer::new(resp_tx.clone());
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::warn!("Global tracing subscriber already set; context logs not forwarded");
        }
    }

    serve_stream_with(engine, stdin(), stdout(), resp_tx, resp_rx).await
}

async fn serve_stream_with<E, R, W>(
    engine: Arc<E>,
    reader: R,
    writer: W,
    resp_tx: mpsc::UnboundedSender<ContextMessage>,
    mut resp_rx: mpsc::UnboundedReceiver<ContextMessage>,
) -> io::Result<WorkerExit>
where
    E: Engine,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (req_tx, req_rx) = mpsc::unbounded_channel::<HostMessage>();

    let mut frames = FramedRead::new(reader, JsonCodec::<HostMessage>::new());
    let reader_task = tokio::spawn(async move {
        loop {
            match frames.next().await {
                Some(Ok(msg)) => {
                    if req_tx.send(msg).is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Host channel decode error");
                    break;
                }
                None => {
                    tracing::debug!("Host channel closed");
                    break;
                }
            }
        }
    });

    // The tracing layer may hold a sender clone for the life of the process,
    // so the writer is stopped explicitly and drains whatever is queued.
    let done = CancellationToken::new();
    let writer_done = done.clone();
    let mut sink = FramedWrite::new(writer, JsonCodec::<ContextMessage>::new());
    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                msg = resp_rx.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            tracing::warn!(error = %e, "Failed to write to host channel");
                            return Err(e);
                        }
                    }
                    None => break,
                },
                _ = writer_done.cancelled() => {
                    resp_rx.close();
                    while let Some(msg) = resp_rx.recv().await {
                        sink.send(msg).await?;
                    }
                    break;
                }
            }
        }
        Ok::<(), io::Error>(())
    });

    let exit = run_worker(engine, req_rx, resp_tx).await;
    tracing::info!(?exit, "Worker exiting");

    done.cancel();
    reader_task.abort();
    match writer_task.await {
        Ok(result) => result?,
        Err(e) => return Err(io::Error::other(format!("writer task failed: {e}"))),
    }

    Ok(exit)
}
