//! Compute contexts: where the engine runs, and the channel that reaches it.
//!
//! A [`ContextChannel`] is one logical, ordered, bidirectional message channel
//! plus whatever must be torn down with it. Two shapes are provided:
//! - in-process: the worker loop on a Tokio task ([`ContextChannel::local`])
//! - out-of-process: framed JSON over a byte stream, typically child stdio
//!   ([`ContextChannel::from_stream`], [`ProcessSpawner`])

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use scanlet_bridge::{ContextMessage, HostMessage, JsonCodec};
use scanlet_worker::{Engine, run_worker};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::SpawnError;

/// Host end of the channel to one compute context.
pub struct ContextChannel {
    pub(crate) outbound: mpsc::UnboundedSender<HostMessage>,
    pub(crate) inbound: mpsc::UnboundedReceiver<ContextMessage>,
    pub(crate) teardown: Teardown,
}

impl ContextChannel {
    /// Wrap a caller-provided transport. The compute context must answer
    /// every `Call` with exactly one `Response` carrying the same ticket, and
    /// close its sender (or send `Fatal`) if it dies.
    pub fn new(
        outbound: mpsc::UnboundedSender<HostMessage>,
        inbound: mpsc::UnboundedReceiver<ContextMessage>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            teardown: Teardown::default(),
        }
    }

    /// Run `engine` on a Tokio task in this process.
    ///
    /// Cheapest option, but a panic is the only engine failure it can
    /// contain; an abort inside native code takes the host down with it.
    pub fn local<E: Engine>(engine: Arc<E>) -> Self {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            let exit = run_worker(engine, host_rx, ctx_tx).await;
            tracing::debug!(?exit, "Local compute context exited");
        });
        Self {
            outbound: host_tx,
            inbound: ctx_rx,
            teardown: Teardown {
                tasks: vec![worker],
                child: None,
            },
        }
    }

    /// Speak the framed protocol over a byte stream.
    ///
    /// The stream ending, or a frame that does not decode, reads as the
    /// compute context dying.
    pub fn from_stream<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel::<HostMessage>();
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel::<ContextMessage>();

        // Weak so the inbound side closes as soon as the reader stops.
        let writer_faults = ctx_tx.downgrade();
        let mut sink = FramedWrite::new(writer, JsonCodec::<HostMessage>::new());
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = host_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::error!(error = %e, "Failed to write to compute context");
                    if let Some(tx) = writer_faults.upgrade() {
                        let _ = tx.send(ContextMessage::Fatal {
                            reason: format!("failed to write to compute context: {e}"),
                        });
                    }
                    return;
                }
            }
            tracing::trace!("Host side closed, writer exiting");
        });

        let mut frames = FramedRead::new(reader, JsonCodec::<ContextMessage>::new());
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(msg) => {
                        if ctx_tx.send(msg).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Undecodable frame from compute context");
                        let _ = ctx_tx.send(ContextMessage::Fatal {
                            reason: format!("protocol error from compute context: {e}"),
                        });
                        return;
                    }
                }
            }
            tracing::debug!("Compute context closed its output stream");
        });

        Self {
            outbound: host_tx,
            inbound: ctx_rx,
            teardown: Teardown {
                tasks: vec![writer_task, reader_task],
                child: None,
            },
        }
    }

    /// Tie a child process to this channel so destroying the bridge reaps it.
    pub fn with_child(mut self, child: Child) -> Self {
        self.teardown.child = Some(child);
        self
    }
}

impl std::fmt::Debug for ContextChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextChannel")
            .field("tasks", &self.teardown.tasks.len())
            .field("child", &self.teardown.child.as_ref().and_then(Child::id))
            .finish()
    }
}

/// Everything owned by a compute context besides its channel.
#[derive(Default)]
pub(crate) struct Teardown {
    tasks: Vec<JoinHandle<()>>,
    child: Option<Child>,
}

impl Teardown {
    /// Wait up to `grace` for the context to exit on its own, then kill it.
    pub async fn reap(mut self, grace: Duration) {
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "Compute context process exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for compute context process"),
                Err(_) => {
                    tracing::warn!(?grace, "Compute context did not exit in time, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill compute context process");
                    }
                }
            }
        }

        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                tracing::debug!("Compute context task outlived grace period, aborting");
                abort.abort();
            }
        }
    }

    /// Synchronous teardown for `Drop` paths.
    pub fn abort(mut self) {
        if let Some(child) = self.child.as_mut()
            && let Err(e) = child.start_kill()
        {
            tracing::debug!(error = %e, "Failed to kill compute context process");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Brings up a fresh compute context for a new bridge.
#[async_trait]
pub trait ContextSpawner: Send + Sync {
    async fn spawn(&self) -> Result<ContextChannel, SpawnError>;
}

/// Hosts a shared engine on an in-process task.
pub struct LocalSpawner<E> {
    engine: Arc<E>,
}

impl<E: Engine> LocalSpawner<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E: Engine> ContextSpawner for LocalSpawner<E> {
    async fn spawn(&self) -> Result<ContextChannel, SpawnError> {
        Ok(ContextChannel::local(Arc::clone(&self.engine)))
    }
}

/// Runs the compute context as a child process speaking the framed protocol
/// on stdin/stdout. Its stderr is inherited.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl ContextSpawner for ProcessSpawner {
    async fn spawn(&self) -> Result<ContextChannel, SpawnError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpawnError::Other("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpawnError::Other("child stdout not captured".to_string()))?;

        tracing::info!(
            program = %self.program.display(),
            pid = ?child.id(),
            "Spawned compute context process"
        );
        Ok(ContextChannel::from_stream(stdout, stdin).with_child(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlet_bridge::{CallEnvelope, Outcome, ResponseEnvelope, TicketId, WireValue};
    use scanlet_worker::EngineError;

    struct Nop;

    #[async_trait]
    impl Engine for Nop {
        async fn execute(
            &self,
            _command: &str,
            _args: Vec<WireValue>,
        ) -> Result<WireValue, EngineError> {
            Ok(WireValue::null())
        }
    }

    fn init(ticket: u64) -> HostMessage {
        HostMessage::Call(CallEnvelope {
            ticket: TicketId::new(ticket),
            command: "initialize".to_string(),
            args: vec![],
        })
    }

    #[tokio::test]
    async fn local_channel_round_trip() {
        let mut channel = LocalSpawner::new(Arc::new(Nop)).spawn().await.unwrap();
        channel.outbound.send(init(1)).unwrap();

        assert_eq!(
            channel.inbound.recv().await,
            Some(ContextMessage::Response(ResponseEnvelope::success(
                TicketId::new(1),
                WireValue::null()
            )))
        );
        let ContextChannel {
            outbound, teardown, ..
        } = channel;
        drop(outbound);
        teardown.reap(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stream_channel_talks_to_served_worker() {
        let (host_io, ctx_io) = tokio::io::duplex(64 * 1024);
        let (ctx_read, ctx_write) = tokio::io::split(ctx_io);
        let server = tokio::spawn(scanlet_worker::serve_stream(Arc::new(Nop), ctx_read, ctx_write));

        let (host_read, host_write) = tokio::io::split(host_io);
        let mut channel = ContextChannel::from_stream(host_read, host_write);
        channel.outbound.send(init(5)).unwrap();

        match channel.inbound.recv().await {
            Some(ContextMessage::Response(ResponseEnvelope { ticket, outcome })) => {
                assert_eq!(ticket, TicketId::new(5));
                assert!(matches!(outcome, Outcome::Success { .. }));
            }
            other => panic!("expected response, got {other:?}"),
        }

        channel.outbound.send(HostMessage::Shutdown).unwrap();
        assert_eq!(channel.inbound.recv().await, Some(ContextMessage::ShuttingDown));
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn garbage_on_the_stream_becomes_fatal() {
        use tokio::io::AsyncWriteExt;

        let (host_io, mut ctx_io) = tokio::io::duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_io);
        let mut channel = ContextChannel::from_stream(host_read, host_write);

        let junk = b"not json";
        ctx_io.write_all(&(junk.len() as u32).to_be_bytes()).await.unwrap();
        ctx_io.write_all(junk).await.unwrap();

        match channel.inbound.recv().await {
            Some(ContextMessage::Fatal { reason }) => assert!(reason.contains("protocol error")),
            other => panic!("expected fatal, got {other:?}"),
        }
        assert_eq!(channel.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn stream_eof_closes_inbound() {
        let (host_io, ctx_io) = tokio::io::duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_io);
        let mut channel = ContextChannel::from_stream(host_read, host_write);

        drop(ctx_io);
        assert_eq!(channel.inbound.recv().await, None);
    }
}
