//! The bridge: one compute context, one ticket space, one fault fence.
//!
//! Call path: proxy method -> `Bridge::dispatch` -> channel -> compute
//! context -> event loop -> ticket registry -> caller's [`PendingCall`].
//!
//! The fence and the registry share one mutex, so a call can never be
//! registered into a registry that is being purged.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scanlet_bridge::{CallEnvelope, ContextMessage, HostMessage, LogLevel, ResponseEnvelope, TicketId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::commands;
use crate::config::BridgeConfig;
use crate::context::{ContextChannel, Teardown};
use crate::error::{BridgeError, ConnectError};
use crate::fence::FaultFence;
use crate::handle::HandleLedger;
use crate::health::HealthSnapshot;
use crate::manifest::{Arg, CommandSpec};
use crate::payload::{self, Marshalling};
use crate::proxy::{CommandProxy, PendingCall};
use crate::registry::{Continuation, Reply, TicketRegistry};
use crate::version::VersionInfo;

const CONTEXT_EXITED: &str = "compute context terminated unexpectedly";
const CHANNEL_CLOSED: &str = "channel to compute context closed";
const DESTROYED: &str = "bridge destroyed";
const DROPPED: &str = "bridge dropped";

/// How long [`Bridge::destroy`] waits for the compute context to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct BridgeState {
    fence: FaultFence,
    registry: TicketRegistry,
    /// `None` once faulted.
    outbound: Option<mpsc::UnboundedSender<HostMessage>>,
}

struct Core {
    id: Uuid,
    state: Mutex<BridgeState>,
    handles: HandleLedger,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the fence and reject everything outstanding. Returns how many
    /// calls were purged, or `None` if the fence was already closed.
    fn fault(&self, reason: &str) -> Option<usize> {
        let mut state = self.lock();
        if !state.fence.trip(reason) {
            return None;
        }
        state.outbound = None;
        Some(state.registry.purge_all(&BridgeError::Faulted {
            reason: reason.to_string(),
        }))
    }

    fn fault_and_log(&self, reason: &str) {
        if let Some(purged) = self.fault(reason) {
            tracing::error!(bridge_id = %self.id, %reason, purged, "Compute context faulted, bridge fenced");
        }
    }
}

/// Host-side handle to one isolated compute context.
///
/// Explicitly constructed ([`Bridge::connect`]), used through a
/// [`CommandProxy`], explicitly destroyed ([`Bridge::destroy`]). After a
/// compute context fault the bridge refuses every call; build a new one.
pub struct Bridge {
    core: Arc<Core>,
    teardown: Mutex<Option<Teardown>>,
    event_loop: JoinHandle<()>,
}

impl Bridge {
    /// Spawn a compute context and initialize the engine in it.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, ConnectError> {
        let channel = config.spawner.spawn().await?;
        Self::connect_channel(channel, config).await
    }

    /// Initialize the engine behind an existing channel.
    ///
    /// The bridge is returned only once `initialize` has succeeded, so no
    /// other command can reach the engine before it.
    pub async fn connect_channel(
        channel: ContextChannel,
        config: &BridgeConfig,
    ) -> Result<Self, ConnectError> {
        let bridge = Self::attach(channel);
        let options = serde_json::to_value(&config.init).unwrap_or_default();
        let init = bridge.copy_args().initialize(
            config.license_key.as_deref(),
            config.engine_path.as_deref(),
            config.app_id.as_deref(),
            config.cdn_path.as_deref(),
            options,
        );

        match tokio::time::timeout(config.init_timeout, init).await {
            Ok(Ok(_)) => {
                tracing::info!(bridge_id = %bridge.id(), "Engine initialized");
                Ok(bridge)
            }
            Ok(Err(e)) => {
                tracing::error!(bridge_id = %bridge.id(), error = %e, "Engine initialization failed");
                bridge.destroy().await;
                Err(ConnectError::Initialize(e))
            }
            Err(_) => {
                tracing::error!(
                    bridge_id = %bridge.id(),
                    timeout = ?config.init_timeout,
                    "Engine initialization timed out"
                );
                bridge.destroy().await;
                Err(ConnectError::InitTimeout(config.init_timeout))
            }
        }
    }

    /// Wire up a channel without initializing. Must run inside a Tokio runtime.
    pub(crate) fn attach(channel: ContextChannel) -> Self {
        let ContextChannel {
            outbound,
            inbound,
            teardown,
        } = channel;

        let core = Arc::new(Core {
            id: Uuid::new_v4(),
            state: Mutex::new(BridgeState {
                fence: FaultFence::default(),
                registry: TicketRegistry::default(),
                outbound: Some(outbound),
            }),
            handles: HandleLedger::default(),
        });
        tracing::debug!(bridge_id = %core.id, "Bridge attached");

        let event_loop = tokio::spawn(run_event_loop(Arc::clone(&core), inbound));
        Self {
            core,
            teardown: Mutex::new(Some(teardown)),
            event_loop,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Proxy that copies image arguments, leaving caller buffers attached.
    pub fn copy_args(&self) -> CommandProxy<'_> {
        CommandProxy::new(self, Marshalling::Copy)
    }

    /// Proxy that moves image arguments into the compute context. Every
    /// [`crate::ImageBuffer`] passed through it is detached at dispatch.
    pub fn transfer_args(&self) -> CommandProxy<'_> {
        CommandProxy::new(self, Marshalling::Transfer)
    }

    pub fn proxy(&self, marshalling: Marshalling) -> CommandProxy<'_> {
        CommandProxy::new(self, marshalling)
    }

    /// Call a command by wire name, for callers building calls at runtime.
    /// Arguments are checked against the command table before dispatch.
    pub fn call(
        &self,
        command: &str,
        args: Vec<Arg>,
        marshalling: Marshalling,
    ) -> PendingCall<scanlet_bridge::WireValue> {
        match commands::lookup(command) {
            Some(spec) => self.proxy(marshalling).invoke(spec, args),
            None => PendingCall::refused("<unknown>", BridgeError::UnknownCommand(command.to_string())),
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = self.core.lock();
        HealthSnapshot {
            bridge_id: self.core.id,
            health: state.fence.health(),
            reason: state.fence.reason().map(str::to_string),
            faulted_at: state.fence.faulted_at().map(|at| at.to_rfc3339()),
            in_flight: state.registry.len(),
            live_objects: self.core.handles.live_count(),
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.core.lock().fence.is_faulted()
    }

    /// Bridge version plus the engine's own.
    pub async fn version_info(&self) -> Result<VersionInfo, BridgeError> {
        let engine = self.copy_args().version().await?;
        Ok(VersionInfo::new().with_engine(engine))
    }

    /// Shut the compute context down and fence the bridge.
    ///
    /// Outstanding calls are rejected with [`BridgeError::Faulted`]. Objects
    /// never released are reported and then go down with the context.
    pub async fn destroy(&self) {
        let outbound = self.core.lock().outbound.clone();
        if let Some(outbound) = outbound {
            let _ = outbound.send(HostMessage::Shutdown);
        }

        if let Some(purged) = self.core.fault(DESTROYED) {
            tracing::info!(bridge_id = %self.core.id, purged, "Bridge destroyed");
        }

        let leaked = self.core.handles.live();
        if !leaked.is_empty() {
            tracing::warn!(
                bridge_id = %self.core.id,
                count = leaked.len(),
                objects = ?leaked,
                "Objects were never released"
            );
        }

        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = teardown {
            teardown.reap(SHUTDOWN_GRACE).await;
        }
    }

    pub(crate) fn dispatch(
        &self,
        spec: &'static CommandSpec,
        args: Vec<Arg>,
        marshalling: Marshalling,
    ) -> Result<(TicketId, oneshot::Receiver<Reply>), BridgeError> {
        // Refuse before touching any buffer: a faulted bridge must not
        // detach the caller's images.
        self.core.lock().fence.check()?;
        spec.check_args(&args)?;
        let released = self.check_releases(&args)?;
        let marshalled = payload::marshal(args, marshalling)?;

        let (tx, rx) = oneshot::channel();
        let mut state = self.core.lock();
        if let Err(error) = state.fence.check() {
            drop(state);
            // Fenced while marshalling.
            marshalled.restore();
            return Err(error);
        }
        let ticket = state.registry.issue();
        state.registry.register(
            ticket,
            Continuation::new(spec.name, spec.creates_handle(), tx).releasing(released),
        );

        let envelope = HostMessage::Call(CallEnvelope {
            ticket,
            command: spec.name.to_string(),
            args: marshalled.into_wire(),
        });
        let sent = state
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(envelope).is_ok());
        drop(state);

        if sent {
            tracing::trace!(bridge_id = %self.core.id, %ticket, command = spec.name, ?marshalling, "Dispatched");
        } else {
            // The continuation just registered is purged with the rest.
            self.core.fault_and_log(CHANNEL_CLOSED);
        }
        Ok((ticket, rx))
    }

    /// Ids this call releases. The ledger is only updated once the release
    /// succeeds.
    fn check_releases(&self, args: &[Arg]) -> Result<Vec<String>, BridgeError> {
        let mut released = Vec::new();
        for arg in args {
            let Arg::Release(id) = arg else {
                continue;
            };
            if !self.core.handles.is_live(id) {
                if cfg!(debug_assertions) {
                    return Err(BridgeError::StaleHandle { id: id.clone() });
                }
                tracing::warn!(bridge_id = %self.core.id, object = %id, "Releasing an object that is not live");
            }
            released.push(id.clone());
        }
        Ok(released)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(purged) = self.core.fault(DROPPED) {
            tracing::debug!(bridge_id = %self.core.id, purged, "Bridge dropped without destroy");
        }
        let teardown = self
            .teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = teardown {
            teardown.abort();
        }
        self.event_loop.abort();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.core.id)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

async fn run_event_loop(core: Arc<Core>, mut inbound: mpsc::UnboundedReceiver<ContextMessage>) {
    while let Some(msg) = inbound.recv().await {
        match msg {
            ContextMessage::Response(ResponseEnvelope { ticket, outcome }) => {
                let settled = core.lock().registry.settle(ticket, outcome, &core.handles);
                if !settled {
                    tracing::debug!(bridge_id = %core.id, %ticket, "Dropping response for unknown ticket");
                }
            }
            ContextMessage::Fatal { reason } => {
                core.fault_and_log(&reason);
                return;
            }
            ContextMessage::Log {
                target,
                level,
                message,
            } => emit_context_log(&target, level, &message),
            ContextMessage::ShuttingDown => {
                tracing::debug!(bridge_id = %core.id, "Compute context shutting down");
            }
        }
    }
    core.fault_and_log(CONTEXT_EXITED);
}

fn emit_context_log(source: &str, level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: "scanlet::context", source, "{message}"),
        LogLevel::Debug => tracing::debug!(target: "scanlet::context", source, "{message}"),
        LogLevel::Info => tracing::info!(target: "scanlet::context", source, "{message}"),
        LogLevel::Warn => tracing::warn!(target: "scanlet::context", source, "{message}"),
        LogLevel::Error => tracing::error!(target: "scanlet::context", source, "{message}"),
    }
}
