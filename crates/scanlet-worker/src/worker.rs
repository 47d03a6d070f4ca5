//! Worker loop - runs inside the compute context.
//!
//! The host side (ticketing, fencing) lives in the `scanlet` crate. This loop
//! only executes commands in arrival order and reports outcomes:
//! - per-call failures become `Outcome::Failure` on that ticket
//! - engine faults and panics become `ContextMessage::Fatal`, then the loop exits

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use scanlet_bridge::{
    CallEnvelope, ContextMessage, ErrorDescriptor, FailureKind, HostMessage, INITIALIZE,
    ResponseEnvelope,
};
use tokio::sync::mpsc;

use crate::engine::{Engine, EngineError};

/// Why the worker loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Host asked for shutdown.
    Shutdown,
    /// Host side of the channel went away.
    Disconnected,
    /// Engine fault; `Fatal` has already been sent.
    Fatal(String),
}

/// Run the worker event loop until shutdown, disconnect or fatal fault.
///
/// Commands are executed one at a time; the engine is never entered
/// concurrently from here.
pub async fn run_worker<E: Engine>(
    engine: Arc<E>,
    mut requests: mpsc::UnboundedReceiver<HostMessage>,
    responses: mpsc::UnboundedSender<ContextMessage>,
) -> WorkerExit {
    let mut initialized = false;

    loop {
        let call = match requests.recv().await {
            Some(HostMessage::Call(call)) => call,
            Some(HostMessage::Shutdown) => {
                tracing::info!("Shutdown requested");
                let _ = responses.send(ContextMessage::ShuttingDown);
                return WorkerExit::Shutdown;
            }
            None => {
                tracing::info!("Request channel closed (host gone?), exiting");
                return WorkerExit::Disconnected;
            }
        };

        let CallEnvelope {
            ticket,
            command,
            args,
        } = call;

        if !initialized && command != INITIALIZE {
            tracing::warn!(%ticket, %command, "Command received before initialization");
            let error = ErrorDescriptor::new(
                FailureKind::NotInitialized,
                format!("{command} called before initialize completed"),
            );
            if responses
                .send(ContextMessage::Response(ResponseEnvelope::failure(
                    ticket, error,
                )))
                .is_err()
            {
                return WorkerExit::Disconnected;
            }
            continue;
        }

        tracing::trace!(%ticket, %command, "Executing command");
        let result = AssertUnwindSafe(engine.execute(&command, args))
            .catch_unwind()
            .await;

        let response = match result {
            Ok(Ok(value)) => {
                if command == INITIALIZE && !initialized {
                    tracing::info!("Engine initialized");
                    initialized = true;
                }
                ResponseEnvelope::success(ticket, value)
            }
            Ok(Err(EngineError::Failed(error))) => {
                tracing::debug!(%ticket, %command, %error, "Command failed");
                ResponseEnvelope::failure(ticket, error)
            }
            Ok(Err(EngineError::Fatal(reason))) => {
                tracing::error!(%ticket, %command, %reason, "Engine fault");
                return fatal(&responses, reason);
            }
            Err(panic) => {
                let reason = format!(
                    "engine panicked while executing {command}: {}",
                    panic_message(panic.as_ref())
                );
                tracing::error!(%ticket, %reason, "Engine panic");
                return fatal(&responses, reason);
            }
        };

        if responses.send(ContextMessage::Response(response)).is_err() {
            tracing::warn!(%ticket, "Response channel closed, exiting");
            return WorkerExit::Disconnected;
        }
    }
}

fn fatal(responses: &mpsc::UnboundedSender<ContextMessage>, reason: String) -> WorkerExit {
    let _ = responses.send(ContextMessage::Fatal {
        reason: reason.clone(),
    });
    WorkerExit::Fatal(reason)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
