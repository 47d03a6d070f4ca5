//! The seam between the worker loop and the native recognition engine.

use scanlet_bridge::{ErrorDescriptor, FailureKind, WireValue};

/// How a command can fail inside the compute context.
///
/// The split is decided by the engine at the point of failure and never
/// inferred afterwards: `Failed` settles one ticket, `Fatal` tears down the
/// whole context and every call in flight with it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The command ran and failed for a reason specific to this call.
    #[error("{0}")]
    Failed(ErrorDescriptor),

    /// The engine can no longer be trusted (native abort, corrupted state).
    #[error("engine fault: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed(ErrorDescriptor::new(kind, message))
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Command implementations hosted by the compute context.
///
/// Objects created by the engine (scanners, PDF contexts...) live in the
/// engine's own memory and are returned as `WireValue::Handle`. The engine is
/// responsible for rejecting unknown or released handles with
/// `FailureKind::UnknownObject`.
#[async_trait::async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Run one command. `initialize` arrives through here too, always first.
    async fn execute(&self, command: &str, args: Vec<WireValue>)
    -> Result<WireValue, EngineError>;
}
