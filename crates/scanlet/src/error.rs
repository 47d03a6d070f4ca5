//! Errors surfaced to callers of the bridge.

use std::time::Duration;

use scanlet_bridge::ErrorDescriptor;

use crate::manifest::{ArgKind, Returns};

/// Outcome of a failed call.
///
/// Three families, with different remedies:
/// - `Command` and the local validation errors: this call failed, the bridge is fine.
/// - `Faulted`: the compute context died while this call was in flight.
/// - `Unusable`: the bridge was already faulted when the call was made.
///
/// For the last two the only recovery is constructing a new bridge;
/// [`BridgeError::is_fatal`] tells them apart from the rest.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The compute context executed the command and it failed.
    #[error("{command} failed: {error}")]
    Command {
        command: String,
        error: ErrorDescriptor,
    },

    /// Outstanding call rejected because the compute context faulted.
    #[error("compute context faulted: {reason}")]
    Faulted { reason: String },

    /// Call refused at dispatch because the bridge is fenced off.
    #[error("bridge is unusable after a fault ({reason}); construct a new bridge")]
    Unusable { reason: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} takes {expected} argument(s), got {got}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{command}: argument {position} must be {expected:?}, got {got:?}")]
    ArgumentKind {
        command: &'static str,
        position: usize,
        expected: ArgKind,
        got: ArgKind,
    },

    /// The image buffer was already transferred by an earlier call.
    #[error("image argument {position} has been transferred and can no longer be read")]
    BufferDetached { position: usize },

    /// The same buffer appears twice in one transferring call.
    #[error("image argument {position} shares its buffer with an earlier argument and cannot be transferred twice")]
    BufferAliased { position: usize },

    #[error("raw image argument {position} holds {len} bytes, its geometry needs {required}")]
    RawImageTooShort {
        position: usize,
        len: usize,
        required: usize,
    },

    /// Release of an object this bridge does not consider live.
    #[error("object {id} was already released or was never created by this bridge")]
    StaleHandle { id: String },

    #[error("{command} returned {got}, expected {expected:?}")]
    UnexpectedReply {
        command: &'static str,
        expected: Returns,
        got: &'static str,
    },
}

impl BridgeError {
    /// True when the whole engine is gone, as opposed to this one call failing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Faulted { .. } | Self::Unusable { .. })
    }

    /// The compute context's error, if it executed the command.
    pub fn descriptor(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Command { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failure to bring up a compute context.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn compute context: {0}")]
    Io(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Failure of [`crate::Bridge::connect`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("engine initialization failed: {0}")]
    Initialize(BridgeError),
    #[error("engine initialization timed out after {0:?}")]
    InitTimeout(Duration),
}
