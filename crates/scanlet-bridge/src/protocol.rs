//! Wire protocol types for host <-> compute context communication.
//!
//! A single logical channel carries everything:
//! - **Host -> context**: `HostMessage` (Call envelopes, Shutdown)
//! - **Context -> host**: `ContextMessage` (Response envelopes, Fatal, Log, ShuttingDown)
//!
//! Every call is tagged with a `TicketId`; responses may come back in any order
//! and are matched to their caller by ticket alone.

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// Name of the command that must succeed before any other command is accepted.
pub const INITIALIZE: &str = "initialize";

/// Correlation identifier for one in-flight call.
///
/// Issued monotonically per bridge instance and never reused, so a late
/// response for a purged ticket can never be mistaken for a newer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(u64);

impl TicketId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel layout of a raw (decoded) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    Bgr,
    Bgra,
    Gray,
}

impl PixelFormat {
    pub fn channels(&self) -> u32 {
        match self {
            Self::Bgr => 3,
            Self::Bgra => 4,
            Self::Gray => 1,
        }
    }
}

/// Geometry of a raw image; the pixels travel separately as a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row, including padding.
    pub step: u32,
}

impl RawImageInfo {
    /// Geometry with no row padding. `None` if a row does not fit in `u32`.
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Option<Self> {
        Some(Self {
            width,
            height,
            format,
            step: width.checked_mul(format.channels())?,
        })
    }

    /// Minimum number of bytes the pixel payload must hold.
    pub fn required_len(&self) -> usize {
        (self.step as usize).saturating_mul(self.height as usize)
    }
}

/// A marshalled argument or result value.
///
/// Configuration records are opaque JSON and pass through unchanged. Binary
/// payloads and object handles get their own variants so neither side has to
/// sniff JSON to find them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Json(serde_json::Value),
    Bytes(Payload),
    RawImage { info: RawImageInfo, data: Payload },
    /// Identifier of an object resident in the compute context.
    Handle(String),
}

impl WireValue {
    pub fn null() -> Self {
        Self::Json(serde_json::Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
            Self::RawImage { .. } => "raw_image",
            Self::Handle(_) => "handle",
        }
    }
}

impl From<serde_json::Value> for WireValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// One command on its way to the compute context. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub ticket: TicketId,
    pub command: String,
    pub args: Vec<WireValue>,
}

/// The compute context's answer to exactly one `CallEnvelope`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ticket: TicketId,
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    pub fn success(ticket: TicketId, value: WireValue) -> Self {
        Self {
            ticket,
            outcome: Outcome::Success { value },
        }
    }

    pub fn failure(ticket: TicketId, error: ErrorDescriptor) -> Self {
        Self {
            ticket,
            outcome: Outcome::Failure { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { value: WireValue },
    /// Per-call failure. Never affects the health of the bridge.
    Failure { error: ErrorDescriptor },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Why a single command failed inside the compute context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Command received before `initialize` completed.
    NotInitialized,
    UnknownCommand,
    InvalidArgument,
    /// Handle does not name a live object (never created, or already released).
    UnknownObject,
    Unsupported,
    /// The engine ran the command and reported an error as its result.
    Engine,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotInitialized => "not_initialized",
            Self::UnknownCommand => "unknown_command",
            Self::InvalidArgument => "invalid_argument",
            Self::UnknownObject => "unknown_object",
            Self::Unsupported => "unsupported",
            Self::Engine => "engine",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ErrorDescriptor {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Messages from host to compute context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Call(CallEnvelope),
    Shutdown,
}

/// Messages from compute context to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextMessage {
    Response(ResponseEnvelope),

    /// Unrecoverable failure not attributable to any ticket. The context stops
    /// processing immediately after sending this.
    Fatal {
        reason: String,
    },

    /// Structured log line from inside the compute context.
    Log {
        target: String,
        level: LogLevel,
        message: String,
    },

    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}
