//! Wire protocol for scanlet host <-> compute context communication.
//!
//! # Architecture
//!
//! - **protocol**: Envelope and message types (HostMessage, ContextMessage)
//! - **payload**: Binary payload wrapper (moved in-process, base64 on the wire)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite

pub mod codec;
pub mod payload;
pub mod protocol;

pub use codec::JsonCodec;
pub use payload::Payload;
pub use protocol::{
    CallEnvelope, ContextMessage, ErrorDescriptor, FailureKind, HostMessage, INITIALIZE,
    LogLevel, Outcome, PixelFormat, RawImageInfo, ResponseEnvelope, TicketId, WireValue,
};
