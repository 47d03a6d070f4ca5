//! Command manifest: operation names, argument shapes and reply shapes.
//!
//! The table itself is generated in `commands.rs`; this module holds the
//! types it is built from and the conversions between Rust values and
//! checked arguments.

use scanlet_bridge::WireValue;
use serde_json::Value;

use crate::error::BridgeError;
use crate::handle::{AnyObjectId, ObjectId};
use crate::payload::ImageBuffer;

/// What sits at one argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Opaque JSON (configuration records, strings, numbers).
    Value,
    /// Binary image payload, subject to the call's [`crate::Marshalling`].
    Image,
    /// Handle to an object that must still be live.
    Handle,
    /// Handle being released by this call.
    Release,
}

/// Shape of a successful reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Value,
    /// A newly created object; recorded as live once the call succeeds.
    Handle,
    Bytes,
    Image,
    Text,
    Nothing,
    Any,
}

/// One row of the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub params: &'static [ArgKind],
    pub returns: Returns,
}

impl CommandSpec {
    pub fn creates_handle(&self) -> bool {
        self.returns == Returns::Handle
    }

    pub fn takes_images(&self) -> bool {
        self.params.contains(&ArgKind::Image)
    }

    pub(crate) fn check_args(&self, args: &[Arg]) -> Result<(), BridgeError> {
        if args.len() != self.params.len() {
            return Err(BridgeError::ArgumentCount {
                command: self.name,
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (position, (arg, expected)) in args.iter().zip(self.params).enumerate() {
            if arg.kind() != *expected {
                return Err(BridgeError::ArgumentKind {
                    command: self.name,
                    position,
                    expected: *expected,
                    got: arg.kind(),
                });
            }
        }
        Ok(())
    }
}

/// A call argument before marshalling.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Image(ImageBuffer),
    Handle(String),
    Release(String),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Value(_) => ArgKind::Value,
            Self::Image(_) => ArgKind::Image,
            Self::Handle(_) => ArgKind::Handle,
            Self::Release(_) => ArgKind::Release,
        }
    }
}

/// Rust values usable as command arguments.
pub trait IntoArg {
    const KIND: ArgKind;
    fn into_arg(self) -> Arg;
}

impl IntoArg for Value {
    const KIND: ArgKind = ArgKind::Value;
    fn into_arg(self) -> Arg {
        Arg::Value(self)
    }
}

impl IntoArg for &str {
    const KIND: ArgKind = ArgKind::Value;
    fn into_arg(self) -> Arg {
        Arg::Value(Value::from(self))
    }
}

impl IntoArg for Option<&str> {
    const KIND: ArgKind = ArgKind::Value;
    fn into_arg(self) -> Arg {
        Arg::Value(self.map(Value::from).unwrap_or(Value::Null))
    }
}

impl IntoArg for u32 {
    const KIND: ArgKind = ArgKind::Value;
    fn into_arg(self) -> Arg {
        Arg::Value(Value::from(self))
    }
}

impl IntoArg for &ImageBuffer {
    const KIND: ArgKind = ArgKind::Image;
    fn into_arg(self) -> Arg {
        Arg::Image(self.clone())
    }
}

impl<T> IntoArg for &ObjectId<T> {
    const KIND: ArgKind = ArgKind::Handle;
    fn into_arg(self) -> Arg {
        Arg::Handle(self.id().to_string())
    }
}

impl IntoArg for AnyObjectId {
    const KIND: ArgKind = ArgKind::Release;
    fn into_arg(self) -> Arg {
        Arg::Release(self.id().to_string())
    }
}

/// Rust values a reply can be decoded into. The error is the kind of wire
/// value actually received.
pub trait FromReply: Sized {
    const RETURNS: Returns;
    fn from_reply(value: WireValue) -> Result<Self, &'static str>;
}

impl FromReply for Value {
    const RETURNS: Returns = Returns::Value;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::Json(value) => Ok(value),
            other => Err(other.kind()),
        }
    }
}

impl FromReply for () {
    const RETURNS: Returns = Returns::Nothing;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::Json(_) => Ok(()),
            other => Err(other.kind()),
        }
    }
}

impl FromReply for String {
    const RETURNS: Returns = Returns::Text;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::Json(Value::String(text)) => Ok(text),
            WireValue::Json(_) => Err("non-string json"),
            other => Err(other.kind()),
        }
    }
}

impl FromReply for Vec<u8> {
    const RETURNS: Returns = Returns::Bytes;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::Bytes(payload) => Ok(payload.into_vec()),
            other => Err(other.kind()),
        }
    }
}

impl FromReply for ImageBuffer {
    const RETURNS: Returns = Returns::Image;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::RawImage { info, data } => Ok(ImageBuffer::raw(info, data.into_vec())),
            WireValue::Bytes(payload) => Ok(ImageBuffer::new(payload.into_vec())),
            other => Err(other.kind()),
        }
    }
}

impl<T> FromReply for ObjectId<T> {
    const RETURNS: Returns = Returns::Handle;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        match value {
            WireValue::Handle(id) => Ok(ObjectId::from_raw(id)),
            other => Err(other.kind()),
        }
    }
}

impl FromReply for WireValue {
    const RETURNS: Returns = Returns::Any;
    fn from_reply(value: WireValue) -> Result<Self, &'static str> {
        Ok(value)
    }
}
