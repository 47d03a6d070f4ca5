//! Binary payload marshalling: copy vs transfer.

use std::sync::{Arc, Mutex, PoisonError};

use scanlet_bridge::{Payload, RawImageInfo, WireValue};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::manifest::Arg;

/// How image arguments cross into the compute context.
///
/// Chosen per call. The wire names match the consume-type directive callers
/// already pass around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marshalling {
    /// Duplicate every buffer at dispatch. The caller's buffer stays readable
    /// and later edits to it are not seen by the compute context.
    #[default]
    #[serde(rename = "COPY_IMAGE")]
    Copy,
    /// Move every buffer at dispatch. The caller's [`ImageBuffer`] is detached
    /// before the call future is even returned.
    #[serde(rename = "CONSUME_IMAGE")]
    Transfer,
}

/// A caller-owned image buffer that can be handed off to the compute context.
///
/// Clones share the same storage, so detaching through one clone is visible
/// through all of them, the same way every reference to a transferred
/// buffer goes dead at once.
#[derive(Clone)]
pub struct ImageBuffer {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    raw: Option<RawImageInfo>,
}

impl ImageBuffer {
    /// An encoded image (JPEG, PNG...).
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Some(bytes.into()))),
            raw: None,
        }
    }

    /// Decoded pixels with their geometry.
    pub fn raw(info: RawImageInfo, pixels: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(info),
            ..Self::new(pixels)
        }
    }

    pub fn raw_info(&self) -> Option<RawImageInfo> {
        self.raw
    }

    pub fn is_detached(&self) -> bool {
        self.lock().is_none()
    }

    /// Byte length, or `None` once detached.
    pub fn len(&self) -> Option<usize> {
        self.lock().as_ref().map(Vec::len)
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        self.lock().clone()
    }

    /// Mutate the buffer in place. Returns `None` if it has been detached.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Option<Vec<u8>> {
        self.lock().take()
    }

    fn attach(&self, bytes: Vec<u8>) {
        *self.lock() = Some(bytes);
    }

    fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    fn wire(&self, bytes: Vec<u8>) -> WireValue {
        match self.raw {
            Some(info) => WireValue::RawImage {
                info,
                data: Payload::new(bytes),
            },
            None => WireValue::Bytes(Payload::new(bytes)),
        }
    }
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.len() {
            Some(len) => write!(f, "ImageBuffer({len} bytes)"),
            None => f.write_str("ImageBuffer(detached)"),
        }
    }
}

impl From<Vec<u8>> for ImageBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Wire values for one call, plus the caller buffers they were moved out of.
pub(crate) struct Marshalled {
    wire: Vec<WireValue>,
    moved: Vec<(usize, ImageBuffer)>,
}

impl Marshalled {
    pub fn into_wire(self) -> Vec<WireValue> {
        self.wire
    }

    /// Hand every moved buffer back to its caller. For calls refused after
    /// marshalling.
    pub fn restore(self) {
        let mut wire = self.wire;
        for (position, image) in self.moved {
            if let Some(value) = wire.get_mut(position)
                && let WireValue::Bytes(data) | WireValue::RawImage { data, .. } =
                    std::mem::replace(value, WireValue::null())
            {
                image.attach(data.into_vec());
            }
        }
    }
}

/// Turn checked arguments into wire values.
///
/// All image arguments are checked before any is touched, so a rejected call
/// never leaves some of its buffers transferred.
pub(crate) fn marshal(args: Vec<Arg>, marshalling: Marshalling) -> Result<Marshalled, BridgeError> {
    let images: Vec<(usize, &ImageBuffer)> = args
        .iter()
        .enumerate()
        .filter_map(|(position, arg)| match arg {
            Arg::Image(image) => Some((position, image)),
            _ => None,
        })
        .collect();

    for (index, &(position, image)) in images.iter().enumerate() {
        let Some(len) = image.len() else {
            return Err(BridgeError::BufferDetached { position });
        };
        if let Some(info) = image.raw
            && len < info.required_len()
        {
            return Err(BridgeError::RawImageTooShort {
                position,
                len,
                required: info.required_len(),
            });
        }
        if marshalling == Marshalling::Transfer
            && images[..index]
                .iter()
                .any(|(_, earlier)| earlier.shares_storage(image))
        {
            return Err(BridgeError::BufferAliased { position });
        }
    }

    let mut out = Marshalled {
        wire: Vec::with_capacity(args.len()),
        moved: Vec::new(),
    };
    for (position, arg) in args.into_iter().enumerate() {
        let value = match arg {
            Arg::Value(value) => WireValue::Json(value),
            Arg::Handle(id) | Arg::Release(id) => WireValue::Handle(id),
            Arg::Image(image) => {
                let bytes = match marshalling {
                    Marshalling::Copy => image.to_vec(),
                    Marshalling::Transfer => image.take(),
                };
                // Detached through another clone since the check above.
                let Some(bytes) = bytes else {
                    out.restore();
                    return Err(BridgeError::BufferDetached { position });
                };
                let value = image.wire(bytes);
                if marshalling == Marshalling::Transfer {
                    out.moved.push((position, image));
                }
                value
            }
        };
        out.wire.push(value);
    }
    Ok(out)
}
