//! scanlet: a crash-fenced RPC bridge to an isolated recognition engine.
//!
//! # Architecture
//!
//! - **bridge**: [`Bridge`] lifecycle, dispatch and the response event loop
//! - **proxy / commands**: typed per-command methods generated from one table
//! - **registry**: ticket issue and settlement
//! - **payload**: copy vs transfer marshalling of [`ImageBuffer`]s
//! - **handle**: typed [`ObjectId`]s for engine-resident objects
//! - **fence**: the one-way healthy to faulted switch
//! - **context**: in-process and child-process compute contexts
//!
//! ```ignore
//! let config = BridgeConfig::from_env(Arc::new(ProcessSpawner::new("scanlet-context")));
//! let bridge = Bridge::connect(&config).await?;
//!
//! let scanner = bridge.copy_args().create_barcode_scanner(json!({})).await?;
//! let frame = ImageBuffer::new(jpeg_bytes);
//! let result = bridge.transfer_args().scan_barcodes(&scanner, &frame).await?;
//! assert!(frame.is_detached());
//!
//! bridge.copy_args().release(scanner).await?;
//! bridge.destroy().await;
//! ```

mod bridge;
pub mod commands;
mod config;
mod context;
mod error;
mod fence;
mod handle;
mod health;
pub mod manifest;
mod payload;
mod proxy;
mod registry;
mod version;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
pub use config::{BridgeConfig, InitOptions};
pub use context::{ContextChannel, ContextSpawner, LocalSpawner, ProcessSpawner};
pub use error::{BridgeError, ConnectError, SpawnError};
pub use handle::{AnyObjectId, ObjectId, kinds};
pub use health::{Health, HealthSnapshot};
pub use manifest::{Arg, ArgKind, CommandSpec, Returns};
pub use payload::{ImageBuffer, Marshalling};
pub use proxy::{CommandProxy, PendingCall};
pub use version::{SCANLET_VERSION, VersionInfo};

pub use scanlet_bridge::{ErrorDescriptor, FailureKind, PixelFormat, RawImageInfo, WireValue};
