//! scanlet-worker: the compute-context side of the scanlet bridge.
//!
//! Hosts an [`Engine`] behind the ticketed channel. The same loop serves an
//! in-process task ([`run_worker`]) and a child process speaking framed JSON
//! over stdio ([`run_stdio`], [`serve_stream`]).

mod engine;
mod stream;
mod tracing_layer;
mod worker;

pub use engine::{Engine, EngineError};
pub use stream::{run_stdio, serve_stream};
pub use tracing_layer::ContextTracingLayer;
pub use worker::{WorkerExit, run_worker};
