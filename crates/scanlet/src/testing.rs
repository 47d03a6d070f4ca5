//! Test doubles: a scripted engine and a hand-driven compute context.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use scanlet_bridge::{
    CallEnvelope, ContextMessage, ErrorDescriptor, FailureKind, HostMessage, Payload,
    ResponseEnvelope, TicketId, WireValue,
};
use scanlet_worker::{Engine, EngineError};
use serde_json::json;
use tokio::sync::mpsc;

use crate::commands;
use crate::context::ContextChannel;

/// Engine that keeps an object table and records what it was sent.
///
/// - creating commands mint `obj-N` handles
/// - handle arguments must name live objects (`UnknownObject` otherwise)
/// - other commands echo the command name and the image bytes they saw
/// - `__callModuleFunction("abort")` is a fatal fault, `("panic")` panics
/// - `initialize` with license `"expired"` fails
#[derive(Default)]
pub(crate) struct MockEngine {
    next_object: AtomicU64,
    objects: Mutex<HashMap<String, String>>,
    received: Mutex<Vec<(String, Vec<WireValue>)>>,
}

impl MockEngine {
    pub fn live_objects(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn received(&self, command: &str) -> Vec<Vec<WireValue>> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Engine for MockEngine {
    async fn execute(&self, command: &str, args: Vec<WireValue>) -> Result<WireValue, EngineError> {
        self.received
            .lock()
            .unwrap()
            .push((command.to_string(), args.clone()));

        match command {
            "initialize" => {
                if args.first() == Some(&WireValue::Json(json!("expired"))) {
                    return Err(EngineError::failed(FailureKind::Engine, "license expired"));
                }
                return Ok(WireValue::null());
            }
            "version" => return Ok(WireValue::Json(json!("7.1.0"))),
            "releaseObject" => {
                let Some(WireValue::Handle(id)) = args.first() else {
                    return Err(EngineError::failed(FailureKind::InvalidArgument, "no handle"));
                };
                return match self.objects.lock().unwrap().remove(id) {
                    Some(_) => Ok(WireValue::null()),
                    None => Err(EngineError::failed(
                        FailureKind::UnknownObject,
                        format!("no object {id}"),
                    )),
                };
            }
            "__callModuleFunction" => match args.first() {
                Some(WireValue::Json(name)) if name == "abort" => {
                    return Err(EngineError::fatal("native module aborted"));
                }
                Some(WireValue::Json(name)) if name == "panic" => panic!("engine blew up"),
                _ => {}
            },
            _ => {}
        }

        let Some(spec) = commands::lookup(command) else {
            return Err(EngineError::failed(
                FailureKind::UnknownCommand,
                format!("no command {command}"),
            ));
        };

        if spec.creates_handle() {
            let id = format!("obj-{}", self.next_object.fetch_add(1, Ordering::Relaxed) + 1);
            self.objects
                .lock()
                .unwrap()
                .insert(id.clone(), command.to_string());
            return Ok(WireValue::Handle(id));
        }

        let mut image_bytes = 0;
        for arg in &args {
            match arg {
                WireValue::Handle(id) if !self.objects.lock().unwrap().contains_key(id) => {
                    return Err(EngineError::failed(
                        FailureKind::UnknownObject,
                        format!("no object {id}"),
                    ));
                }
                WireValue::Bytes(data) | WireValue::RawImage { data, .. } => {
                    image_bytes += data.len();
                }
                _ => {}
            }
        }

        match spec.returns {
            crate::manifest::Returns::Bytes => Ok(WireValue::Bytes(Payload::from(vec![0xFF, 0xD8]))),
            crate::manifest::Returns::Image => Ok(args
                .into_iter()
                .find(|arg| matches!(arg, WireValue::Bytes(_) | WireValue::RawImage { .. }))
                .unwrap_or_else(WireValue::null)),
            _ => Ok(WireValue::Json(
                json!({ "command": command, "image_bytes": image_bytes }),
            )),
        }
    }
}

/// The far end of a [`ContextChannel`], driven by the test.
pub(crate) struct ManualContext {
    requests: mpsc::UnboundedReceiver<HostMessage>,
    responses: mpsc::UnboundedSender<ContextMessage>,
}

impl ManualContext {
    pub fn pair() -> (ContextChannel, Self) {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel();
        (
            ContextChannel::new(host_tx, ctx_rx),
            Self {
                requests: host_rx,
                responses: ctx_tx,
            },
        )
    }

    pub async fn next_call(&mut self) -> CallEnvelope {
        match self.requests.recv().await {
            Some(HostMessage::Call(call)) => call,
            other => panic!("expected call, got {other:?}"),
        }
    }

    pub async fn next_message(&mut self) -> Option<HostMessage> {
        self.requests.recv().await
    }

    pub fn reply(&self, ticket: TicketId, value: WireValue) {
        self.send(ContextMessage::Response(ResponseEnvelope::success(ticket, value)));
    }

    pub fn fail(&self, ticket: TicketId, kind: FailureKind, message: &str) {
        self.send(ContextMessage::Response(ResponseEnvelope::failure(
            ticket,
            ErrorDescriptor::new(kind, message),
        )));
    }

    pub fn fatal(&self, reason: &str) {
        self.send(ContextMessage::Fatal {
            reason: reason.to_string(),
        });
    }

    pub fn send(&self, msg: ContextMessage) {
        self.responses.send(msg).unwrap();
    }

    /// Like `send`, for when the bridge may already have stopped listening.
    pub fn try_send(&self, msg: ContextMessage) -> bool {
        self.responses.send(msg).is_ok()
    }
}
