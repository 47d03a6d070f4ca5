//! Command proxy: typed entry points that marshal, ticket and dispatch.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use scanlet_bridge::TicketId;
use tokio::sync::oneshot;

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::handle::ObjectId;
use crate::manifest::{Arg, CommandSpec, FromReply};
use crate::payload::Marshalling;
use crate::registry::Reply;

/// A view of a [`Bridge`] that dispatches every call with one marshalling
/// strategy.
///
/// Obtained from [`Bridge::copy_args`] or [`Bridge::transfer_args`]. The
/// per-command methods are generated from the command table.
#[derive(Clone, Copy)]
pub struct CommandProxy<'a> {
    bridge: &'a Bridge,
    marshalling: Marshalling,
}

impl<'a> CommandProxy<'a> {
    pub(crate) fn new(bridge: &'a Bridge, marshalling: Marshalling) -> Self {
        Self {
            bridge,
            marshalling,
        }
    }

    pub fn marshalling(&self) -> Marshalling {
        self.marshalling
    }

    /// Release an engine-resident object, consuming its handle.
    pub fn release<T>(&self, object: ObjectId<T>) -> PendingCall<()> {
        self.release_object(object.erase())
    }

    pub(crate) fn invoke<T: FromReply>(
        &self,
        spec: &'static CommandSpec,
        args: Vec<Arg>,
    ) -> PendingCall<T> {
        match self.bridge.dispatch(spec, args, self.marshalling) {
            Ok((ticket, rx)) => PendingCall::waiting(spec.name, ticket, rx),
            Err(error) => PendingCall::refused(spec.name, error),
        }
    }
}

impl std::fmt::Debug for CommandProxy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProxy")
            .field("bridge", &self.bridge.id())
            .field("marshalling", &self.marshalling)
            .finish()
    }
}

enum CallState {
    /// Refused before dispatch; the error is handed out on first poll.
    Refused(Option<BridgeError>),
    Waiting(oneshot::Receiver<Reply>),
}

/// The eventual result of one dispatched call.
///
/// All side effects of the call (ticket issued, buffers transferred, envelope
/// sent) have already happened when this is returned; awaiting it only
/// collects the outcome. Dropping it does not withdraw the call.
#[must_use = "the call is already dispatched; drop the future only if the outcome is irrelevant"]
pub struct PendingCall<T> {
    command: &'static str,
    ticket: Option<TicketId>,
    state: CallState,
    _reply: PhantomData<fn() -> T>,
}

impl<T> PendingCall<T> {
    pub(crate) fn waiting(command: &'static str, ticket: TicketId, rx: oneshot::Receiver<Reply>) -> Self {
        Self {
            command,
            ticket: Some(ticket),
            state: CallState::Waiting(rx),
            _reply: PhantomData,
        }
    }

    pub(crate) fn refused(command: &'static str, error: BridgeError) -> Self {
        Self {
            command,
            ticket: None,
            state: CallState::Refused(Some(error)),
            _reply: PhantomData,
        }
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Ticket the call was sent under, or `None` if it was refused before
    /// reaching the compute context.
    pub fn ticket(&self) -> Option<TicketId> {
        self.ticket
    }
}

impl<T: FromReply> Future for PendingCall<T> {
    type Output = Result<T, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let command = this.command;
        match &mut this.state {
            CallState::Refused(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                BridgeError::Unusable {
                    reason: format!("{command} future polled after completion"),
                }
            }))),
            CallState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(Ok(value))) => {
                    Poll::Ready(T::from_reply(value).map_err(|got| BridgeError::UnexpectedReply {
                        command,
                        expected: T::RETURNS,
                        got,
                    }))
                }
                Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(error)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Faulted {
                    reason: "bridge dropped before the call settled".to_string(),
                })),
            },
        }
    }
}

impl<T> std::fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("command", &self.command)
            .field("ticket", &self.ticket)
            .finish()
    }
}
