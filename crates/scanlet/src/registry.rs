//! Ticket registry: correlates responses with the callers waiting on them.

use std::collections::HashMap;

use scanlet_bridge::{Outcome, TicketId, WireValue};
use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::handle::HandleLedger;

pub(crate) type Reply = Result<WireValue, BridgeError>;

/// The resolve/reject side of one dispatched call.
pub(crate) struct Continuation {
    command: &'static str,
    creates_handle: bool,
    releases: Vec<String>,
    tx: oneshot::Sender<Reply>,
}

impl Continuation {
    pub fn new(command: &'static str, creates_handle: bool, tx: oneshot::Sender<Reply>) -> Self {
        Self {
            command,
            creates_handle,
            releases: Vec::new(),
            tx,
        }
    }

    /// Handles this call releases; they leave the ledger only if it succeeds.
    pub fn releasing(mut self, ids: Vec<String>) -> Self {
        self.releases = ids;
        self
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Deliver the outcome. The ledger is updated before the caller can
    /// observe it.
    fn complete(self, outcome: Outcome, handles: &HandleLedger) {
        let reply = match outcome {
            Outcome::Success { value } => {
                if self.creates_handle
                    && let WireValue::Handle(id) = &value
                {
                    handles.record(id, self.command);
                }
                for id in &self.releases {
                    handles.release(id);
                }
                Ok(value)
            }
            Outcome::Failure { error } => Err(BridgeError::Command {
                command: self.command.to_string(),
                error,
            }),
        };
        // Receiver gone means the caller stopped waiting; nothing to do.
        let _ = self.tx.send(reply);
    }

    fn reject(self, error: BridgeError) {
        let _ = self.tx.send(Err(error));
    }
}

#[derive(Default)]
pub(crate) struct TicketRegistry {
    next_ticket: u64,
    pending: HashMap<TicketId, Continuation>,
}

impl TicketRegistry {
    /// Tickets are never reused within one registry.
    pub fn issue(&mut self) -> TicketId {
        self.next_ticket += 1;
        TicketId::new(self.next_ticket)
    }

    pub fn register(&mut self, ticket: TicketId, continuation: Continuation) {
        let previous = self.pending.insert(ticket, continuation);
        debug_assert!(previous.is_none(), "ticket {ticket} registered twice");
    }

    /// Settle `ticket` with `outcome`. Returns false when nothing was waiting
    /// (already purged, or never issued), which is not an error.
    pub fn settle(&mut self, ticket: TicketId, outcome: Outcome, handles: &HandleLedger) -> bool {
        match self.pending.remove(&ticket) {
            Some(continuation) => {
                continuation.complete(outcome, handles);
                true
            }
            None => false,
        }
    }

    /// Reject every outstanding call with `error`. Returns how many were purged.
    pub fn purge_all(&mut self, error: &BridgeError) -> usize {
        let count = self.pending.len();
        for (ticket, continuation) in self.pending.drain() {
            tracing::debug!(%ticket, command = continuation.command(), "Rejecting outstanding call");
            continuation.reject(error.clone());
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlet_bridge::{ErrorDescriptor, FailureKind};
    use serde_json::json;

    fn register(
        registry: &mut TicketRegistry,
        command: &'static str,
        creates_handle: bool,
    ) -> (TicketId, oneshot::Receiver<Reply>) {
        let ticket = registry.issue();
        let (tx, rx) = oneshot::channel();
        registry.register(ticket, Continuation::new(command, creates_handle, tx));
        (ticket, rx)
    }

    #[test]
    fn issue_is_monotonic_and_unique() {
        let mut registry = TicketRegistry::default();
        let tickets: Vec<_> = (0..100).map(|_| registry.issue()).collect();
        assert!(tickets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn settle_routes_to_matching_continuation() {
        let mut registry = TicketRegistry::default();
        let handles = HandleLedger::default();
        let (a, mut rx_a) = register(&mut registry, "version", false);
        let (b, mut rx_b) = register(&mut registry, "getLicenseInfo", false);

        assert!(registry.settle(
            b,
            Outcome::Success {
                value: WireValue::Json(json!("b"))
            },
            &handles
        ));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Ok(WireValue::Json(json!("b"))));

        assert!(registry.settle(
            a,
            Outcome::Success {
                value: WireValue::Json(json!("a"))
            },
            &handles
        ));
        assert_eq!(rx_a.try_recv().unwrap(), Ok(WireValue::Json(json!("a"))));
        assert!(registry.is_empty());
    }

    #[test]
    fn failure_outcome_rejects_with_command_error() {
        let mut registry = TicketRegistry::default();
        let (ticket, mut rx) = register(&mut registry, "scanMRZ", false);

        let error = ErrorDescriptor::new(FailureKind::Engine, "no MRZ");
        registry.settle(
            ticket,
            Outcome::Failure {
                error: error.clone(),
            },
            &HandleLedger::default(),
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            Err(BridgeError::Command {
                command: "scanMRZ".to_string(),
                error
            })
        );
    }

    #[test]
    fn settling_unknown_ticket_is_silently_dropped() {
        let mut registry = TicketRegistry::default();
        let (_ticket, mut rx) = register(&mut registry, "version", false);

        let stray = TicketId::new(999);
        assert!(!registry.settle(
            stray,
            Outcome::Success {
                value: WireValue::null()
            },
            &HandleLedger::default()
        ));
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn settling_twice_only_delivers_once() {
        let mut registry = TicketRegistry::default();
        let handles = HandleLedger::default();
        let (ticket, mut rx) = register(&mut registry, "version", false);

        let ok = Outcome::Success {
            value: WireValue::null(),
        };
        assert!(registry.settle(ticket, ok.clone(), &handles));
        assert!(!registry.settle(ticket, ok, &handles));
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn purge_rejects_everything_and_clears() {
        let mut registry = TicketRegistry::default();
        let mut receivers: Vec<_> = (0..5)
            .map(|_| register(&mut registry, "scanBarcodes", false).1)
            .collect();

        let error = BridgeError::Faulted {
            reason: "worker crashed".to_string(),
        };
        assert_eq!(registry.purge_all(&error), 5);
        assert!(registry.is_empty());
        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), Err(error.clone()));
        }
    }

    #[test]
    fn successful_create_records_handle() {
        let mut registry = TicketRegistry::default();
        let handles = HandleLedger::default();
        let (ticket, _rx) = register(&mut registry, "createBarcodeScanner", true);

        registry.settle(
            ticket,
            Outcome::Success {
                value: WireValue::Handle("obj-1".to_string()),
            },
            &handles,
        );
        assert!(handles.is_live("obj-1"));
    }

    #[test]
    fn release_forgets_handle_only_on_success() {
        let mut registry = TicketRegistry::default();
        let handles = HandleLedger::default();
        handles.record("obj-1", "createOcrEngine");

        let (tx, _rx) = oneshot::channel();
        let failed = registry.issue();
        registry.register(
            failed,
            Continuation::new("releaseObject", false, tx).releasing(vec!["obj-1".to_string()]),
        );
        registry.settle(
            failed,
            Outcome::Failure {
                error: ErrorDescriptor::new(FailureKind::Engine, "busy"),
            },
            &handles,
        );
        assert!(handles.is_live("obj-1"));

        let (tx, _rx) = oneshot::channel();
        let retried = registry.issue();
        registry.register(
            retried,
            Continuation::new("releaseObject", false, tx).releasing(vec!["obj-1".to_string()]),
        );
        registry.settle(
            retried,
            Outcome::Success {
                value: WireValue::null(),
            },
            &handles,
        );
        assert!(!handles.is_live("obj-1"));
    }

    #[test]
    fn settle_with_dropped_receiver_is_harmless() {
        let mut registry = TicketRegistry::default();
        let (ticket, rx) = register(&mut registry, "version", false);
        drop(rx);

        assert!(registry.settle(
            ticket,
            Outcome::Success {
                value: WireValue::null()
            },
            &HandleLedger::default()
        ));
    }
}
