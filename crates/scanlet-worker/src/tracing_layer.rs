//! Tracing layer for out-of-process compute contexts.
//!
//! Ships structured tracing events to the host as `ContextMessage::Log`,
//! preserving target and level.

use scanlet_bridge::{ContextMessage, LogLevel};
use tokio::sync::mpsc;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};

/// Events from these targets are produced while writing to the host channel;
/// forwarding them would feed back into the channel indefinitely.
const SUPPRESSED_TARGETS: &[&str] = &["scanlet_bridge::codec"];

pub struct ContextTracingLayer {
    tx: mpsc::UnboundedSender<ContextMessage>,
}

impl ContextTracingLayer {
    pub fn new(tx: mpsc::UnboundedSender<ContextMessage>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for ContextTracingLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if SUPPRESSED_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let _ = self.tx.send(ContextMessage::Log {
            target: target.to_string(),
            level: LogLevel::from(metadata.level()),
            message: visitor.message,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
            if self.message.len() >= 2 && self.message.starts_with('"') && self.message.ends_with('"')
            {
                self.message = self.message[1..self.message.len() - 1].to_string();
            }
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn forwards_events_with_level_and_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(ContextTracingLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "engine::ocr", "model {} loaded", "latin");
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ContextMessage::Log {
                target: "engine::ocr".to_string(),
                level: LogLevel::Warn,
                message: "model latin loaded".to_string(),
            }
        );
    }

    #[test]
    fn suppresses_codec_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(ContextTracingLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "scanlet_bridge::codec", "Encoding frame");
        });

        assert!(rx.try_recv().is_err());
    }
}
