// Trigger sinks - where recognized clap gestures are delivered
//
// Sinks run on the analysis thread, once per trigger, so they must return
// quickly. Hand heavy work (ringing the phone, network calls) to another
// thread, e.g. through a BroadcastSink subscriber. A sink may call
// `ClapPipeline::stop`; the session ends after the sink returns.

use tokio::sync::broadcast;

pub use crate::analysis::TriggerEvent;

/// Receiver of trigger events
pub trait TriggerSink: Send + Sync {
    fn on_trigger(&self, event: &TriggerEvent);
}

impl<F> TriggerSink for F
where
    F: Fn(&TriggerEvent) + Send + Sync,
{
    fn on_trigger(&self, event: &TriggerEvent) {
        self(event)
    }
}

/// Logs each trigger and does nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TriggerSink for LogSink {
    fn on_trigger(&self, event: &TriggerEvent) {
        log::info!(
            "[LogSink] Clap gesture: {} claps, {}ms -> {}ms",
            event.clap_count,
            event.first_clap_ms,
            event.timestamp_ms
        );
    }
}

/// Fans triggers out to any number of async subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TriggerEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.tx.subscribe()
    }
}

impl TriggerSink for BroadcastSink {
    fn on_trigger(&self, event: &TriggerEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(*event);
    }
}
