//! Lifecycle notifications for observer collaborators.
//!
//! Events are a side channel: emitting never blocks or fails the operation
//! that produced them, and the core behaves identically with no listeners.

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

/// A structured lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ModuleRegistered {
        id: String,
        version: String,
    },
    CatalogCleared,
    CompositionStarted {
        modules: Vec<String>,
        framework: String,
    },
    CompositionCompleted {
        valid: bool,
        errors: usize,
        warnings: usize,
    },
    MigrationStarted {
        run_id: String,
        module_id: String,
        from: String,
        to: String,
    },
    StepStarted {
        run_id: String,
        index: usize,
        version: String,
    },
    StepCompleted {
        run_id: String,
        index: usize,
        version: String,
        success: bool,
    },
    MigrationCompleted {
        run_id: String,
        version_reached: String,
    },
    MigrationFailed {
        run_id: String,
        errors: Vec<String>,
    },
    RolledBack {
        run_id: String,
    },
}

impl LifecycleEvent {
    /// Short event name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ModuleRegistered { .. } => "module_registered",
            LifecycleEvent::CatalogCleared => "catalog_cleared",
            LifecycleEvent::CompositionStarted { .. } => "composition_started",
            LifecycleEvent::CompositionCompleted { .. } => "composition_completed",
            LifecycleEvent::MigrationStarted { .. } => "started",
            LifecycleEvent::StepStarted { .. } => "step_started",
            LifecycleEvent::StepCompleted { .. } => "step_completed",
            LifecycleEvent::MigrationCompleted { .. } => "completed",
            LifecycleEvent::MigrationFailed { .. } => "failed",
            LifecycleEvent::RolledBack { .. } => "rolled_back",
        }
    }
}

/// A listener for lifecycle events.
///
/// A returned error is logged and otherwise ignored.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn handle(&self, event: &LifecycleEvent) -> Result<(), String>;
}

/// Fan-out of events to registered listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Builder-style [`subscribe`](Self::subscribe).
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.subscribe(sink);
        self
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no listener is attached.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.handle(event) {
                warn!(event = event.name(), error = %e, "event listener failed");
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Forwards events into an mpsc channel.
///
/// A dropped receiver is not an error: the event is discarded.
pub struct ChannelSink {
    sender: Mutex<Sender<LifecycleEvent>>,
}

impl ChannelSink {
    /// Wrap a channel sender.
    pub fn new(sender: Sender<LifecycleEvent>) -> Self {
        ChannelSink {
            sender: Mutex::new(sender),
        }
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: &LifecycleEvent) -> Result<(), String> {
        let sender = self.sender.lock().map_err(|_| "channel sink lock poisoned".to_string())?;
        let _ = sender.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct Counting(AtomicUsize);

    impl EventSink for Counting {
        fn handle(&self, _event: &LifecycleEvent) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl EventSink for Failing {
        fn handle(&self, _event: &LifecycleEvent) -> Result<(), String> {
            Err("listener exploded".into())
        }
    }

    #[test]
    fn failing_listener_does_not_stop_delivery() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let bus = EventBus::new()
            .with_sink(Arc::new(Failing))
            .with_sink(counter.clone());
        bus.emit(&LifecycleEvent::CatalogCleared);
        bus.emit(&LifecycleEvent::CatalogCleared);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let bus = EventBus::new().with_sink(Arc::new(ChannelSink::new(tx)));
        bus.emit(&LifecycleEvent::ModuleRegistered {
            id: "auth".into(),
            version: "1.0.0".into(),
        });
        let event = rx.recv().unwrap();
        assert_eq!(event.name(), "module_registered");
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        assert!(sink.handle(&LifecycleEvent::CatalogCleared).is_ok());
    }

    #[test]
    fn empty_bus_is_a_no_op() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        bus.emit(&LifecycleEvent::CatalogCleared);
    }
}
