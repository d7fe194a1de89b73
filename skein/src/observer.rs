//! Typed runtime events and observer fan-out.
//!
//! Components emit [`Event`]s (namespaced kind, severity, source scope,
//! attribute map) through the [`Observer`] capability instead of logging
//! directly, so sinks can be swapped without touching the runtime.
//! [`MultiObserver`] fans one event out to several sinks; [`TracingObserver`]
//! bridges events onto `tracing` with a configurable severity floor.
//!
//! Observers are infallible by contract: `observe` returns nothing, and a
//! misbehaving sink must contain its own failures.
//!
//! **Interaction**: the kernel, hub, and workflow combinators all hold an
//! `Arc<dyn Observer>` and emit the event names listed in their module docs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Event severity, aligned with the OpenTelemetry SeverityNumber scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Verbose,
    Info,
    Warn,
    Error,
}

impl Level {
    /// OpenTelemetry SeverityNumber for this level.
    pub fn severity(&self) -> u8 {
        match self {
            Level::Verbose => 5,
            Level::Info => 9,
            Level::Warn => 13,
            Level::Error => 17,
        }
    }
}

/// One runtime event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Namespaced kind, e.g. `kernel.tool.call` or `parallel.complete`.
    pub kind: String,
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    /// Logical scope that emitted the event, e.g. `kernel` or `hub`.
    pub source: String,
    /// Attribute map.
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(kind: impl Into<String>, level: Level, source: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            level,
            timestamp: Utc::now(),
            source: source.into(),
            data: serde_json::Map::new(),
        }
    }

    /// Attaches one attribute; chainable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Sink for runtime events.
pub trait Observer: Send + Sync {
    fn observe(&self, event: &Event);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&self, _event: &Event) {}
}

/// Fan-out to several observers in registration order.
#[derive(Default, Clone)]
pub struct MultiObserver {
    observers: Vec<Arc<dyn Observer>>,
}

impl MultiObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fan-out from an optional list, filtering absent entries.
    pub fn from_list(observers: Vec<Option<Arc<dyn Observer>>>) -> Self {
        Self {
            observers: observers.into_iter().flatten().collect(),
        }
    }

    /// Appends one observer; chainable.
    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Observer for MultiObserver {
    fn observe(&self, event: &Event) {
        for observer in &self.observers {
            observer.observe(event);
        }
    }
}

/// Bridges events onto `tracing` with a severity floor.
///
/// Verbose events map to `debug!`, Info to `info!`, Warn to `warn!`, Error to
/// `error!`, all under the `skein::events` target. Events below the floor are
/// dropped.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    min_level: Level,
}

impl TracingObserver {
    /// Floor at Info: the default for non-verbose runs.
    pub fn new() -> Self {
        Self {
            min_level: Level::Info,
        }
    }

    pub fn with_min_level(min_level: Level) -> Self {
        Self { min_level }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for TracingObserver {
    fn observe(&self, event: &Event) {
        if event.level < self.min_level {
            return;
        }
        let data = serde_json::Value::Object(event.data.clone());
        match event.level {
            Level::Verbose => {
                debug!(target: "skein::events", kind = %event.kind, source = %event.source, data = %data)
            }
            Level::Info => {
                info!(target: "skein::events", kind = %event.kind, source = %event.source, data = %data)
            }
            Level::Warn => {
                warn!(target: "skein::events", kind = %event.kind, source = %event.source, data = %data)
            }
            Level::Error => {
                error!(target: "skein::events", kind = %event.kind, source = %event.source, data = %data)
            }
        }
    }
}
