//! Named circuit breakers shared across jobs.

use super::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::errors::ConfigError;
use crate::events::{noop_sink, EventSink};
use dashmap::DashMap;
use std::sync::Arc;

/// Holds one breaker per dependency name.
///
/// Every job that reaches the same dependency must consult the same breaker,
/// so the orchestrator resolves its breakers here instead of creating them
/// per job.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    events: Arc<dyn EventSink>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .finish()
    }
}

impl BreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
            events: noop_sink(),
        }
    }

    /// Attaches `sink` to every breaker created from now on.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the breaker named `name`, creating it with `config` if absent.
    ///
    /// An existing breaker keeps the configuration it was created with.
    pub fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(existing.clone());
        }
        let breaker = CircuitBreaker::new(name, config)?.with_event_sink(self.events.clone());
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(breaker));
        Ok(entry.value().clone())
    }

    /// Returns the breaker named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Returns the registered breaker names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns a snapshot of every breaker, sorted by name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Returns the number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breaker is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
