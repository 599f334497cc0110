//! Counter capability consumed by the middleware

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Append-only counter
pub trait Counter: Send + Sync {
    fn inc(&self, n: u64);
}

/// Counter backed by an atomic
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Counter for AtomicCounter {
    fn inc(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
}

/// Named counters shared across requests
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Arc<AtomicCounter>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the counter registered under `name`
    pub fn counter(&self, name: &str) -> Arc<dyn Counter> {
        self.atomic(name)
    }

    /// Current value of a counter, zero if it was never created
    pub fn value(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |c| c.value().get())
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect()
    }

    fn atomic(&self, name: &str) -> Arc<AtomicCounter> {
        if let Some(existing) = self.counters.get(name) {
            return existing.clone();
        }
        self.counters.entry(name.to_string()).or_default().clone()
    }
}
