//! Keyed cache of arrival estimates.
//!
//! GPS fixes arrive every few seconds while directions queries are slow and
//! rate-limited. An entry stays valid only while it is younger than the TTL
//! *and* the querying vehicle is still close to where the entry was sampled,
//! so a stationary bus does not re-query and a moving one does not read
//! stale numbers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::haversine::distance_meters;
use crate::model::Position;

/// A cached value and the sample it was computed from.
#[derive(Debug, Clone)]
pub struct EtaCacheEntry<V> {
    pub value: V,
    pub sampled_at: Instant,
    pub sampled_position: Position,
}

#[derive(Debug)]
pub struct EtaCache<V> {
    ttl: Duration,
    movement_threshold_m: f64,
    entries: DashMap<String, Arc<EtaCacheEntry<V>>>,
}

impl<V: Clone> EtaCache<V> {
    pub fn new(ttl: Duration, movement_threshold_m: f64) -> Self {
        Self {
            ttl,
            movement_threshold_m,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str, current: &Position) -> Option<V> {
        self.get_at(key, current, Instant::now())
    }

    /// Returns the cached value if it is still fresh at `now` for a vehicle
    /// at `current`.
    pub fn get_at(&self, key: &str, current: &Position, now: Instant) -> Option<V> {
        // Clone the Arc so the shard lock is released before the checks.
        let entry = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        if self.is_fresh(&entry, current, now) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn put(&self, key: impl Into<String>, value: V, sample_position: Position) {
        self.put_at(key, value, sample_position, Instant::now());
    }

    /// Replaces whatever was cached under `key`.
    pub fn put_at(&self, key: impl Into<String>, value: V, sample_position: Position, now: Instant) {
        let entry = EtaCacheEntry {
            value,
            sampled_at: now,
            sampled_position: sample_position,
        };
        self.entries.insert(key.into(), Arc::new(entry));
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Drops entries older than the TTL at `now`.
    pub fn purge_stale(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.sampled_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, entry: &EtaCacheEntry<V>, current: &Position, now: Instant) -> bool {
        let age = now.saturating_duration_since(entry.sampled_at);
        age < self.ttl
            && distance_meters(current, &entry.sampled_position) < self.movement_threshold_m
    }
}
