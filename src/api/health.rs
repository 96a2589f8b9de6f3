//! Shared health state for the /health endpoint.
//! Updated by the reload handler, read by API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::snapshot::Snapshot;

#[derive(Default)]
pub struct HealthState {
    /// Successful snapshot reloads since startup.
    pub reloads: AtomicU64,
    /// Failed reload attempts since startup.
    pub failed_reloads: AtomicU64,
    /// Unix seconds of the last successful load (0 = startup snapshot only).
    pub last_reload_at: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reload(&self, at_secs: u64) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        self.last_reload_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn record_failed_reload(&self) {
        self.failed_reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// `segments_computed_at` is the SQLite segment mirror's write time.
    pub fn report(&self, snapshot: &Snapshot, segments_computed_at: Option<i64>) -> HealthReport {
        HealthReport {
            status: "ok",
            opportunities: snapshot.base.len(),
            feature_rows: snapshot.features.len(),
            sustain_model: snapshot.sustain_model.is_some(),
            reloads: self.reloads.load(Ordering::Relaxed),
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            last_reload_at: self.last_reload_at.load(Ordering::Relaxed),
            segments_computed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub opportunities: usize,
    pub feature_rows: usize,
    pub sustain_model: bool,
    pub reloads: u64,
    pub failed_reloads: u64,
    pub last_reload_at: u64,
    pub segments_computed_at: Option<i64>,
}
