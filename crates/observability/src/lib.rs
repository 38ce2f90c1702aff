use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct PlaybackMetrics {
    compiles_total: AtomicU64,
    snapshots_total: AtomicU64,
    pauses_total: AtomicU64,
    resumes_total: AtomicU64,
    completions_total: AtomicU64,
    stops_total: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub compiles_total: u64,
    pub snapshots_total: u64,
    pub pauses_total: u64,
    pub resumes_total: u64,
    pub completions_total: u64,
    pub stops_total: u64,
}

impl PlaybackMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_compile(&self) {
        self.compiles_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_compiles_total").increment(1);
    }

    pub fn inc_snapshot(&self) {
        self.snapshots_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_snapshots_total").increment(1);
    }

    pub fn inc_pause(&self) {
        self.pauses_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_pauses_total").increment(1);
    }

    pub fn inc_resume(&self) {
        self.resumes_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_resumes_total").increment(1);
    }

    pub fn inc_completion(&self) {
        self.completions_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_completions_total").increment(1);
    }

    pub fn inc_stop(&self) {
        self.stops_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pulse_stops_total").increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compiles_total: self.compiles_total.load(Ordering::Relaxed),
            snapshots_total: self.snapshots_total.load(Ordering::Relaxed),
            pauses_total: self.pauses_total.load(Ordering::Relaxed),
            resumes_total: self.resumes_total.load(Ordering::Relaxed),
            completions_total: self.completions_total.load(Ordering::Relaxed),
            stops_total: self.stops_total.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,pulse_playback=info,pulse_storage=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
