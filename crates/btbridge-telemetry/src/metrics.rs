//! Prometheus-backed metrics for bridge drains and transfers.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Poll stream a drain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStream {
    /// Bulk status updates.
    Status,
    /// Resume-data captures.
    Resume,
    /// Classified alerts.
    Alerts,
}

impl DrainStream {
    /// Every stream, for aggregation.
    pub const ALL: [Self; 3] = [Self::Status, Self::Resume, Self::Alerts];

    /// Metric label value.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Resume => "resume",
            Self::Alerts => "alerts",
        }
    }
}

/// Why a drained engine event was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The event did not belong to the stream being polled.
    NonMatching,
    /// The caller's capacity was already filled.
    OverCapacity,
}

impl DiscardReason {
    const ALL: [Self; 2] = [Self::NonMatching, Self::OverCapacity];

    const fn label(self) -> &'static str {
        match self {
            Self::NonMatching => "non_matching",
            Self::OverCapacity => "over_capacity",
        }
    }
}

/// Prometheus-backed metrics registry shared across the process.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_delivered_total: IntCounterVec,
    events_discarded_total: IntCounterVec,
    torrents_active: IntGauge,
    resume_batches_outstanding: IntGauge,
}

/// Snapshot of selected gauges and counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current number of registered transfers.
    pub torrents_active: i64,
    /// Resume batches handed out and not yet released.
    pub resume_batches_outstanding: i64,
    /// Events delivered across every stream.
    pub events_delivered_total: u64,
    /// Events discarded across every stream and reason.
    pub events_discarded_total: u64,
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<C>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}

impl Metrics {
    /// Construct a registry with the bridge collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_delivered_total = IntCounterVec::new(
            Opts::new(
                "btbridge_events_delivered_total",
                "Engine events delivered to pollers by stream",
            ),
            &["stream"],
        )
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "btbridge_events_delivered_total",
            source,
        })?;
        let events_discarded_total = IntCounterVec::new(
            Opts::new(
                "btbridge_events_discarded_total",
                "Engine events drained but not delivered",
            ),
            &["stream", "reason"],
        )
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "btbridge_events_discarded_total",
            source,
        })?;
        let torrents_active = IntGauge::with_opts(Opts::new(
            "btbridge_torrents_active",
            "Transfers registered with the session",
        ))
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "btbridge_torrents_active",
            source,
        })?;
        let resume_batches_outstanding = IntGauge::with_opts(Opts::new(
            "btbridge_resume_batches_outstanding",
            "Resume batches not yet released",
        ))
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "btbridge_resume_batches_outstanding",
            source,
        })?;

        let events_delivered_total = register(
            &registry,
            "btbridge_events_delivered_total",
            events_delivered_total,
        )?;
        let events_discarded_total = register(
            &registry,
            "btbridge_events_discarded_total",
            events_discarded_total,
        )?;
        let torrents_active = register(&registry, "btbridge_torrents_active", torrents_active)?;
        let resume_batches_outstanding = register(
            &registry,
            "btbridge_resume_batches_outstanding",
            resume_batches_outstanding,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                events_delivered_total,
                events_discarded_total,
                torrents_active,
                resume_batches_outstanding,
            }),
        })
    }

    /// Count events delivered on `stream`.
    pub fn add_delivered(&self, stream: DrainStream, count: u64) {
        self.inner
            .events_delivered_total
            .with_label_values(&[stream.label()])
            .inc_by(count);
    }

    /// Count events discarded on `stream` for `reason`.
    pub fn add_discarded(&self, stream: DrainStream, reason: DiscardReason, count: u64) {
        self.inner
            .events_discarded_total
            .with_label_values(&[stream.label(), reason.label()])
            .inc_by(count);
    }

    /// Set the active transfer gauge.
    pub fn set_torrents_active(&self, count: i64) {
        self.inner.torrents_active.set(count);
    }

    /// Set the outstanding resume batch gauge.
    pub fn set_resume_batches_outstanding(&self, count: i64) {
        self.inner.resume_batches_outstanding.set(count);
    }

    /// Render all metrics in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Capture a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let delivered = DrainStream::ALL
            .iter()
            .map(|stream| {
                self.inner
                    .events_delivered_total
                    .with_label_values(&[stream.label()])
                    .get()
            })
            .sum();
        let discarded = DrainStream::ALL
            .iter()
            .flat_map(|stream| DiscardReason::ALL.map(|reason| (*stream, reason)))
            .map(|(stream, reason)| {
                self.inner
                    .events_discarded_total
                    .with_label_values(&[stream.label(), reason.label()])
                    .get()
            })
            .sum();
        MetricsSnapshot {
            torrents_active: self.inner.torrents_active.get(),
            resume_batches_outstanding: self.inner.resume_batches_outstanding.get(),
            events_delivered_total: delivered,
            events_discarded_total: discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_stream() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.add_delivered(DrainStream::Alerts, 3);
        metrics.add_delivered(DrainStream::Status, 2);
        metrics.add_discarded(DrainStream::Alerts, DiscardReason::NonMatching, 4);
        metrics.add_discarded(DrainStream::Alerts, DiscardReason::OverCapacity, 1);
        metrics.set_torrents_active(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_delivered_total, 5);
        assert_eq!(snapshot.events_discarded_total, 5);
        assert_eq!(snapshot.torrents_active, 2);
        Ok(())
    }

    #[test]
    fn render_includes_metric_names() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.add_discarded(DrainStream::Resume, DiscardReason::OverCapacity, 1);
        metrics.set_resume_batches_outstanding(1);
        let rendered = metrics.render()?;
        assert!(rendered.contains("btbridge_events_discarded_total"));
        assert!(rendered.contains("reason=\"over_capacity\""));
        assert!(rendered.contains("btbridge_resume_batches_outstanding 1"));
        Ok(())
    }

    #[test]
    fn snapshot_serialises() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let json = serde_json::to_value(metrics.snapshot())?;
        assert_eq!(json["torrents_active"], 0);
        Ok(())
    }
}
