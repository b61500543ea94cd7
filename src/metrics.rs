//! Prometheus metrics about the status endpoint itself.

use std::time::Duration;

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::endpoints::Rendered;

/// Label used for paths that do not resolve to a report.
pub const UNROUTED_LABEL: &str = "unrouted";

/// Counters and timings of rendered reports.
#[derive(Clone)]
pub struct ReportMetrics {
    pub reports_total: IntCounterVec,
    pub report_failures_total: IntCounterVec,
    pub report_duration: GaugeVec,
}

impl ReportMetrics {
    /// Creates and registers all report metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let labels = &["path"];

        let reports_total = IntCounterVec::new(
            Opts::new(
                "runtime_status_reports_total",
                "Status reports rendered, by route",
            ),
            labels,
        )?;
        let report_failures_total = IntCounterVec::new(
            Opts::new(
                "runtime_status_report_failures_total",
                "Status reports that rendered the exception body, by route",
            ),
            labels,
        )?;
        let report_duration = GaugeVec::new(
            Opts::new(
                "runtime_status_report_duration_seconds",
                "Time spent rendering the last report, by route",
            ),
            labels,
        )?;

        registry.register(Box::new(reports_total.clone()))?;
        registry.register(Box::new(report_failures_total.clone()))?;
        registry.register(Box::new(report_duration.clone()))?;

        Ok(Self {
            reports_total,
            report_failures_total,
            report_duration,
        })
    }

    /// Records one rendered report. Route labels are bounded by the catalog.
    pub fn observe(&self, rendered: &Rendered, elapsed: Duration) {
        let label = rendered.route.unwrap_or(UNROUTED_LABEL);
        self.reports_total.with_label_values(&[label]).inc();
        if rendered.error.is_some() {
            self.report_failures_total.with_label_values(&[label]).inc();
        }
        self.report_duration
            .with_label_values(&[label])
            .set(elapsed.as_secs_f64());
    }
}

/// Text exposition of everything in `registry`.
pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_failures_separately() {
        let registry = Registry::new();
        let metrics = ReportMetrics::new(&registry).unwrap();

        let ok = Rendered {
            route: Some("/sakai/cache"),
            body: "users\n".into(),
            error: None,
        };
        let failed = Rendered {
            route: Some("/sakai/cache/"),
            body: "Exception: No such cache name.\n".into(),
            error: Some("No such cache name.".into()),
        };
        metrics.observe(&ok, Duration::from_millis(5));
        metrics.observe(&failed, Duration::from_millis(1));

        assert_eq!(metrics.reports_total.with_label_values(&["/sakai/cache"]).get(), 1);
        assert_eq!(
            metrics.report_failures_total.with_label_values(&["/sakai/cache/"]).get(),
            1
        );
        assert_eq!(
            metrics.report_failures_total.with_label_values(&["/sakai/cache"]).get(),
            0
        );

        let text = encode(&registry).unwrap();
        assert!(text.contains("runtime_status_reports_total{path=\"/sakai/cache\"} 1"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        ReportMetrics::new(&registry).unwrap();
        assert!(ReportMetrics::new(&registry).is_err());
    }
}
