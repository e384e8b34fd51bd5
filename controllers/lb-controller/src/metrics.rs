//! Prometheus metrics for the reconcilers, the FRR pusher and the webhook.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Metric handles registered in one [`Registry`].
pub struct ControllerMetrics {
    pub registry: Registry,

    pub reconcile_total: IntCounterVec,
    pub reconcile_errors_total: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub queue_depth: IntGaugeVec,

    pub frr_writes_total: IntCounterVec,
    pub admission_total: IntCounterVec,
}

impl ControllerMetrics {
    /// Creates and registers every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new("lb_reconcile_total", "Total number of reconciliations"),
            &["reconciler"],
        )?;
        let reconcile_errors_total = IntCounterVec::new(
            Opts::new("lb_reconcile_errors_total", "Reconciliations that returned an error"),
            &["reconciler"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new("lb_reconcile_duration_seconds", "Reconciliation duration"),
            &["reconciler"],
        )?;
        let queue_depth = IntGaugeVec::new(
            Opts::new("lb_reconcile_queue_depth", "Triggers waiting in a reconciler queue"),
            &["reconciler"],
        )?;
        let frr_writes_total = IntCounterVec::new(
            Opts::new("lb_frr_configuration_writes_total", "FRRConfiguration writes by operation"),
            &["operation"],
        )?;
        let admission_total = IntCounterVec::new(
            Opts::new("lb_admission_requests_total", "Admission reviews by kind and verdict"),
            &["kind", "allowed"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_errors_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(frr_writes_total.clone()))?;
        registry.register(Box::new(admission_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_errors_total,
            reconcile_duration,
            queue_depth,
            frr_writes_total,
            admission_total,
        })
    }

    /// Text exposition of every registered metric.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
