//! 前台运行指标
//!
//! Prometheus指标注册与文本格式导出

use anyhow::{Context, Result};
use clinic_core::VisitStatus;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// 前台指标收集器
#[derive(Clone)]
pub struct ClinicMetrics {
    registry: Registry,
    registrations_total: IntCounter,
    status_transitions_total: IntCounterVec,
    queue_waiting: IntGauge,
    queue_emergency_waiting: IntGauge,
    queue_critical_waits: IntGauge,
}

impl ClinicMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let registrations_total = IntCounter::with_opts(Opts::new(
            "clinic_registrations_total",
            "Total number of confirmed registrations",
        ))?;
        let status_transitions_total = IntCounterVec::new(
            Opts::new("clinic_status_transitions_total", "Total number of visit status changes"),
            &["status"],
        )?;
        let queue_waiting = IntGauge::with_opts(Opts::new(
            "clinic_queue_waiting",
            "Number of patients currently waiting",
        ))?;
        let queue_emergency_waiting = IntGauge::with_opts(Opts::new(
            "clinic_queue_emergency_waiting",
            "Number of emergency patients currently waiting",
        ))?;
        let queue_critical_waits = IntGauge::with_opts(Opts::new(
            "clinic_queue_critical_waits",
            "Number of waiting patients beyond the warning band",
        ))?;

        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(status_transitions_total.clone()))?;
        registry.register(Box::new(queue_waiting.clone()))?;
        registry.register(Box::new(queue_emergency_waiting.clone()))?;
        registry.register(Box::new(queue_critical_waits.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            status_transitions_total,
            queue_waiting,
            queue_emergency_waiting,
            queue_critical_waits,
        })
    }

    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    pub fn record_transition(&self, status: VisitStatus) {
        self.status_transitions_total
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    /// 更新候诊队列指标
    pub fn set_queue(&self, waiting: usize, emergency: usize, critical: usize) {
        self.queue_waiting.set(gauge_value(waiting));
        self.queue_emergency_waiting.set(gauge_value(emergency));
        self.queue_critical_waits.set(gauge_value(critical));
    }

    pub fn registrations(&self) -> u64 {
        self.registrations_total.get()
    }

    /// 导出Prometheus文本格式
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .context("Failed to encode metrics")
    }
}

impl std::fmt::Debug for ClinicMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicMetrics")
            .field("registrations_total", &self.registrations_total.get())
            .field("queue_waiting", &self.queue_waiting.get())
            .finish()
    }
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = ClinicMetrics::new().unwrap();
        metrics.record_registration();
        metrics.record_transition(VisitStatus::CheckedIn);
        metrics.set_queue(4, 1, 2);

        let text = metrics.render().unwrap();
        assert!(text.contains("clinic_registrations_total 1"));
        assert!(text.contains("clinic_status_transitions_total{status=\"CheckedIn\"} 1"));
        assert!(text.contains("clinic_queue_waiting 4"));
        assert!(text.contains("clinic_queue_critical_waits 2"));
        assert_eq!(metrics.registrations(), 1);
    }

    #[test]
    fn test_instances_do_not_share_registry() {
        let first = ClinicMetrics::new().unwrap();
        let second = ClinicMetrics::new().unwrap();
        first.record_registration();
        assert_eq!(second.registrations(), 0);
    }
}
