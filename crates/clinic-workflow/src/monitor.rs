//! 候诊队列监控
//!
//! 按固定间隔拉取当天就诊记录，发布排序后的快照，
//! 并在记录首次进入危急等级时告警。

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::{ClinicApi, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::{order_queue, summarize, QueueEngine, QueueEntry, QueueSummary, WaitBand};

/// 队列快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub date: Option<NaiveDate>,
    pub taken_at: Option<DateTime<Utc>>,
    pub entries: Vec<QueueEntry>,
    pub summary: QueueSummary,
    /// 本次刷新新进入危急等级的记录
    pub newly_critical: Vec<Uuid>,
}

/// 候诊队列监控器
pub struct QueueMonitor {
    api: Arc<dyn ClinicApi>,
    engine: QueueEngine,
    interval: Duration,
    alerted: HashSet<Uuid>,
    sender: watch::Sender<Arc<QueueSnapshot>>,
}

impl QueueMonitor {
    pub fn new(api: Arc<dyn ClinicApi>, engine: QueueEngine, interval: Duration) -> Self {
        let (sender, _) = watch::channel(Arc::new(QueueSnapshot::default()));
        Self {
            api,
            engine,
            interval,
            alerted: HashSet::new(),
            sender,
        }
    }

    /// 订阅最新快照
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueSnapshot>> {
        self.sender.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 拉取一次并发布快照
    pub async fn poll_once(&mut self) -> Result<Arc<QueueSnapshot>> {
        let now = self.engine.clock().now();
        let date = now.date_naive();
        let records = self.api.list_visits(date).await?;
        let entries = order_queue(&records, now);

        let newly_critical = self.raise_alerts(&entries);
        let snapshot = Arc::new(QueueSnapshot {
            date: Some(date),
            taken_at: Some(now),
            summary: summarize(&entries),
            entries,
            newly_critical,
        });

        debug!(
            "Queue snapshot for {}: {} waiting, {} critical",
            date, snapshot.summary.total_waiting, snapshot.summary.critical_band
        );
        self.sender.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// 持续刷新直到收到关闭信号
    ///
    /// 单次拉取失败只记录告警，订阅方继续看到上一次的快照。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Queue monitor started with refresh interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("Queue refresh failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Queue monitor stopped");
    }

    fn raise_alerts(&mut self, entries: &[QueueEntry]) -> Vec<Uuid> {
        let waiting: HashSet<Uuid> = entries.iter().map(|e| e.record.id).collect();
        self.alerted.retain(|id| waiting.contains(id));

        let mut newly_critical = Vec::new();
        for entry in entries.iter().filter(|e| e.band == WaitBand::Critical) {
            if self.alerted.insert(entry.record.id) {
                warn!(
                    "Patient {} (token {}) has waited {} minutes for {}",
                    entry.record.patient_name(),
                    entry.record.token,
                    entry.wait_minutes,
                    entry.record.assigned_doctor
                );
                newly_critical.push(entry.record.id);
            }
        }
        newly_critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::sample_record;
    use crate::test_support::FaultyClinicApi;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use clinic_core::{FixedClock, Priority, VisitStatus};

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_critical_alert_raised_once() {
        let clock = Arc::new(FixedClock::new(nine_am()));
        let api = Arc::new(FaultyClinicApi::new(clock.clone()));
        let record = sample_record("A-1", Priority::Normal, nine_am());
        let visit_id = record.id;
        api.insert_visit(record).await;

        let mut monitor = QueueMonitor::new(api.clone(), QueueEngine::new(clock.clone()), Duration::from_secs(30));
        let receiver = monitor.subscribe();

        let snapshot = monitor.poll_once().await.unwrap();
        assert_eq!(snapshot.summary.total_waiting, 1);
        assert!(snapshot.newly_critical.is_empty());

        clock.advance(ChronoDuration::minutes(26));
        let snapshot = monitor.poll_once().await.unwrap();
        assert_eq!(snapshot.newly_critical, vec![visit_id]);
        assert_eq!(receiver.borrow().summary.critical_band, 1);

        clock.advance(ChronoDuration::minutes(1));
        let snapshot = monitor.poll_once().await.unwrap();
        assert!(snapshot.newly_critical.is_empty());
    }

    #[tokio::test]
    async fn test_records_leaving_queue_are_forgotten() {
        let clock = Arc::new(FixedClock::new(nine_am()));
        let api = Arc::new(FaultyClinicApi::new(clock.clone()));
        let record = sample_record("A-1", Priority::Normal, nine_am() - ChronoDuration::minutes(30));
        let visit_id = record.id;
        api.insert_visit(record).await;

        let mut monitor = QueueMonitor::new(api.clone(), QueueEngine::new(clock.clone()), Duration::from_secs(30));
        assert_eq!(monitor.poll_once().await.unwrap().newly_critical, vec![visit_id]);

        api.set_status(visit_id, VisitStatus::CheckedIn).await;
        let snapshot = monitor.poll_once().await.unwrap();
        assert!(snapshot.entries.is_empty());
        assert!(monitor.alerted.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let clock = Arc::new(FixedClock::new(nine_am()));
        let api = Arc::new(FaultyClinicApi::new(clock.clone()));
        let monitor = QueueMonitor::new(api, QueueEngine::new(clock), Duration::from_millis(10));
        let mut receiver = monitor.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(monitor.run(shutdown_rx));
        receiver.changed().await.unwrap();
        assert!(receiver.borrow().taken_at.is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
