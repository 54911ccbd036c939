//! 候诊队列排序引擎
//!
//! 对候诊中的就诊记录排序（急诊优先，其次按到达先后），
//! 并按候诊时长划分紧急程度等级。

use chrono::{DateTime, Utc};
use clinic_core::{Clock, Priority, VisitRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 候诊不超过此分钟数为正常
pub const NORMAL_WAIT_LIMIT_MINUTES: i64 = 10;

/// 候诊不超过此分钟数为警告，超过即为危急
pub const WARNING_WAIT_LIMIT_MINUTES: i64 = 25;

/// 默认刷新间隔
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// 候诊时长等级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WaitBand {
    Normal,
    Warning,
    Critical,
}

impl WaitBand {
    pub fn classify(wait_minutes: i64) -> Self {
        if wait_minutes <= NORMAL_WAIT_LIMIT_MINUTES {
            WaitBand::Normal
        } else if wait_minutes <= WARNING_WAIT_LIMIT_MINUTES {
            WaitBand::Warning
        } else {
            WaitBand::Critical
        }
    }
}

/// 已候诊的整分钟数，时钟偏差导致的负值按0处理
pub fn wait_minutes(check_in_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_ms = now.signed_duration_since(check_in_time).num_milliseconds();
    elapsed_ms.div_euclid(60_000).max(0)
}

/// 队列条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// 从1开始的排队位置
    pub position: usize,
    pub record: VisitRecord,
    pub wait_minutes: i64,
    pub band: WaitBand,
}

/// 队列汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSummary {
    pub total_waiting: usize,
    pub emergency_waiting: usize,
    pub normal_band: usize,
    pub warning_band: usize,
    pub critical_band: usize,
    pub longest_wait_minutes: i64,
}

/// 对候诊集合排序并标注候诊等级
///
/// 只保留 `Waiting` 状态的记录；排序稳定，到达时间相同时保持输入顺序。
pub fn order_queue(records: &[VisitRecord], now: DateTime<Utc>) -> Vec<QueueEntry> {
    let mut waiting: Vec<&VisitRecord> = records.iter().filter(|r| r.is_waiting()).collect();

    waiting.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| a.check_in_time.cmp(&b.check_in_time))
    });

    waiting
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let wait = wait_minutes(record.check_in_time, now);
            QueueEntry {
                position: index + 1,
                record: record.clone(),
                wait_minutes: wait,
                band: WaitBand::classify(wait),
            }
        })
        .collect()
}

/// 汇总已排序的队列
pub fn summarize(entries: &[QueueEntry]) -> QueueSummary {
    let mut summary = QueueSummary {
        total_waiting: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        if entry.record.priority == Priority::Emergency {
            summary.emergency_waiting += 1;
        }
        match entry.band {
            WaitBand::Normal => summary.normal_band += 1,
            WaitBand::Warning => summary.warning_band += 1,
            WaitBand::Critical => summary.critical_band += 1,
        }
        summary.longest_wait_minutes = summary.longest_wait_minutes.max(entry.wait_minutes);
    }

    summary
}

/// 队列引擎，持有注入的时间源
#[derive(Debug, Clone)]
pub struct QueueEngine {
    clock: Arc<dyn Clock>,
}

impl QueueEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 以当前时间排序
    pub fn order(&self, records: &[VisitRecord]) -> Vec<QueueEntry> {
        order_queue(records, self.clock.now())
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};
    use clinic_core::{FixedClock, Gender, Patient, VisitStatus, VisitType};
    use uuid::Uuid;

    pub(crate) fn sample_record(
        token: &str,
        priority: Priority,
        check_in_time: DateTime<Utc>,
    ) -> VisitRecord {
        VisitRecord {
            id: Uuid::new_v4(),
            token: token.to_string(),
            patient: Patient::Human {
                name: format!("Patient {}", token),
                age: 30,
                gender: Gender::Female,
                contact: "9876543210".to_string(),
                address: "12 MG Road".to_string(),
            },
            visit_type: VisitType::WalkIn,
            priority,
            doctor_id: Uuid::new_v4(),
            assigned_doctor: "Dr. Mehta".to_string(),
            department: "Cardiology".to_string(),
            consultation_fee: 500,
            registration_charge: 100,
            status: VisitStatus::Waiting,
            check_in_time,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            symptoms: None,
            created_at: check_in_time,
            updated_at: check_in_time,
        }
    }

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn tokens(entries: &[QueueEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.record.token.as_str()).collect()
    }

    #[test]
    fn test_emergency_precedes_normal() {
        let base = nine_am();
        let records = vec![
            sample_record("A-1", Priority::Normal, base),
            sample_record("A-2", Priority::Normal, base + ChronoDuration::minutes(5)),
            sample_record("E-3", Priority::Emergency, base + ChronoDuration::minutes(40)),
            sample_record("E-4", Priority::Emergency, base + ChronoDuration::minutes(20)),
        ];

        let entries = order_queue(&records, base + ChronoDuration::minutes(45));
        assert_eq!(tokens(&entries), vec!["E-4", "E-3", "A-1", "A-2"]);
        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[3].position, 4);
    }

    #[test]
    fn test_fifo_within_priority_and_stable_ties() {
        let base = nine_am();
        let records = vec![
            sample_record("A-3", Priority::Normal, base + ChronoDuration::minutes(3)),
            sample_record("A-1", Priority::Normal, base),
            sample_record("A-2a", Priority::Normal, base + ChronoDuration::minutes(2)),
            sample_record("A-2b", Priority::Normal, base + ChronoDuration::minutes(2)),
        ];

        let entries = order_queue(&records, base + ChronoDuration::minutes(10));
        assert_eq!(tokens(&entries), vec!["A-1", "A-2a", "A-2b", "A-3"]);
    }

    #[test]
    fn test_only_waiting_records_are_queued() {
        let base = nine_am();
        let mut checked_in = sample_record("A-1", Priority::Normal, base);
        checked_in.status = VisitStatus::CheckedIn;
        let mut cancelled = sample_record("E-2", Priority::Emergency, base);
        cancelled.status = VisitStatus::Cancelled;
        let waiting = sample_record("A-3", Priority::Normal, base);

        let entries = order_queue(&[checked_in, cancelled, waiting], base);
        assert_eq!(tokens(&entries), vec!["A-3"]);
    }

    #[test]
    fn test_wait_band_boundaries() {
        let now = nine_am();
        let band_at = |minutes: i64| {
            let records = vec![sample_record("A-1", Priority::Normal, now - ChronoDuration::minutes(minutes))];
            order_queue(&records, now)[0].band
        };

        assert_eq!(band_at(0), WaitBand::Normal);
        assert_eq!(band_at(10), WaitBand::Normal);
        assert_eq!(band_at(11), WaitBand::Warning);
        assert_eq!(band_at(25), WaitBand::Warning);
        assert_eq!(band_at(26), WaitBand::Critical);
    }

    #[test]
    fn test_wait_minutes_floors_and_clamps() {
        let now = nine_am();
        assert_eq!(wait_minutes(now - ChronoDuration::seconds(659), now), 10);
        assert_eq!(wait_minutes(now - ChronoDuration::seconds(660), now), 11);
        assert_eq!(wait_minutes(now + ChronoDuration::seconds(30), now), 0);
    }

    #[test]
    fn test_engine_uses_injected_clock() {
        let clock = Arc::new(FixedClock::new(nine_am()));
        let engine = QueueEngine::new(clock.clone());
        let records = vec![sample_record("A-1", Priority::Normal, nine_am())];

        assert_eq!(engine.order(&records)[0].wait_minutes, 0);
        clock.advance(ChronoDuration::minutes(26));
        assert_eq!(engine.order(&records)[0].band, WaitBand::Critical);
    }

    #[test]
    fn test_summary_counts() {
        let now = nine_am();
        let records = vec![
            sample_record("A-1", Priority::Normal, now - ChronoDuration::minutes(30)),
            sample_record("A-2", Priority::Normal, now - ChronoDuration::minutes(12)),
            sample_record("E-3", Priority::Emergency, now - ChronoDuration::minutes(1)),
        ];

        let summary = summarize(&order_queue(&records, now));
        assert_eq!(summary.total_waiting, 3);
        assert_eq!(summary.emergency_waiting, 1);
        assert_eq!(summary.normal_band, 1);
        assert_eq!(summary.warning_band, 1);
        assert_eq!(summary.critical_band, 1);
        assert_eq!(summary.longest_wait_minutes, 30);
    }
}
