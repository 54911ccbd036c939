//! 就诊状态分布图计算
//!
//! 只计算各状态所占扇区的起止角度，不涉及渲染。

use clinic_core::{VisitRecord, VisitStatus};
use serde::{Deserialize, Serialize};

/// 各状态记录数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub waiting: usize,
    pub checked_in: usize,
    pub with_doctor: usize,
    pub cancelled: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn from_records(records: &[VisitRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            *counts.slot_mut(record.status) += 1;
        }
        counts
    }

    pub fn get(&self, status: VisitStatus) -> usize {
        match status {
            VisitStatus::Waiting => self.waiting,
            VisitStatus::CheckedIn => self.checked_in,
            VisitStatus::WithDoctor => self.with_doctor,
            VisitStatus::Cancelled => self.cancelled,
            VisitStatus::Completed => self.completed,
        }
    }

    pub fn total(&self) -> usize {
        VisitStatus::all().iter().map(|status| self.get(*status)).sum()
    }

    fn slot_mut(&mut self, status: VisitStatus) -> &mut usize {
        match status {
            VisitStatus::Waiting => &mut self.waiting,
            VisitStatus::CheckedIn => &mut self.checked_in,
            VisitStatus::WithDoctor => &mut self.with_doctor,
            VisitStatus::Cancelled => &mut self.cancelled,
            VisitStatus::Completed => &mut self.completed,
        }
    }
}

/// 环形图扇区（角度单位为度，从0度顺时针）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSegment {
    pub status: VisitStatus,
    pub count: usize,
    pub percent: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

/// 计算各状态扇区，数量为0的状态不出现
pub fn status_segments(counts: &StatusCounts) -> Vec<ChartSegment> {
    let total = counts.total();
    if total == 0 {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut cumulative = 0usize;
    for status in VisitStatus::all() {
        let count = counts.get(status);
        if count == 0 {
            continue;
        }
        let start_angle = 360.0 * cumulative as f64 / total as f64;
        cumulative += count;
        let end_angle = 360.0 * cumulative as f64 / total as f64;
        segments.push(ChartSegment {
            status,
            count,
            percent: 100.0 * count as f64 / total as f64,
            start_angle,
            end_angle,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counts_have_no_segments() {
        assert!(status_segments(&StatusCounts::default()).is_empty());
    }

    #[test]
    fn test_segments_cover_full_circle() {
        let counts = StatusCounts {
            waiting: 2,
            checked_in: 0,
            with_doctor: 1,
            cancelled: 0,
            completed: 1,
        };

        let segments = status_segments(&counts);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].status, VisitStatus::Waiting);
        assert_eq!(segments[0].start_angle, 0.0);
        assert_eq!(segments[0].end_angle, 180.0);
        assert_eq!(segments[0].percent, 50.0);
        assert_eq!(segments[1].start_angle, 180.0);
        assert_eq!(segments[2].end_angle, 360.0);
    }
}
