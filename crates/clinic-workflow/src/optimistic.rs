//! 乐观状态更新
//!
//! 先在本地视图应用新状态，再提交给协作方；提交失败则回滚，
//! 记录已被他人删除时从本地视图移除。

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::{ClinicApi, ClinicError, Result, VisitRecord, VisitStatus};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// 默认提交超时
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// 本地就诊视图
///
/// 只用于展示，任何修改操作前都要以协作方返回的数据为准。
#[derive(Debug, Clone, Default)]
pub struct LocalVisitView {
    date: Option<NaiveDate>,
    records: Vec<VisitRecord>,
    fetched_at: Option<DateTime<Utc>>,
}

impl LocalVisitView {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用最新快照整体替换
    pub fn replace(&mut self, date: NaiveDate, records: Vec<VisitRecord>, fetched_at: DateTime<Utc>) {
        self.date = Some(date);
        self.records = records;
        self.fetched_at = Some(fetched_at);
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }

    pub fn get(&self, visit_id: Uuid) -> Option<&VisitRecord> {
        self.records.iter().find(|r| r.id == visit_id)
    }

    pub fn status_of(&self, visit_id: Uuid) -> Option<VisitStatus> {
        self.get(visit_id).map(|r| r.status)
    }

    fn set_status(&mut self, visit_id: Uuid, status: VisitStatus) -> bool {
        match self.records.iter_mut().find(|r| r.id == visit_id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// 写入权威记录，不在视图中时追加
    pub fn upsert(&mut self, record: VisitRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn remove(&mut self, visit_id: Uuid) -> Option<VisitRecord> {
        let index = self.records.iter().position(|r| r.id == visit_id)?;
        Some(self.records.remove(index))
    }
}

/// 乐观状态变更命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticStatusChange {
    pub visit_id: Uuid,
    pub previous: VisitStatus,
    pub next: VisitStatus,
}

impl OptimisticStatusChange {
    pub fn new(visit_id: Uuid, previous: VisitStatus, next: VisitStatus) -> Self {
        Self {
            visit_id,
            previous,
            next,
        }
    }

    /// 在本地视图应用新状态
    pub fn apply(&self, view: &mut LocalVisitView) -> Result<()> {
        if view.set_status(self.visit_id, self.next) {
            Ok(())
        } else {
            Err(ClinicError::NotFound(format!("Visit {} not in local view", self.visit_id)))
        }
    }

    /// 回滚到原状态；若期间已被其他更新覆盖则保持不动
    pub fn revert(&self, view: &mut LocalVisitView) {
        if view.status_of(self.visit_id) == Some(self.next) {
            view.set_status(self.visit_id, self.previous);
        }
    }

    /// 提交给协作方
    pub async fn commit(&self, api: &dyn ClinicApi) -> Result<VisitRecord> {
        api.update_status(self.visit_id, self.next).await
    }

    /// 限时提交，超时按网络错误处理
    pub async fn commit_within(&self, api: &dyn ClinicApi, timeout: Duration) -> Result<VisitRecord> {
        match tokio::time::timeout(timeout, self.commit(api)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClinicError::Network(format!(
                "Status update for visit {} timed out after {:?}",
                self.visit_id, timeout
            ))),
        }
    }

    /// 应用、提交并根据结果对账或回滚
    pub async fn run(
        &self,
        api: &dyn ClinicApi,
        view: &RwLock<LocalVisitView>,
        timeout: Duration,
    ) -> Result<VisitRecord> {
        {
            let mut view = view.write().await;
            self.apply(&mut view)?;
        }
        debug!(
            "Applied optimistic status {:?} -> {:?} for visit {}",
            self.previous, self.next, self.visit_id
        );

        let outcome = self.commit_within(api, timeout).await;

        let mut view = view.write().await;
        match outcome {
            Ok(record) => {
                view.upsert(record.clone());
                Ok(record)
            }
            Err(ClinicError::NotFound(message)) => {
                warn!("Visit {} no longer exists, dropping from view", self.visit_id);
                view.remove(self.visit_id);
                Err(ClinicError::NotFound(message))
            }
            Err(e) => {
                warn!("Status update for visit {} failed, reverting: {}", self.visit_id, e);
                self.revert(&mut view);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::sample_record;
    use crate::test_support::FaultyClinicApi;
    use chrono::TimeZone;
    use clinic_core::{FixedClock, Priority};
    use std::sync::Arc;

    async fn setup() -> (Arc<FaultyClinicApi>, RwLock<LocalVisitView>, Uuid) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let api = Arc::new(FaultyClinicApi::new(Arc::new(FixedClock::new(now))));
        let record = sample_record("A-1", Priority::Normal, now);
        let visit_id = record.id;
        api.insert_visit(record.clone()).await;

        let mut view = LocalVisitView::new();
        view.replace(record.date, vec![record], now);
        (api, RwLock::new(view), visit_id)
    }

    #[tokio::test]
    async fn test_successful_commit_reconciles_view() {
        let (api, view, visit_id) = setup().await;
        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::CheckedIn);

        let record = change.run(&*api, &view, DEFAULT_COMMIT_TIMEOUT).await.unwrap();
        assert_eq!(record.status, VisitStatus::CheckedIn);
        assert_eq!(view.read().await.status_of(visit_id), Some(VisitStatus::CheckedIn));
    }

    #[tokio::test]
    async fn test_failed_commit_reverts_view() {
        let (api, view, visit_id) = setup().await;
        api.fail_next_updates(1);
        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::Cancelled);

        let err = change.run(&*api, &view, DEFAULT_COMMIT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ClinicError::Network(_)));
        assert_eq!(view.read().await.status_of(visit_id), Some(VisitStatus::Waiting));
        assert_eq!(api.visit(visit_id).await.unwrap().status, VisitStatus::Waiting);
    }

    #[tokio::test]
    async fn test_stalled_commit_times_out_and_reverts() {
        let (api, view, visit_id) = setup().await;
        api.stall_updates();
        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::CheckedIn);

        let err = change.run(&*api, &view, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ClinicError::Network(_)));
        assert!(err.is_recoverable());
        assert_eq!(view.read().await.status_of(visit_id), Some(VisitStatus::Waiting));
        assert_eq!(api.visit(visit_id).await.unwrap().status, VisitStatus::Waiting);
    }

    #[tokio::test]
    async fn test_server_rejection_reverts_view() {
        let (api, view, visit_id) = setup().await;
        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::Completed);

        let err = change.run(&*api, &view, DEFAULT_COMMIT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ClinicError::InvalidTransition { .. }));
        assert_eq!(view.read().await.status_of(visit_id), Some(VisitStatus::Waiting));
    }

    #[tokio::test]
    async fn test_deleted_record_is_dropped_from_view() {
        let (api, view, visit_id) = setup().await;
        api.remove_visit(visit_id).await;
        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::CheckedIn);

        let err = change.run(&*api, &view, DEFAULT_COMMIT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ClinicError::NotFound(_)));
        assert!(view.read().await.get(visit_id).is_none());
    }

    #[test]
    fn test_revert_leaves_newer_state_alone() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let record = sample_record("A-1", Priority::Normal, now);
        let visit_id = record.id;
        let mut view = LocalVisitView::new();
        view.replace(record.date, vec![record], now);

        let change = OptimisticStatusChange::new(visit_id, VisitStatus::Waiting, VisitStatus::CheckedIn);
        change.apply(&mut view).unwrap();
        view.set_status(visit_id, VisitStatus::WithDoctor);
        change.revert(&mut view);

        assert_eq!(view.status_of(visit_id), Some(VisitStatus::WithDoctor));
    }
}
