//! 前台工作台
//!
//! 协调状态机、队列引擎、挂号流程和本地视图，提供统一的前台操作接口

use chrono::NaiveDate;
use clinic_core::{Amount, ClinicApi, ClinicError, Clock, Result, VisitRecord, VisitStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chart::{status_segments, ChartSegment, StatusCounts};
use crate::optimistic::{LocalVisitView, OptimisticStatusChange, DEFAULT_COMMIT_TIMEOUT};
use crate::queue::{summarize, QueueEngine, QueueEntry, QueueSummary};
use crate::registration::RegistrationWorkflow;
use clinic_core::state_machine::{StaffRole, VisitEvent, VisitStateMachine};

/// 前台工作台
///
/// 本地视图只用于展示；每次修改前都先向协作方重新读取记录。
pub struct ReceptionDesk {
    api: Arc<dyn ClinicApi>,
    clock: Arc<dyn Clock>,
    state_machine: VisitStateMachine,
    queue_engine: QueueEngine,
    view: Arc<RwLock<LocalVisitView>>,
    registration_charge: Amount,
    commit_timeout: Duration,
}

impl ReceptionDesk {
    /// 创建新的前台工作台
    pub fn new(api: Arc<dyn ClinicApi>, clock: Arc<dyn Clock>, registration_charge: Amount) -> Self {
        Self {
            queue_engine: QueueEngine::new(clock.clone()),
            api,
            clock,
            state_machine: VisitStateMachine::new(),
            view: Arc::new(RwLock::new(LocalVisitView::new())),
            registration_charge,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }

    pub fn with_commit_timeout(mut self, commit_timeout: Duration) -> Self {
        self.commit_timeout = commit_timeout;
        self
    }

    /// 开始一次新的挂号
    pub fn start_registration(&self) -> RegistrationWorkflow {
        RegistrationWorkflow::new(self.api.clone(), self.clock.clone(), self.registration_charge)
    }

    /// 从协作方拉取当天记录并替换本地视图
    pub async fn refresh(&self) -> Result<Vec<VisitRecord>> {
        let date = self.clock.today();
        self.refresh_date(date).await
    }

    pub async fn refresh_date(&self, date: NaiveDate) -> Result<Vec<VisitRecord>> {
        let records = self.api.list_visits(date).await?;
        self.view.write().await.replace(date, records.clone(), self.clock.now());
        Ok(records)
    }

    /// 刷新后返回排序好的候诊队列
    pub async fn live_queue(&self) -> Result<Vec<QueueEntry>> {
        let records = self.refresh().await?;
        Ok(self.queue_engine.order(&records))
    }

    /// 基于本地视图（含未确认的乐观更新）的队列
    pub async fn displayed_queue(&self) -> Vec<QueueEntry> {
        let view = self.view.read().await;
        self.queue_engine.order(view.records())
    }

    /// 当日概览
    pub async fn overview(&self) -> DeskOverview {
        let view = self.view.read().await;
        let counts = StatusCounts::from_records(view.records());
        let queue = self.queue_engine.order(view.records());
        DeskOverview {
            date: view.date(),
            counts,
            segments: status_segments(&counts),
            queue: summarize(&queue),
        }
    }

    /// 签到
    pub async fn check_in(&self, visit_id: Uuid, role: StaffRole) -> Result<VisitRecord> {
        self.trigger(visit_id, VisitEvent::CheckIn, role).await
    }

    /// 从候诊队列直接送诊
    pub async fn send_to_doctor(&self, visit_id: Uuid, role: StaffRole) -> Result<VisitRecord> {
        self.trigger(visit_id, VisitEvent::SendToDoctor, role).await
    }

    /// 已签到患者进入诊室
    pub async fn call_in(&self, visit_id: Uuid, role: StaffRole) -> Result<VisitRecord> {
        self.trigger(visit_id, VisitEvent::CallIn, role).await
    }

    pub async fn cancel(&self, visit_id: Uuid, role: StaffRole) -> Result<VisitRecord> {
        self.trigger(visit_id, VisitEvent::Cancel, role).await
    }

    pub async fn complete(&self, visit_id: Uuid, role: StaffRole) -> Result<VisitRecord> {
        self.trigger(visit_id, VisitEvent::Conclude, role).await
    }

    /// 按事件触发状态转换
    pub async fn trigger(&self, visit_id: Uuid, event: VisitEvent, role: StaffRole) -> Result<VisitRecord> {
        self.state_machine.authorize(event, role)?;
        let current = self.reload(visit_id).await?;
        let next = self.state_machine.transition(current.status, event)?;
        self.commit_change(current, next).await
    }

    /// 直接指定目标状态
    pub async fn update_status(&self, visit_id: Uuid, target: VisitStatus, role: StaffRole) -> Result<VisitRecord> {
        let current = self.reload(visit_id).await?;
        let event = self.state_machine.validate(current.status, target)?;
        self.state_machine.authorize(event, role)?;
        self.commit_change(current, target).await
    }

    /// 删除错误录入的记录
    pub async fn remove_erroneous(&self, visit_id: Uuid, role: StaffRole) -> Result<()> {
        if role == StaffRole::Doctor {
            return Err(ClinicError::Permission("Doctors may not delete visits".to_string()));
        }
        let result = self.api.delete_visit(visit_id).await;
        if matches!(result, Ok(()) | Err(ClinicError::NotFound(_))) {
            self.view.write().await.remove(visit_id);
        }
        if result.is_ok() {
            info!("Deleted erroneous visit {}", visit_id);
        }
        result
    }

    /// 本地视图句柄
    pub fn view(&self) -> Arc<RwLock<LocalVisitView>> {
        self.view.clone()
    }

    pub fn state_machine(&self) -> &VisitStateMachine {
        &self.state_machine
    }

    pub fn queue_engine(&self) -> &QueueEngine {
        &self.queue_engine
    }

    /// 重新读取记录，属于视图当前日期时同步到本地视图
    async fn reload(&self, visit_id: Uuid) -> Result<VisitRecord> {
        match self.api.get_visit(visit_id).await {
            Ok(record) => {
                let mut view = self.view.write().await;
                if view.date() == Some(record.date) {
                    view.upsert(record.clone());
                }
                Ok(record)
            }
            Err(ClinicError::NotFound(message)) => {
                warn!("Visit {} disappeared, dropping from view", visit_id);
                self.view.write().await.remove(visit_id);
                Err(ClinicError::NotFound(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn commit_change(&self, current: VisitRecord, next: VisitStatus) -> Result<VisitRecord> {
        let change = OptimisticStatusChange::new(current.id, current.status, next);
        let displayed = self.view.read().await.get(current.id).is_some();
        let record = if displayed {
            change.run(self.api.as_ref(), &self.view, self.commit_timeout).await?
        } else {
            // 不在当前视图中的记录（如其他日期）直接提交
            change.commit_within(self.api.as_ref(), self.commit_timeout).await?
        };
        info!(
            "Visit {} (token {}) moved from {:?} to {:?}",
            record.id, record.token, current.status, record.status
        );
        Ok(record)
    }
}

/// 当日概览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskOverview {
    pub date: Option<NaiveDate>,
    pub counts: StatusCounts,
    pub segments: Vec<ChartSegment>,
    pub queue: QueueSummary,
}
