//! # 诊所前台工作流模块
//!
//! 提供前台核心流程，包括：
//! - 候诊队列引擎：急诊优先、先到先诊的排序与候诊时长分级
//! - 挂号收费流程：录入、收费确认、出号三阶段
//! - 乐观状态更新：本地先行、失败回滚
//! - 队列监控：定时刷新并对超时候诊告警

pub mod chart;
pub mod desk;
pub mod monitor;
pub mod optimistic;
pub mod queue;
pub mod registration;

#[cfg(test)]
mod test_support;

// 重新导出主要类型
pub use chart::{status_segments, ChartSegment, StatusCounts};
pub use desk::{DeskOverview, ReceptionDesk};
pub use monitor::{QueueMonitor, QueueSnapshot};
pub use optimistic::{LocalVisitView, OptimisticStatusChange, DEFAULT_COMMIT_TIMEOUT};
pub use queue::{
    order_queue, summarize, wait_minutes, QueueEngine, QueueEntry, QueueSummary, WaitBand,
    DEFAULT_REFRESH_INTERVAL, NORMAL_WAIT_LIMIT_MINUTES, WARNING_WAIT_LIMIT_MINUTES,
};
pub use registration::{
    IntakeWarning, PatientIntake, PaymentSummary, Receipt, ReceiptPrinter, RegistrationStage,
    RegistrationWorkflow, VisitDraft, DEFAULT_REGISTRATION_CHARGE,
};
pub use clinic_core::state_machine::{StaffRole, VisitEvent, VisitStateMachine};
