//! 就诊状态机
//!
//! 管理就诊记录从候诊到完成/取消的状态转换，以及各角色可触发的操作

use crate::error::{ClinicError, Result};
use crate::models::VisitStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VisitEvent {
    CheckIn,      // 前台签到
    SendToDoctor, // 从候诊队列直接送诊
    CallIn,       // 医生叫号
    Cancel,       // 取消
    Conclude,     // 就诊结束
}

/// 操作人角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Receptionist,
    Doctor,
    Admin,
}

/// 就诊状态机
#[derive(Debug)]
pub struct VisitStateMachine {
    transitions: HashMap<(VisitStatus, VisitEvent), VisitStatus>,
    permissions: HashMap<VisitEvent, Vec<StaffRole>>,
}

impl VisitStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((VisitStatus::Waiting, VisitEvent::CheckIn), VisitStatus::CheckedIn);
        transitions.insert((VisitStatus::Waiting, VisitEvent::SendToDoctor), VisitStatus::WithDoctor);
        transitions.insert((VisitStatus::CheckedIn, VisitEvent::CallIn), VisitStatus::WithDoctor);
        transitions.insert((VisitStatus::Waiting, VisitEvent::Cancel), VisitStatus::Cancelled);
        transitions.insert((VisitStatus::CheckedIn, VisitEvent::Cancel), VisitStatus::Cancelled);
        transitions.insert((VisitStatus::WithDoctor, VisitEvent::Cancel), VisitStatus::Cancelled);
        transitions.insert((VisitStatus::WithDoctor, VisitEvent::Conclude), VisitStatus::Completed);

        let mut permissions = HashMap::new();
        permissions.insert(VisitEvent::CheckIn, vec![StaffRole::Receptionist, StaffRole::Admin]);
        permissions.insert(VisitEvent::SendToDoctor, vec![StaffRole::Receptionist, StaffRole::Admin]);
        permissions.insert(
            VisitEvent::CallIn,
            vec![StaffRole::Doctor, StaffRole::Receptionist, StaffRole::Admin],
        );
        permissions.insert(
            VisitEvent::Cancel,
            vec![StaffRole::Receptionist, StaffRole::Doctor, StaffRole::Admin],
        );
        permissions.insert(VisitEvent::Conclude, vec![StaffRole::Doctor, StaffRole::Admin]);

        Self { transitions, permissions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: VisitStatus, event: VisitEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: VisitStatus, event: VisitEvent) -> Result<VisitStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(ClinicError::InvalidTransition {
                from: from.to_string(),
                to: format!("{:?}", event),
            }),
        }
    }

    /// 根据起止状态找出对应事件
    pub fn event_between(&self, from: VisitStatus, to: VisitStatus) -> Option<VisitEvent> {
        self.transitions
            .iter()
            .find(|((state, _), target)| *state == from && **target == to)
            .map(|((_, event), _)| *event)
    }

    /// 校验从 `from` 直接到 `to` 是否合法
    pub fn validate(&self, from: VisitStatus, to: VisitStatus) -> Result<VisitEvent> {
        self.event_between(from, to).ok_or_else(|| ClinicError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// 校验角色是否可以触发事件
    pub fn authorize(&self, event: VisitEvent, role: StaffRole) -> Result<()> {
        let allowed = self
            .permissions
            .get(&event)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false);

        if allowed {
            Ok(())
        } else {
            Err(ClinicError::Permission(format!(
                "{:?} may not trigger {:?}",
                role, event
            )))
        }
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: VisitStatus) -> Vec<VisitEvent> {
        let mut events: Vec<VisitEvent> = self
            .transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect();
        events.sort_by_key(|event| *event as u8);
        events
    }
}

impl Default for VisitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
