//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 金额（整数货币单位）
pub type Amount = u64;

/// 应付总额：诊费 + 挂号费
///
/// 所有计算应付金额的路径都必须经过此函数。
pub fn total_payable(consultation_fee: Amount, registration_charge: Amount) -> Amount {
    consultation_fee.saturating_add(registration_charge)
}

/// 就诊渠道
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VisitType {
    WalkIn,    // 现场挂号
    Online,    // 线上预约
    Emergency, // 急诊通道
}

/// 排队优先级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    Normal,
    Emergency,
}

impl Priority {
    /// 排序权重，数值越小越靠前
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Emergency => 0,
            Priority::Normal => 1,
        }
    }
}

/// 就诊状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VisitStatus {
    Waiting,    // 候诊
    CheckedIn,  // 已签到
    WithDoctor, // 就诊中
    Cancelled,  // 已取消
    Completed,  // 已完成
}

impl VisitStatus {
    /// 终止状态不允许任何转换
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Cancelled | VisitStatus::Completed)
    }

    pub fn all() -> [VisitStatus; 5] {
        [
            VisitStatus::Waiting,
            VisitStatus::CheckedIn,
            VisitStatus::WithDoctor,
            VisitStatus::Cancelled,
            VisitStatus::Completed,
        ]
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// 就诊对象类别（仅作信息展示）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitCategory {
    Human,
    Pet,
}

/// 患者信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category")]
pub enum Patient {
    Human {
        name: String,
        age: u8,
        gender: Gender,
        contact: String,
        address: String,
    },
    Pet {
        name: String,
        species: String,
        breed: Option<String>,
        age: u8,
        gender: Gender,
        owner_name: String,
        contact: String,
        address: String,
    },
}

impl Patient {
    pub fn name(&self) -> &str {
        match self {
            Patient::Human { name, .. } | Patient::Pet { name, .. } => name,
        }
    }

    /// 联系电话（宠物为主人的联系方式）
    pub fn contact(&self) -> &str {
        match self {
            Patient::Human { contact, .. } | Patient::Pet { contact, .. } => contact,
        }
    }

    pub fn category(&self) -> VisitCategory {
        match self {
            Patient::Human { .. } => VisitCategory::Human,
            Patient::Pet { .. } => VisitCategory::Pet,
        }
    }
}

/// 医生目录条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub department: String,
    pub fee: Option<Amount>, // 目录中未登记诊费时为空
}

/// 就诊记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    pub id: Uuid,
    pub token: String,
    pub patient: Patient,
    pub visit_type: VisitType,
    pub priority: Priority,
    pub doctor_id: Uuid,
    pub assigned_doctor: String,
    pub department: String,
    pub consultation_fee: Amount,
    pub registration_charge: Amount,
    pub status: VisitStatus,
    pub check_in_time: DateTime<Utc>,
    pub date: NaiveDate,
    pub symptoms: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VisitRecord {
    pub fn patient_name(&self) -> &str {
        self.patient.name()
    }

    pub fn contact(&self) -> &str {
        self.patient.contact()
    }

    pub fn total_payable(&self) -> Amount {
        total_payable(self.consultation_fee, self.registration_charge)
    }

    pub fn is_waiting(&self) -> bool {
        self.status == VisitStatus::Waiting
    }
}

/// 挂号提交内容（收费确认时提交给协作方）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewVisit {
    /// 同一次确认操作的重试共用此ID，用于去重
    pub submission_id: Uuid,
    pub patient: Patient,
    pub visit_type: VisitType,
    pub priority: Priority,
    pub doctor_id: Uuid,
    pub assigned_doctor: String,
    pub department: String,
    pub consultation_fee: Amount,
    pub registration_charge: Amount,
    pub symptoms: Option<String>,
}

/// 挂号成功后协作方返回的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedVisit {
    pub token: String,
    pub visit_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_payable() {
        assert_eq!(total_payable(500, 100), 600);
        assert_eq!(total_payable(0, 100), 100);
        assert_eq!(total_payable(Amount::MAX, 1), Amount::MAX);
    }

    #[test]
    fn test_terminal_states() {
        assert!(VisitStatus::Cancelled.is_terminal());
        assert!(VisitStatus::Completed.is_terminal());
        assert!(!VisitStatus::Waiting.is_terminal());
        assert!(!VisitStatus::WithDoctor.is_terminal());
    }

    #[test]
    fn test_patient_serializes_with_category_tag() {
        let pet = Patient::Pet {
            name: "Bruno".to_string(),
            species: "Dog".to_string(),
            breed: Some("Labrador".to_string()),
            age: 4,
            gender: Gender::Male,
            owner_name: "Kiran Shah".to_string(),
            contact: "9876543210".to_string(),
            address: "12 MG Road".to_string(),
        };

        let value = serde_json::to_value(&pet).unwrap();
        assert_eq!(value["category"], "Pet");
        assert_eq!(pet.contact(), "9876543210");
        assert_eq!(pet.category(), VisitCategory::Pet);
    }
}
