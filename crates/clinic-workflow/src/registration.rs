//! 现场挂号与收费流程
//!
//! 三个依次推进的阶段：录入 → 收费确认 → 出号。
//! 中间数据保存在同一份草稿中，取消即丢弃，只有收费确认成功后才形成就诊记录。

use chrono::{DateTime, Utc};
use clinic_core::utils::{is_valid_contact, non_blank};
use clinic_core::{
    total_payable, Amount, ClinicApi, ClinicError, Clock, Doctor, Gender, NewVisit, Patient,
    Priority, Result, VisitCategory, VisitRecord, VisitType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 默认挂号费
pub const DEFAULT_REGISTRATION_CHARGE: Amount = 100;

/// 年龄上限
pub const MAX_AGE: u8 = 150;

/// 挂号阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegistrationStage {
    Intake,       // 信息录入
    Payment,      // 收费确认
    Confirmation, // 出号
}

/// 录入阶段的提示（不阻止推进，但必须展示给操作员）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntakeWarning {
    /// 医生目录未登记诊费，按0计费
    MissingFee { doctor: String },
    /// 急诊渠道但优先级仍为普通
    EmergencyVisitNormalPriority,
}

/// 患者录入信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIntake {
    pub category: VisitCategory,
    pub name: String,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub contact: String,
    pub address: String,
    /// 以下仅宠物就诊使用
    pub species: String,
    pub breed: Option<String>,
    pub owner_name: String,
}

impl Default for PatientIntake {
    fn default() -> Self {
        Self {
            category: VisitCategory::Human,
            name: String::new(),
            age: None,
            gender: None,
            contact: String::new(),
            address: String::new(),
            species: String::new(),
            breed: None,
            owner_name: String::new(),
        }
    }
}

impl PatientIntake {
    /// 校验并生成患者信息，一次性报告所有缺失字段
    fn build(&self, missing: &mut Vec<String>) -> Option<Patient> {
        let name = non_blank(&self.name);
        let contact = non_blank(&self.contact);
        let address = non_blank(&self.address);

        if name.is_none() {
            missing.push("patient_name".to_string());
        }
        if self.age.is_none() {
            missing.push("age".to_string());
        }
        if self.gender.is_none() {
            missing.push("gender".to_string());
        }
        if contact.is_none() {
            missing.push("contact".to_string());
        }
        if address.is_none() {
            missing.push("address".to_string());
        }

        let (species, owner_name) = match self.category {
            VisitCategory::Human => (None, None),
            VisitCategory::Pet => {
                let species = non_blank(&self.species);
                let owner_name = non_blank(&self.owner_name);
                if species.is_none() {
                    missing.push("species".to_string());
                }
                if owner_name.is_none() {
                    missing.push("owner_name".to_string());
                }
                (species, owner_name)
            }
        };

        let (name, age, gender, contact, address) =
            (name?, self.age?, self.gender?, contact?, address?);

        let patient = match self.category {
            VisitCategory::Human => Patient::Human {
                name: name.to_string(),
                age,
                gender,
                contact: contact.to_string(),
                address: address.to_string(),
            },
            VisitCategory::Pet => Patient::Pet {
                name: name.to_string(),
                species: species?.to_string(),
                breed: self.breed.as_deref().and_then(non_blank).map(str::to_string),
                age,
                gender,
                owner_name: owner_name?.to_string(),
                contact: contact.to_string(),
                address: address.to_string(),
            },
        };
        Some(patient)
    }
}

/// 挂号草稿
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitDraft {
    pub patient: PatientIntake,
    pub visit_type: VisitType,
    pub priority: Priority,
    pub symptoms: String,
    department: Option<String>,
    doctor: Option<Doctor>,
    consultation_fee: Option<Amount>,
}

impl Default for VisitDraft {
    fn default() -> Self {
        Self {
            patient: PatientIntake::default(),
            visit_type: VisitType::WalkIn,
            priority: Priority::Normal,
            symptoms: String::new(),
            department: None,
            doctor: None,
            consultation_fee: None,
        }
    }
}

impl VisitDraft {
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn doctor(&self) -> Option<&Doctor> {
        self.doctor.as_ref()
    }

    /// 选定医生时冻结的诊费
    pub fn consultation_fee(&self) -> Option<Amount> {
        self.consultation_fee
    }
}

/// 收费确认信息
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentSummary {
    pub consultation_fee: Amount,
    pub registration_charge: Amount,
    pub total: Amount,
}

/// 挂号凭条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub visit_id: Uuid,
    pub token: String,
    pub patient_name: String,
    pub doctor: String,
    pub department: String,
    pub consultation_fee: Amount,
    pub registration_charge: Amount,
    pub total: Amount,
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    fn from_payload(visit: &NewVisit, visit_id: Uuid, token: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            visit_id,
            token,
            patient_name: visit.patient.name().to_string(),
            doctor: visit.assigned_doctor.clone(),
            department: visit.department.clone(),
            consultation_fee: visit.consultation_fee,
            registration_charge: visit.registration_charge,
            total: total_payable(visit.consultation_fee, visit.registration_charge),
            issued_at,
        }
    }

    fn from_record(record: &VisitRecord, token: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            visit_id: record.id,
            token,
            patient_name: record.patient_name().to_string(),
            doctor: record.assigned_doctor.clone(),
            department: record.department.clone(),
            consultation_fee: record.consultation_fee,
            registration_charge: record.registration_charge,
            total: record.total_payable(),
            issued_at,
        }
    }
}

/// 凭条打印协作方
pub trait ReceiptPrinter: Send + Sync {
    fn print(&self, receipt: &Receipt) -> Result<()>;
}

/// 挂号收费流程
pub struct RegistrationWorkflow {
    api: Arc<dyn ClinicApi>,
    clock: Arc<dyn Clock>,
    registration_charge: Amount,
    stage: RegistrationStage,
    draft: VisitDraft,
    doctors: Vec<Doctor>,
    /// 本次挂号的提交ID，取消或完成后才更换
    submission_id: Uuid,
    pending: Option<NewVisit>,
    /// 首次发出的提交内容，结果未知时用于核对
    first_attempt: Option<NewVisit>,
    receipt: Option<Receipt>,
}

impl RegistrationWorkflow {
    /// 创建新的挂号流程
    pub fn new(api: Arc<dyn ClinicApi>, clock: Arc<dyn Clock>, registration_charge: Amount) -> Self {
        Self {
            api,
            clock,
            registration_charge,
            stage: RegistrationStage::Intake,
            draft: VisitDraft::default(),
            doctors: Vec::new(),
            submission_id: Uuid::new_v4(),
            pending: None,
            first_attempt: None,
            receipt: None,
        }
    }

    pub fn stage(&self) -> RegistrationStage {
        self.stage
    }

    pub fn draft(&self) -> &VisitDraft {
        &self.draft
    }

    /// 录入阶段可编辑草稿
    pub fn draft_mut(&mut self) -> Result<&mut VisitDraft> {
        self.expect_stage(RegistrationStage::Intake)?;
        Ok(&mut self.draft)
    }

    pub fn registration_charge(&self) -> Amount {
        self.registration_charge
    }

    /// 当前科室可选医生
    pub fn available_doctors(&self) -> &[Doctor] {
        &self.doctors
    }

    /// 选择科室并加载该科室医生，已选医生随之清空
    pub async fn select_department(&mut self, department: &str) -> Result<&[Doctor]> {
        self.expect_stage(RegistrationStage::Intake)?;
        let department = non_blank(department)
            .ok_or_else(|| ClinicError::MissingFields(vec!["department".to_string()]))?
            .to_string();

        let doctors: Vec<Doctor> = self
            .api
            .list_doctors(Some(&department))
            .await?
            .into_iter()
            .filter(|doctor| doctor.department == department)
            .collect();

        self.draft.doctor = None;
        self.draft.consultation_fee = None;

        if doctors.is_empty() {
            self.draft.department = None;
            self.doctors.clear();
            return Err(ClinicError::Referential(format!(
                "No doctors available in department {}",
                department
            )));
        }

        debug!("Loaded {} doctors for department {}", doctors.len(), department);
        self.draft.department = Some(department);
        self.doctors = doctors;
        Ok(&self.doctors)
    }

    /// 选择医生并冻结诊费
    pub fn select_doctor(&mut self, doctor_id: Uuid) -> Result<&Doctor> {
        self.expect_stage(RegistrationStage::Intake)?;
        let department = self
            .draft
            .department
            .as_deref()
            .ok_or_else(|| ClinicError::Validation("Select a department before a doctor".to_string()))?;

        let doctor = self
            .doctors
            .iter()
            .find(|doctor| doctor.id == doctor_id)
            .cloned()
            .ok_or_else(|| {
                ClinicError::Referential(format!(
                    "Doctor {} does not belong to department {}",
                    doctor_id, department
                ))
            })?;

        let fee = match doctor.fee {
            Some(fee) => fee,
            None => {
                warn!("Doctor {} has no consultation fee on record, billing 0", doctor.name);
                0
            }
        };

        self.draft.consultation_fee = Some(fee);
        Ok(self.draft.doctor.insert(doctor))
    }

    /// 需要展示给操作员的提示
    pub fn warnings(&self) -> Vec<IntakeWarning> {
        let mut warnings = Vec::new();
        if let Some(doctor) = &self.draft.doctor {
            if doctor.fee.is_none() {
                warnings.push(IntakeWarning::MissingFee {
                    doctor: doctor.name.clone(),
                });
            }
        }
        if self.draft.visit_type == VisitType::Emergency && self.draft.priority == Priority::Normal {
            warnings.push(IntakeWarning::EmergencyVisitNormalPriority);
        }
        warnings
    }

    /// 校验录入信息并进入收费确认阶段
    ///
    /// 校验失败时不发起任何网络请求，也不产生记录。
    pub fn advance_to_payment(&mut self) -> Result<PaymentSummary> {
        self.expect_stage(RegistrationStage::Intake)?;

        let mut missing = Vec::new();
        let patient = self.draft.patient.build(&mut missing);
        if self.draft.department.is_none() {
            missing.push("department".to_string());
        }
        if self.draft.doctor.is_none() {
            missing.push("doctor".to_string());
        }
        if !missing.is_empty() {
            debug!("Registration blocked, missing fields: {:?}", missing);
            return Err(ClinicError::MissingFields(missing));
        }

        let patient = patient.ok_or_else(|| ClinicError::Internal("patient not built".to_string()))?;
        if !is_valid_contact(patient.contact()) {
            return Err(ClinicError::Validation(format!(
                "Contact {} is not a valid phone number",
                patient.contact()
            )));
        }
        if self.draft.patient.age.map_or(false, |age| age > MAX_AGE) {
            return Err(ClinicError::Validation(format!("Age must be between 0 and {}", MAX_AGE)));
        }

        let (department, doctor) = match (&self.draft.department, &self.draft.doctor) {
            (Some(department), Some(doctor)) => (department.clone(), doctor.clone()),
            _ => return Err(ClinicError::Internal("doctor selection lost".to_string())),
        };
        if doctor.department != department {
            return Err(ClinicError::Referential(format!(
                "Doctor {} does not belong to department {}",
                doctor.name, department
            )));
        }

        let new_visit = NewVisit {
            submission_id: self.submission_id,
            patient,
            visit_type: self.draft.visit_type,
            priority: self.draft.priority,
            doctor_id: doctor.id,
            assigned_doctor: doctor.name,
            department,
            consultation_fee: self.draft.consultation_fee.unwrap_or(0),
            registration_charge: self.registration_charge,
            symptoms: non_blank(&self.draft.symptoms).map(str::to_string),
        };

        let summary = summary_of(&new_visit);
        self.pending = Some(new_visit);
        self.stage = RegistrationStage::Payment;
        Ok(summary)
    }

    /// 收费确认信息，仅在收费阶段可用
    pub fn payment_summary(&self) -> Option<PaymentSummary> {
        match self.stage {
            RegistrationStage::Payment => self.pending.as_ref().map(summary_of),
            _ => None,
        }
    }

    /// 返回录入阶段修改，草稿保留
    pub fn back_to_intake(&mut self) -> Result<()> {
        self.expect_stage(RegistrationStage::Payment)?;
        self.pending = None;
        self.stage = RegistrationStage::Intake;
        Ok(())
    }

    /// 确认收费，成功后获得排队号
    ///
    /// 失败时停留在收费阶段且草稿不变。同一次挂号的所有尝试（包括返回修改后再次确认）
    /// 共用一个提交ID，协作方最多生成一条记录。
    pub async fn confirm_payment(&mut self) -> Result<&Receipt> {
        self.expect_stage(RegistrationStage::Payment)?;
        let visit = self
            .pending
            .clone()
            .ok_or_else(|| ClinicError::Internal("payment stage without pending visit".to_string()))?;
        let first_attempt = self.first_attempt.get_or_insert_with(|| visit.clone()).clone();

        let created = match self.api.create_visit(visit.clone()).await {
            Ok(created) => created,
            Err(e) => {
                warn!("Payment confirmation for {} failed: {}", visit.patient.name(), e);
                return Err(e);
            }
        };

        if non_blank(&created.token).is_none() {
            warn!("Visit {} created without a token", created.visit_id);
            return Err(ClinicError::Network("Billing service returned no token".to_string()));
        }

        info!(
            "Registered {} with token {} for {}",
            visit.patient.name(),
            created.token,
            visit.assigned_doctor
        );

        let issued_at = self.clock.now();
        let receipt = if first_attempt == visit {
            Receipt::from_payload(&visit, created.visit_id, created.token, issued_at)
        } else {
            // 草稿在结果未知的提交之后被修改，以协作方保存的内容为准
            match self.api.get_visit(created.visit_id).await {
                Ok(record) => Receipt::from_record(&record, created.token, issued_at),
                Err(e) => {
                    warn!("Could not re-read visit {} for the receipt: {}", created.visit_id, e);
                    Receipt::from_payload(&visit, created.visit_id, created.token, issued_at)
                }
            }
        };

        self.stage = RegistrationStage::Confirmation;
        self.pending = None;
        Ok(self.receipt.insert(receipt))
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    /// 打印凭条
    pub fn print_receipt(&self, printer: &dyn ReceiptPrinter) -> Result<()> {
        self.expect_stage(RegistrationStage::Confirmation)?;
        match &self.receipt {
            Some(receipt) => printer.print(receipt),
            None => Err(ClinicError::Internal("confirmation stage without receipt".to_string())),
        }
    }

    /// 完成挂号，返回凭条并重置流程
    pub fn finish(&mut self) -> Result<Receipt> {
        self.expect_stage(RegistrationStage::Confirmation)?;
        let receipt = self
            .receipt
            .take()
            .ok_or_else(|| ClinicError::Internal("confirmation stage without receipt".to_string()))?;
        self.reset();
        Ok(receipt)
    }

    /// 取消挂号，丢弃草稿
    pub fn cancel(&mut self) {
        debug!("Registration cancelled at stage {:?}", self.stage);
        self.reset();
    }

    fn reset(&mut self) {
        self.stage = RegistrationStage::Intake;
        self.draft = VisitDraft::default();
        self.doctors.clear();
        self.submission_id = Uuid::new_v4();
        self.pending = None;
        self.first_attempt = None;
        self.receipt = None;
    }

    fn expect_stage(&self, expected: RegistrationStage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ClinicError::Validation(format!(
                "Registration is at stage {:?}, expected {:?}",
                self.stage, expected
            )))
        }
    }
}

fn summary_of(visit: &NewVisit) -> PaymentSummary {
    PaymentSummary {
        consultation_fee: visit.consultation_fee,
        registration_charge: visit.registration_charge,
        total: total_payable(visit.consultation_fee, visit.registration_charge),
    }
}
