//! 内存协作方实现
//!
//! 以服务端的方式执行各项约束：状态机校验、同日排队号唯一、
//! 按提交ID去重、医生与科室的引用关系。

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::utils::{format_token, non_blank};
use clinic_core::{
    Amount, ClinicApi, ClinicError, Clock, CreatedVisit, Doctor, NewVisit, Result, VisitRecord,
    VisitStateMachine, VisitStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreState {
    visits: HashMap<Uuid, VisitRecord>,
    visit_order: Vec<Uuid>,
    doctors: Vec<Doctor>,
    daily_sequences: HashMap<NaiveDate, u32>,
    submissions: HashMap<Uuid, CreatedVisit>,
}

/// 内存就诊记录存储
#[derive(Debug)]
pub struct InMemoryClinicStore {
    clock: Arc<dyn Clock>,
    state_machine: VisitStateMachine,
    state: RwLock<StoreState>,
}

impl InMemoryClinicStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_doctors(clock, Vec::new())
    }

    /// 预置医生目录
    pub fn with_doctors(clock: Arc<dyn Clock>, doctors: Vec<Doctor>) -> Self {
        Self {
            clock,
            state_machine: VisitStateMachine::new(),
            state: RwLock::new(StoreState {
                doctors,
                ..Default::default()
            }),
        }
    }

    /// 登记医生
    pub async fn add_doctor(&self, name: &str, department: &str, fee: Option<Amount>) -> Result<Doctor> {
        let (name, department) = match (non_blank(name), non_blank(department)) {
            (Some(name), Some(department)) => (name, department),
            _ => return Err(ClinicError::Validation("Doctor name and department are required".to_string())),
        };

        let doctor = Doctor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            department: department.to_string(),
            fee,
        };
        self.state.write().await.doctors.push(doctor.clone());
        info!("Added doctor {} to {}", doctor.name, doctor.department);
        Ok(doctor)
    }

    /// 调整医生诊费，已创建的就诊记录不受影响
    pub async fn update_doctor_fee(&self, doctor_id: Uuid, fee: Option<Amount>) -> Result<Doctor> {
        let mut state = self.state.write().await;
        let doctor = state
            .doctors
            .iter_mut()
            .find(|d| d.id == doctor_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Doctor {} not found", doctor_id)))?;
        doctor.fee = fee;
        Ok(doctor.clone())
    }

    pub async fn visit_count(&self) -> usize {
        self.state.read().await.visits.len()
    }

    /// 导入已有就诊记录，同ID覆盖
    ///
    /// 当日排队号计数推进到导入记录中的最大序号之后，新号不会与之重复。
    pub async fn restore(&self, records: Vec<VisitRecord>) {
        let mut state = self.state.write().await;
        for record in records {
            if let Some(sequence) = token_sequence(&record.token) {
                let counter = state.daily_sequences.entry(record.date).or_insert(0);
                *counter = (*counter).max(sequence);
            }
            if !state.visits.contains_key(&record.id) {
                state.visit_order.push(record.id);
            }
            debug!("Restored visit {} ({})", record.id, record.token);
            state.visits.insert(record.id, record);
        }
    }
}

fn token_sequence(token: &str) -> Option<u32> {
    token.rsplit('-').next()?.parse().ok()
}

#[async_trait]
impl ClinicApi for InMemoryClinicStore {
    async fn list_visits(&self, date: NaiveDate) -> Result<Vec<VisitRecord>> {
        let state = self.state.read().await;
        Ok(state
            .visit_order
            .iter()
            .filter_map(|id| state.visits.get(id))
            .filter(|visit| visit.date == date)
            .cloned()
            .collect())
    }

    async fn get_visit(&self, visit_id: Uuid) -> Result<VisitRecord> {
        self.state
            .read()
            .await
            .visits
            .get(&visit_id)
            .cloned()
            .ok_or_else(|| ClinicError::NotFound(format!("Visit {} not found", visit_id)))
    }

    async fn list_doctors(&self, department: Option<&str>) -> Result<Vec<Doctor>> {
        let state = self.state.read().await;
        Ok(state
            .doctors
            .iter()
            .filter(|doctor| department.map_or(true, |dept| doctor.department == dept))
            .cloned()
            .collect())
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<CreatedVisit> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.submissions.get(&visit.submission_id) {
            debug!("Duplicate submission {} returns token {}", visit.submission_id, existing.token);
            return Ok(existing.clone());
        }

        if non_blank(visit.patient.name()).is_none() || non_blank(visit.patient.contact()).is_none() {
            return Err(ClinicError::Validation("Patient name and contact are required".to_string()));
        }

        let doctor = state
            .doctors
            .iter()
            .find(|d| d.id == visit.doctor_id)
            .ok_or_else(|| ClinicError::Referential(format!("Doctor {} is not in the directory", visit.doctor_id)))?;
        if doctor.department != visit.department {
            return Err(ClinicError::Referential(format!(
                "Doctor {} does not belong to department {}",
                doctor.name, visit.department
            )));
        }
        let doctor_name = doctor.name.clone();

        let now = self.clock.now();
        let date = now.date_naive();
        let sequence = {
            let counter = state.daily_sequences.entry(date).or_insert(0);
            *counter += 1;
            *counter
        };

        let record = VisitRecord {
            id: Uuid::new_v4(),
            token: format_token(visit.priority, sequence),
            patient: visit.patient,
            visit_type: visit.visit_type,
            priority: visit.priority,
            doctor_id: visit.doctor_id,
            assigned_doctor: doctor_name,
            department: visit.department,
            consultation_fee: visit.consultation_fee,
            registration_charge: visit.registration_charge,
            status: VisitStatus::Waiting,
            check_in_time: now,
            date,
            symptoms: visit.symptoms,
            created_at: now,
            updated_at: now,
        };
        let created = CreatedVisit {
            token: record.token.clone(),
            visit_id: record.id,
        };

        info!(
            "Created visit {} with token {} for {}",
            record.id,
            record.token,
            record.patient_name()
        );
        state.visit_order.push(record.id);
        state.visits.insert(record.id, record);
        state.submissions.insert(visit.submission_id, created.clone());
        Ok(created)
    }

    async fn update_status(&self, visit_id: Uuid, status: VisitStatus) -> Result<VisitRecord> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let visit = state
            .visits
            .get_mut(&visit_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Visit {} not found", visit_id)))?;

        self.state_machine.validate(visit.status, status)?;
        info!("Visit {} status {:?} -> {:?}", visit_id, visit.status, status);
        visit.status = status;
        visit.updated_at = now;
        Ok(visit.clone())
    }

    async fn delete_visit(&self, visit_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.visits.remove(&visit_id).is_none() {
            return Err(ClinicError::NotFound(format!("Visit {} not found", visit_id)));
        }
        state.visit_order.retain(|id| *id != visit_id);
        state.submissions.retain(|_, created| created.visit_id != visit_id);
        info!("Deleted visit {}", visit_id);
        Ok(())
    }
}
