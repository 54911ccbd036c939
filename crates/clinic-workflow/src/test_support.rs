//! 测试用协作方：内存存储外包一层故障注入

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::{
    ClinicApi, ClinicError, Clock, CreatedVisit, Doctor, NewVisit, Result, VisitRecord, VisitStatus,
};
use clinic_store::InMemoryClinicStore;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub(crate) const CARDIOLOGY: &str = "Cardiology";

#[derive(Default)]
struct Faults {
    create_calls: usize,
    submission_log: Vec<Uuid>,
    fail_creates: usize,
    commit_then_fail_creates: usize,
    fail_updates: usize,
    stall_updates: bool,
}

pub(crate) struct FaultyClinicApi {
    store: InMemoryClinicStore,
    faults: Mutex<Faults>,
}

impl FaultyClinicApi {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        let doctor = |name: &str, department: &str, fee: Option<u64>| Doctor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            department: department.to_string(),
            fee,
        };
        let doctors = vec![
            doctor("Dr. Mehta", CARDIOLOGY, Some(500)),
            doctor("Dr. Kapoor", CARDIOLOGY, None),
            doctor("Dr. Iyer", "Orthopedics", Some(400)),
        ];
        Self {
            store: InMemoryClinicStore::with_doctors(clock, doctors),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }

    pub(crate) async fn doctor_id(&self, name: &str) -> Uuid {
        let doctors = self.store.list_doctors(None).await.unwrap();
        doctors.iter().find(|d| d.name == name).map(|d| d.id).unwrap()
    }

    pub(crate) async fn visit(&self, visit_id: Uuid) -> Option<VisitRecord> {
        self.store.get_visit(visit_id).await.ok()
    }

    pub(crate) async fn visit_count(&self) -> usize {
        self.store.visit_count().await
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.faults().create_calls
    }

    pub(crate) fn submission_ids(&self) -> Vec<Uuid> {
        self.faults().submission_log.clone()
    }

    /// 请求未到达存储即失败
    pub(crate) fn fail_next_creates(&self, count: usize) {
        self.faults().fail_creates = count;
    }

    /// 记录已写入，但响应丢失
    pub(crate) fn commit_then_fail_next_creates(&self, count: usize) {
        self.faults().commit_then_fail_creates = count;
    }

    pub(crate) fn fail_next_updates(&self, count: usize) {
        self.faults().fail_updates = count;
    }

    /// 状态更新永不返回
    pub(crate) fn stall_updates(&self) {
        self.faults().stall_updates = true;
    }

    pub(crate) async fn insert_visit(&self, record: VisitRecord) {
        self.store.restore(vec![record]).await;
    }

    /// 模拟其他操作员修改，不经过状态机
    pub(crate) async fn set_status(&self, visit_id: Uuid, status: VisitStatus) {
        if let Some(mut record) = self.visit(visit_id).await {
            record.status = status;
            self.store.restore(vec![record]).await;
        }
    }

    pub(crate) async fn remove_visit(&self, visit_id: Uuid) {
        self.store.delete_visit(visit_id).await.ok();
    }
}

#[async_trait]
impl ClinicApi for FaultyClinicApi {
    async fn list_visits(&self, date: NaiveDate) -> Result<Vec<VisitRecord>> {
        self.store.list_visits(date).await
    }

    async fn get_visit(&self, visit_id: Uuid) -> Result<VisitRecord> {
        self.store.get_visit(visit_id).await
    }

    async fn list_doctors(&self, department: Option<&str>) -> Result<Vec<Doctor>> {
        self.store.list_doctors(department).await
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<CreatedVisit> {
        let commit_then_fail = {
            let mut faults = self.faults();
            faults.create_calls += 1;
            faults.submission_log.push(visit.submission_id);
            if faults.fail_creates > 0 {
                faults.fail_creates -= 1;
                return Err(ClinicError::Network("billing service timed out".to_string()));
            }
            if faults.commit_then_fail_creates > 0 {
                faults.commit_then_fail_creates -= 1;
                true
            } else {
                false
            }
        };

        let created = self.store.create_visit(visit).await?;
        if commit_then_fail {
            return Err(ClinicError::Network("connection reset before response".to_string()));
        }
        Ok(created)
    }

    async fn update_status(&self, visit_id: Uuid, status: VisitStatus) -> Result<VisitRecord> {
        let stall = {
            let mut faults = self.faults();
            if faults.fail_updates > 0 {
                faults.fail_updates -= 1;
                return Err(ClinicError::Network("status service unavailable".to_string()));
            }
            faults.stall_updates
        };
        if stall {
            std::future::pending::<()>().await;
        }
        self.store.update_status(visit_id, status).await
    }

    async fn delete_visit(&self, visit_id: Uuid) -> Result<()> {
        self.store.delete_visit(visit_id).await
    }
}
