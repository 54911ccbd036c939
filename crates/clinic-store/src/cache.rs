//! 带缓存的协作方包装层
//!
//! 医生目录按TTL缓存；就诊记录每次都向内层读取，
//! 仅保留最近一次快照供离线展示。所有修改直接转发到内层。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::{
    ClinicApi, ClinicError, Clock, CreatedVisit, Doctor, NewVisit, Result, VisitRecord, VisitStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 默认医生目录缓存时间
pub const DEFAULT_DIRECTORY_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct DirectoryEntry {
    fetched_at: DateTime<Utc>,
    doctors: Vec<Doctor>,
}

/// 缓存包装层
pub struct CachedClinicApi {
    inner: Arc<dyn ClinicApi>,
    clock: Arc<dyn Clock>,
    directory_ttl: Duration,
    directory: RwLock<HashMap<Option<String>, DirectoryEntry>>,
    snapshots: RwLock<HashMap<NaiveDate, Vec<VisitRecord>>>,
}

impl CachedClinicApi {
    pub fn new(inner: Arc<dyn ClinicApi>, clock: Arc<dyn Clock>, directory_ttl: Duration) -> Self {
        Self {
            inner,
            clock,
            directory_ttl,
            directory: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// 最近一次成功读取的快照，仅供展示
    pub async fn last_snapshot(&self, date: NaiveDate) -> Option<Vec<VisitRecord>> {
        self.snapshots.read().await.get(&date).cloned()
    }

    pub async fn invalidate_directory(&self) {
        self.directory.write().await.clear();
    }

    fn is_fresh(&self, entry: &DirectoryEntry) -> bool {
        let age = self.clock.now().signed_duration_since(entry.fetched_at);
        match age.to_std() {
            Ok(age) => age < self.directory_ttl,
            // 时钟回拨时视为过期
            Err(_) => false,
        }
    }

    async fn store_record(&self, record: &VisitRecord) {
        let mut snapshots = self.snapshots.write().await;
        if let Some(records) = snapshots.get_mut(&record.date) {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        }
    }

    async fn forget_record(&self, visit_id: Uuid) {
        for records in self.snapshots.write().await.values_mut() {
            records.retain(|r| r.id != visit_id);
        }
    }
}

#[async_trait]
impl ClinicApi for CachedClinicApi {
    async fn list_visits(&self, date: NaiveDate) -> Result<Vec<VisitRecord>> {
        let records = self.inner.list_visits(date).await?;
        self.snapshots.write().await.insert(date, records.clone());
        Ok(records)
    }

    async fn get_visit(&self, visit_id: Uuid) -> Result<VisitRecord> {
        match self.inner.get_visit(visit_id).await {
            Ok(record) => {
                self.store_record(&record).await;
                Ok(record)
            }
            Err(ClinicError::NotFound(message)) => {
                self.forget_record(visit_id).await;
                Err(ClinicError::NotFound(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_doctors(&self, department: Option<&str>) -> Result<Vec<Doctor>> {
        let key = department.map(str::to_string);
        if let Some(entry) = self.directory.read().await.get(&key) {
            if self.is_fresh(entry) {
                debug!("Doctor directory cache hit for {:?}", key);
                return Ok(entry.doctors.clone());
            }
        }

        let doctors = self.inner.list_doctors(department).await?;
        self.directory.write().await.insert(
            key,
            DirectoryEntry {
                fetched_at: self.clock.now(),
                doctors: doctors.clone(),
            },
        );
        Ok(doctors)
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<CreatedVisit> {
        let created = self.inner.create_visit(visit).await?;
        // 新记录的完整内容以下次读取为准
        self.snapshots.write().await.remove(&self.clock.today());
        Ok(created)
    }

    async fn update_status(&self, visit_id: Uuid, status: VisitStatus) -> Result<VisitRecord> {
        match self.inner.update_status(visit_id, status).await {
            Ok(record) => {
                self.store_record(&record).await;
                Ok(record)
            }
            Err(ClinicError::NotFound(message)) => {
                self.forget_record(visit_id).await;
                Err(ClinicError::NotFound(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_visit(&self, visit_id: Uuid) -> Result<()> {
        let result = self.inner.delete_visit(visit_id).await;
        if matches!(result, Ok(()) | Err(ClinicError::NotFound(_))) {
            self.forget_record(visit_id).await;
        }
        result
    }
}
