//! 外部协作接口
//!
//! 前台核心只通过此接口访问就诊记录与医生目录，
//! 具体实现可以是内存存储、HTTP客户端或带缓存的包装层。

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CreatedVisit, Doctor, NewVisit, VisitRecord, VisitStatus};

/// 就诊记录与医生目录协作接口
#[async_trait]
pub trait ClinicApi: Send + Sync {
    /// 查询某日全部就诊记录（任意状态，按创建顺序）
    ///
    /// 返回值必须反映当前真实状态，不得是过期缓存。
    async fn list_visits(&self, date: NaiveDate) -> Result<Vec<VisitRecord>>;

    /// 查询单条就诊记录
    async fn get_visit(&self, visit_id: Uuid) -> Result<VisitRecord>;

    /// 查询医生目录，可按科室过滤
    async fn list_doctors(&self, department: Option<&str>) -> Result<Vec<Doctor>>;

    /// 确认收费并创建就诊记录
    ///
    /// 同一 `submission_id` 的重复提交返回同一结果，不会产生第二条记录。
    async fn create_visit(&self, visit: NewVisit) -> Result<CreatedVisit>;

    /// 更新就诊状态，服务端执行状态机校验
    async fn update_status(&self, visit_id: Uuid, status: VisitStatus) -> Result<VisitRecord>;

    /// 永久删除错误录入的记录
    async fn delete_visit(&self, visit_id: Uuid) -> Result<()>;
}
