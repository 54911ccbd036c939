//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use clinic_core::{ClinicError, NewVisit, VisitStatus};
use clinic_store::ErrorBody;
use clinic_workflow::{status_segments, summarize, DeskOverview, StatusCounts};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::server::AppState;

/// 处理器错误包装
#[derive(Debug)]
pub struct ApiError(pub ClinicError);

impl From<ClinicError> for ApiError {
    fn from(error: ClinicError) -> Self {
        Self(error)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ClinicError::Validation(_) | ClinicError::MissingFields(_) | ClinicError::Referential(_) => {
                StatusCode::BAD_REQUEST
            }
            ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
            ClinicError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ClinicError::Permission(_) => StatusCode::FORBIDDEN,
            ClinicError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let body = ErrorBody::from_error(&self.0);
        let body = Json(json!({
            "error": true,
            "kind": body.kind,
            "message": body.message,
            "status": status.as_u16(),
            "details": body.details,
        }));

        (status, body).into_response()
    }
}

/// 日期查询参数，缺省为当天
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorQuery {
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: VisitStatus,
}

impl AppState {
    fn date_or_today(&self, query: &DateQuery) -> NaiveDate {
        query.date.unwrap_or_else(|| self.clock.today())
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Clinic Reception API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "api": "/api/v1",
            "metrics": "/metrics"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": state.clock.now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn list_visits(State(state): State<AppState>, Query(query): Query<DateQuery>) -> ApiResult<impl IntoResponse> {
    let date = state.date_or_today(&query);
    let visits = state.api.list_visits(date).await?;

    Ok(Json(json!({
        "date": date,
        "total": visits.len(),
        "visits": visits,
    })))
}

pub async fn get_visit(State(state): State<AppState>, Path(visit_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.api.get_visit(visit_id).await?))
}

/// 创建就诊记录
pub async fn create_visit(State(state): State<AppState>, Json(visit): Json<NewVisit>) -> ApiResult<impl IntoResponse> {
    let submission_id = visit.submission_id;
    let created = state.api.create_visit(visit).await?;
    state.metrics.record_registration();
    info!("Registered visit {} with token {} (submission {})", created.visit_id, created.token, submission_id);

    Ok((StatusCode::CREATED, Json(created)))
}

/// 更新就诊状态
pub async fn update_status(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let record = state.api.update_status(visit_id, request.status).await?;
    state.metrics.record_transition(record.status);
    info!("Visit {} moved to {}", record.token, record.status);

    Ok(Json(record))
}

pub async fn delete_visit(State(state): State<AppState>, Path(visit_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    state.api.delete_visit(visit_id).await?;
    warn!("Visit {} permanently removed", visit_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_doctors(State(state): State<AppState>, Query(query): Query<DoctorQuery>) -> ApiResult<impl IntoResponse> {
    let doctors = state.api.list_doctors(query.department.as_deref()).await?;

    Ok(Json(json!({
        "total": doctors.len(),
        "doctors": doctors,
    })))
}

/// 排序后的候诊队列
pub async fn queue(State(state): State<AppState>, Query(query): Query<DateQuery>) -> ApiResult<impl IntoResponse> {
    let date = state.date_or_today(&query);
    let records = state.api.list_visits(date).await?;
    let entries = state.queue_engine.order(&records);
    let summary = summarize(&entries);

    Ok(Json(json!({
        "date": date,
        "generated_at": state.clock.now(),
        "summary": summary,
        "entries": entries,
    })))
}

/// 各状态统计及图表分段
pub async fn overview(State(state): State<AppState>, Query(query): Query<DateQuery>) -> ApiResult<impl IntoResponse> {
    let date = state.date_or_today(&query);
    let records = state.api.list_visits(date).await?;
    let counts = StatusCounts::from_records(&records);

    Ok(Json(DeskOverview {
        date: Some(date),
        counts,
        segments: status_segments(&counts),
        queue: summarize(&state.queue_engine.order(&records)),
    }))
}

/// Prometheus指标
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let text = state
        .metrics
        .render()
        .map_err(|e| ClinicError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
