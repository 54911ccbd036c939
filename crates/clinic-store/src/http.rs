//! HTTP协作方客户端
//!
//! 通过REST接口访问远端就诊记录服务，服务端错误按类别还原为 `ClinicError`。

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_core::{ClinicApi, ClinicError, CreatedVisit, Doctor, NewVisit, Result, VisitRecord, VisitStatus};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// 服务端错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn from_error(error: &ClinicError) -> Self {
        let details = match error {
            ClinicError::InvalidTransition { from, to } => Some(serde_json::json!({ "from": from, "to": to })),
            ClinicError::MissingFields(fields) => Some(serde_json::json!({ "fields": fields })),
            _ => None,
        };
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            details,
        }
    }

    /// 还原为错误类型
    pub fn into_error(self, status: StatusCode) -> ClinicError {
        let detail = |key: &str| {
            self.details
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match self.kind.as_str() {
            "validation" => ClinicError::Validation(self.message),
            "missing_fields" => {
                let fields = self
                    .details
                    .as_ref()
                    .and_then(|d| d.get("fields"))
                    .and_then(|f| serde_json::from_value::<Vec<String>>(f.clone()).ok())
                    .unwrap_or_default();
                ClinicError::MissingFields(fields)
            }
            "referential" => ClinicError::Referential(self.message),
            "invalid_transition" => ClinicError::InvalidTransition {
                from: detail("from"),
                to: detail("to"),
            },
            "not_found" => ClinicError::NotFound(self.message),
            "permission" => ClinicError::Permission(self.message),
            "network" => ClinicError::Network(self.message),
            _ => ClinicError::Network(format!("Server responded {}: {}", status, self.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VisitList {
    visits: Vec<VisitRecord>,
}

#[derive(Debug, Deserialize)]
struct DoctorList {
    doctors: Vec<Doctor>,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: VisitStatus,
}

/// REST客户端
#[derive(Debug, Clone)]
pub struct HttpClinicApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClinicApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClinicError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(network_error);
        }
        Err(Self::error_from(response).await)
    }

    async fn error_from(response: Response) -> ClinicError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => body.into_error(status),
            Err(_) => ClinicError::Network(format!("Server responded {}", status)),
        }
    }
}

fn network_error(error: reqwest::Error) -> ClinicError {
    warn!("Clinic API request failed: {}", error);
    ClinicError::Network(error.to_string())
}

#[async_trait]
impl ClinicApi for HttpClinicApi {
    async fn list_visits(&self, date: NaiveDate) -> Result<Vec<VisitRecord>> {
        debug!("Fetching visits for {}", date);
        let response = self
            .client
            .get(self.url("/visits"))
            .query(&[("date", date.to_string())])
            .send()
            .await
            .map_err(network_error)?;
        Ok(Self::decode::<VisitList>(response).await?.visits)
    }

    async fn get_visit(&self, visit_id: Uuid) -> Result<VisitRecord> {
        let response = self
            .client
            .get(self.url(&format!("/visits/{}", visit_id)))
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    async fn list_doctors(&self, department: Option<&str>) -> Result<Vec<Doctor>> {
        let mut request = self.client.get(self.url("/doctors"));
        if let Some(department) = department {
            request = request.query(&[("department", department)]);
        }
        let response = request.send().await.map_err(network_error)?;
        Ok(Self::decode::<DoctorList>(response).await?.doctors)
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<CreatedVisit> {
        let response = self
            .client
            .post(self.url("/visits"))
            .json(&visit)
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    async fn update_status(&self, visit_id: Uuid, status: VisitStatus) -> Result<VisitRecord> {
        let response = self
            .client
            .put(self.url(&format!("/visits/{}/status", visit_id)))
            .json(&StatusUpdate { status })
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    async fn delete_visit(&self, visit_id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/visits/{}", visit_id)))
            .send()
            .await
            .map_err(network_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
