//! 错误定义模块

use thiserror::Error;

/// 诊所系统统一错误类型
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("验证错误: 缺少必填字段 {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("引用错误: {0}")]
    Referential(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidTransition { from: String, to: String },

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl ClinicError {
    /// 输入阶段即可发现的错误（引用错误在界面上按验证错误处理）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClinicError::Validation(_) | ClinicError::MissingFields(_) | ClinicError::Referential(_)
        )
    }

    /// 用户可以直接重试的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClinicError::Network(_))
    }

    /// 错误类别标识，用于REST响应体和客户端还原
    pub fn kind(&self) -> &'static str {
        match self {
            ClinicError::Config(_) => "config",
            ClinicError::Validation(_) => "validation",
            ClinicError::MissingFields(_) => "missing_fields",
            ClinicError::Referential(_) => "referential",
            ClinicError::Network(_) => "network",
            ClinicError::InvalidTransition { .. } => "invalid_transition",
            ClinicError::NotFound(_) => "not_found",
            ClinicError::Permission(_) => "permission",
            ClinicError::Serialization(_) => "serialization",
            ClinicError::Internal(_) => "internal",
        }
    }
}

/// 诊所系统统一结果类型
pub type Result<T> = std::result::Result<T, ClinicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ClinicError::Referential("x".into()).is_validation());
        assert!(ClinicError::MissingFields(vec!["doctor".into()]).is_validation());
        assert!(!ClinicError::Network("timeout".into()).is_validation());
        assert!(ClinicError::Network("timeout".into()).is_recoverable());
        assert!(!ClinicError::NotFound("visit".into()).is_recoverable());
    }

    #[test]
    fn test_missing_fields_message_names_fields() {
        let err = ClinicError::MissingFields(vec!["department".into(), "doctor".into()]);
        let message = err.to_string();
        assert!(message.contains("department"));
        assert!(message.contains("doctor"));
    }
}
