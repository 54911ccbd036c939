//! # 诊所前台管理模块
//!
//! 提供分层配置加载与校验，以及Prometheus运行指标

pub mod config;
pub mod metrics;

pub use config::{
    BillingConfig, ClientConfig, ClinicConfig, ConfigManager, ConfigValidator, LoggingConfig,
    QueueConfig, ServerConfig, ENV_PREFIX,
};
pub use metrics::ClinicMetrics;
