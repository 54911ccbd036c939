//! 配置管理
//!
//! 默认值、可选配置文件、`CLINIC_*` 环境变量三层叠加，加载后统一校验

use anyhow::{Context, Result};
use clinic_core::Amount;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CLINIC";

/// 诊所前台完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicConfig {
    pub server: ServerConfig,
    pub billing: BillingConfig,
    pub queue: QueueConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 收费配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillingConfig {
    /// 固定挂号费
    pub registration_charge: Amount,
}

/// 候诊队列配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// 队列刷新间隔（秒）
    pub refresh_interval_secs: u64,
}

/// 远端客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或EnvFilter表达式
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { registration_charge: 100 }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { refresh_interval_secs: 30 }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl ClinicConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.queue.refresh_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client.timeout_secs)
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: Arc<RwLock<ClinicConfig>>,
    config_path: Option<String>,
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载配置，文件不存在时只使用默认值和环境变量
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        Self::with_env_prefix(config_path, ENV_PREFIX)
    }

    pub fn with_env_prefix(config_path: Option<&str>, env_prefix: &str) -> Result<Self> {
        let config = Self::load(config_path, env_prefix)?;
        log_source(config_path);
        Self::from_config(config, config_path)
    }

    /// 以合并完成的配置创建管理器，此时才做校验
    pub fn from_config(config: ClinicConfig, config_path: Option<&str>) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(str::to_string),
            validator,
        })
    }

    /// 只读取各层配置，不校验也不输出日志
    ///
    /// 供调用方在叠加命令行参数、初始化日志之后再校验。
    pub fn load(config_path: Option<&str>, env_prefix: &str) -> Result<ClinicConfig> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 获取配置
    pub async fn get_config(&self) -> ClinicConfig {
        self.config.read().await.clone()
    }

    /// 更新配置，校验失败时保持原配置
    pub async fn update_config(&self, new_config: ClinicConfig) -> Result<()> {
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load(self.config_path.as_deref(), ENV_PREFIX)?;
        log_source(self.config_path.as_deref());
        self.update_config(new_config).await
    }
}

/// 记录配置来源
pub fn log_source(config_path: Option<&str>) {
    match config_path {
        Some(path) => info!("Configuration loaded from: {}", path),
        None => info!("Configuration loaded from defaults and environment"),
    }
}

/// 配置校验规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&ClinicConfig) -> bool,
    error_message: &'static str,
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validation_rules.iter().map(|rule| rule.field_path))
            .finish()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| config.server.port != 0,
                error_message: "Server port cannot be 0",
            },
            ValidationRule {
                field_path: "queue.refresh_interval_secs",
                validator: |config| config.queue.refresh_interval_secs != 0,
                error_message: "Queue refresh interval cannot be 0",
            },
            ValidationRule {
                field_path: "client.timeout_secs",
                validator: |config| config.client.timeout_secs != 0,
                error_message: "Client timeout cannot be 0",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ClinicConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if !(rule.validator)(config) {
                error!("Configuration validation failed for {}", rule.field_path);
                anyhow::bail!("{}: {}", rule.field_path, rule.error_message);
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated_prefix() -> String {
        format!("CLINIC_TEST_{}", uuid::Uuid::new_v4().simple()).to_uppercase()
    }

    #[tokio::test]
    async fn test_defaults_without_file() {
        let manager = ConfigManager::with_env_prefix(None, &isolated_prefix()).unwrap();
        let config = manager.get_config().await;
        assert_eq!(config, ClinicConfig::default());
        assert_eq!(config.billing.registration_charge, 100);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("clinic-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[server]\nport = 9090\n\n[billing]\nregistration_charge = 150\n").unwrap();

        let manager = ConfigManager::with_env_prefix(path.to_str(), &isolated_prefix()).unwrap();
        let config = manager.get_config().await;
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.billing.registration_charge, 150);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_environment_overrides_file() {
        let prefix = isolated_prefix();
        std::env::set_var(format!("{}_QUEUE__REFRESH_INTERVAL_SECS", prefix), "5");

        let manager = ConfigManager::with_env_prefix(None, &prefix).unwrap();
        assert_eq!(manager.get_config().await.queue.refresh_interval_secs, 5);
    }

    #[test]
    fn test_validator_rejects_zero_values() {
        let validator = ConfigValidator::new();
        assert!(validator.validate(&ClinicConfig::default()).is_ok());

        let mut config = ClinicConfig::default();
        config.server.port = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = ClinicConfig::default();
        config.queue.refresh_interval_secs = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = ClinicConfig::default();
        config.client.timeout_secs = 0;
        assert!(validator.validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_invalid_layer_can_be_overridden_before_validation() {
        let prefix = isolated_prefix();
        std::env::set_var(format!("{}_SERVER__PORT", prefix), "0");

        assert!(ConfigManager::with_env_prefix(None, &prefix).is_err());

        let mut config = ConfigManager::load(None, &prefix).unwrap();
        assert_eq!(config.server.port, 0);
        assert!(ConfigManager::from_config(config.clone(), None).is_err());

        config.server.port = 9090;
        let manager = ConfigManager::from_config(config, None).unwrap();
        assert_eq!(manager.get_config().await.server.port, 9090);
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_config() {
        let manager = ConfigManager::with_env_prefix(None, &isolated_prefix()).unwrap();
        let mut bad = manager.get_config().await;
        bad.server.port = 0;

        assert!(manager.update_config(bad).await.is_err());
        assert_eq!(manager.get_config().await.server.port, 8080);
    }
}
