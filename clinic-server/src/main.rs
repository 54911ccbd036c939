//! 诊所前台服务器主程序

use anyhow::{Context, Result};
use clap::Parser;
use clinic_admin::{config::log_source, ClinicConfig, ClinicMetrics, ConfigManager, ENV_PREFIX};
use clinic_core::{Amount, Clock, SystemClock};
use clinic_store::InMemoryClinicStore;
use clinic_web::{AppState, WebServer};
use clinic_workflow::{QueueEngine, QueueMonitor};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数，优先于配置文件
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "诊所前台挂号与候诊队列服务器")]
struct Args {
    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 医生目录JSON文件
    #[arg(short, long)]
    doctors: Option<PathBuf>,
}

/// 医生目录条目
#[derive(Debug, Deserialize)]
struct DoctorSeed {
    name: String,
    department: String,
    #[serde(default)]
    fee: Option<Amount>,
}

impl Args {
    fn apply(&self, config: &mut ClinicConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn default_directory() -> Vec<DoctorSeed> {
    [
        ("Dr. Mehta", "Cardiology", Some(500)),
        ("Dr. Kapoor", "Cardiology", Some(600)),
        ("Dr. Iyer", "Orthopedics", Some(400)),
        ("Dr. Nair", "General Medicine", Some(300)),
    ]
    .into_iter()
    .map(|(name, department, fee)| DoctorSeed {
        name: name.to_string(),
        department: department.to_string(),
        fee,
    })
    .collect()
}

fn load_directory(path: Option<&Path>) -> Result<Vec<DoctorSeed>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read doctor directory {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse doctor directory")
        }
        None => Ok(default_directory()),
    }
}

async fn seed_store(store: &InMemoryClinicStore, seeds: Vec<DoctorSeed>) -> Result<()> {
    for seed in seeds {
        if seed.fee.is_none() {
            warn!("Doctor {} has no consultation fee configured", seed.name);
        }
        store
            .add_doctor(&seed.name, &seed.department, seed.fee)
            .await
            .with_context(|| format!("Failed to add doctor {}", seed.name))?;
    }
    Ok(())
}

/// 根据队列快照更新指标
fn spawn_queue_metrics(monitor: &QueueMonitor, metrics: ClinicMetrics) {
    let mut snapshots = monitor.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let summary = &snapshot.summary;
            metrics.set_queue(summary.total_waiting, summary.emergency_waiting, summary.critical_band);
        }
    });
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    shutdown.send_replace(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigManager::load(args.config.as_deref(), ENV_PREFIX)?;
    args.apply(&mut config);

    // 先初始化日志，之后的配置校验错误才能输出
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    log_source(args.config.as_deref());

    let manager = ConfigManager::from_config(config, args.config.as_deref())?;
    let config = manager.get_config().await;

    info!("Starting clinic reception server...");
    info!("  Listen address: {}", config.bind_address());
    info!("  Registration charge: {}", config.billing.registration_charge);
    info!("  Queue refresh interval: {:?}", config.refresh_interval());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryClinicStore::new(clock.clone()));
    seed_store(&store, load_directory(args.doctors.as_deref())?).await?;

    let metrics = ClinicMetrics::new()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = QueueMonitor::new(store.clone(), QueueEngine::new(clock.clone()), config.refresh_interval());
    spawn_queue_metrics(&monitor, metrics.clone());
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.bind_address()))?;
    let state = AppState::new(store, clock, metrics);

    let result = WebServer::new(addr, state)
        .run_until(shutdown_signal(shutdown_tx))
        .await;

    if let Err(e) = monitor_task.await {
        warn!("Queue monitor task ended abnormally: {}", e);
    }
    if let Err(e) = &result {
        error!("Server failed: {:#}", e);
    }
    result
}
