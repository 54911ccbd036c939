//! Web服务器

use anyhow::{Context, Result};
use axum::{
    routing::{get, put},
    Router,
};
use clinic_admin::ClinicMetrics;
use clinic_core::{ClinicApi, Clock};
use clinic_workflow::QueueEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    api_root, create_visit, delete_visit, get_visit, health, list_doctors, list_visits, metrics,
    overview, queue, update_status,
};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub(crate) api: Arc<dyn ClinicApi>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) queue_engine: QueueEngine,
    pub(crate) metrics: ClinicMetrics,
}

impl AppState {
    pub fn new(api: Arc<dyn ClinicApi>, clock: Arc<dyn Clock>, metrics: ClinicMetrics) -> Self {
        Self {
            queue_engine: QueueEngine::new(clock.clone()),
            api,
            clock,
            metrics,
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// 运行直到收到关闭信号
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting web server on {}", self.addr);

        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Web server terminated unexpectedly")?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api_root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/visits", get(list_visits).post(create_visit))
        .route("/visits/:id", get(get_visit).delete(delete_visit))
        .route("/visits/:id/status", put(update_status))
        .route("/doctors", get(list_doctors))
        .route("/queue", get(queue))
        .route("/overview", get(overview))
}
