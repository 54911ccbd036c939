//! # 诊所前台Web接口
//!
//! 基于axum的REST接口，可挂接任意 `ClinicApi` 实现

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, ApiResult};
pub use server::{create_app, AppState, WebServer};
