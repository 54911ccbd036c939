//! # Clinic Core
//!
//! 诊所前台系统的核心模块，提供基础数据结构、错误定义、时钟抽象、
//! 外部协作接口、就诊状态机和通用工具。

pub mod api;
pub mod clock;
pub mod error;
pub mod models;
pub mod state_machine;
pub mod utils;

pub use api::ClinicApi;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ClinicError, Result};
pub use models::*;
pub use state_machine::{StaffRole, VisitEvent, VisitStateMachine};
