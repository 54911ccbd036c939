//! # 诊所前台系统
//!
//! 汇总各子模块，便于演示程序和集成方统一引用

pub use clinic_core as core;
pub use clinic_store as store;
pub use clinic_workflow as workflow;
