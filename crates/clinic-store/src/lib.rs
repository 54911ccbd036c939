//! # 就诊记录协作方实现
//!
//! - `memory`：内存存储，按日期生成号码并校验状态转换
//! - `http`：基于REST接口的远端客户端
//! - `cache`：医生目录缓存及最近快照

pub mod cache;
pub mod http;
pub mod memory;

pub use cache::{CachedClinicApi, DEFAULT_DIRECTORY_TTL};
pub use http::{ErrorBody, HttpClinicApi};
pub use memory::InMemoryClinicStore;
