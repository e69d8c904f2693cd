//! 工具模块
//!
//! - logger: stderr + 可选JSON文件日志

pub mod logger;
