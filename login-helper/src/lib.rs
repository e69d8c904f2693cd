//! 网易云音乐 / QQ音乐 扫码登录助手
//!
//! 以子进程方式运行: 打开平台登录页,截取二维码,轮询登录状态,
//! 通过 stdout 行协议 (每行一个JSON事件) 把进度与结果交给父进程。
//!
//! - `models`: 数据模型 (平台表、定位器、事件、凭证、错误)
//! - `services`: 浏览器能力、选择器解析、状态机、归一化、输出
//! - `commands`: 进程入口命令 (故障边界)
//! - `utils`: 日志

pub mod commands;
pub mod models;
pub mod services;
pub mod utils;
