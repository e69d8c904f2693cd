//! 数据模型模块
//!
//! 包含所有核心数据结构:
//! - errors: 错误类型定义 (平台级 / 候选级)
//! - platform: 平台数据表 (选择器、cookie键、昵称策略)
//! - locator: 定位器与语义角色
//! - login_session: 登录会话与状态
//! - credential: 原始cookie与登录凭证
//! - login_event: 行协议事件
//!
//! # 日志安全
//! cookie 值只出现在 `login_success` 事件中,不记录到日志。

pub mod credential;
pub mod errors;
pub mod locator;
pub mod login_event;
pub mod login_session;
pub mod platform;

// 重导出常用类型,简化外部引用
pub use credential::{Credential, RawCookie};
pub use errors::LoginError;
pub use locator::{Locator, LocatorSpec, Query, Role, SearchScope};
pub use login_event::LoginEvent;
pub use login_session::{LoginSession, LoginState};
pub use platform::{
    ApiRequest, HttpMethod, NicknameStrategy, Platform, PlatformProfile, SCANNED_STATUS_CODE,
};
