//! 服务层模块
//!
//! 包含所有业务逻辑服务:
//! - `browser_service`: 浏览器能力抽象与 Chromium 实现
//! - `selector_resolver`: 候选定位器按优先级解析
//! - `qr_login_service`: 扫码登录状态机
//! - `credential_normalizer`: cookie 过滤与凭证生成
//! - `event_emitter`: 行协议输出
//! - `config_service`: 环境变量配置
//! - `session_manager`: 终止信号与会话取消
//!
//! # 日志安全
//!
//! 记录关键操作与cookie键名,不记录cookie值。
//!
//! # 服务架构
//!
//! ```text
//! ┌──────────────────┐
//! │   LoginCommand   │  (故障边界)
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────────────────────────────┐
//! │           QrLoginService                 │
//! │  ┌──────────────────┐  ┌──────────────┐ │
//! │  │ SelectorResolver │  │ Normalizer   │ │
//! │  └────────┬─────────┘  └──────────────┘ │
//! └───────────┼──────────────────┬───────────┘
//!             ▼                  ▼
//!       BrowserDriver       EventSink (stdout)
//! ```
//!
//! # 使用示例
//!
//! ```no_run
//! use qr_login_helper::models::Platform;
//! use qr_login_helper::services::{
//!     BrowserDriver, ChromiumDriver, ConfigService, LineEmitter, QrLoginService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigService::load();
//! let mut driver = ChromiumDriver::launch(&config.browser).await?;
//! let mut emitter = LineEmitter::stdout();
//!
//! let result = QrLoginService::new(&driver, &mut emitter, Platform::Qq, config.timings)
//!     .run()
//!     .await;
//! driver.shutdown().await?;
//! let credential = result?;
//! println!("{}", credential.cookie_count());
//! # Ok(())
//! # }
//! ```

pub mod browser_service;
pub mod config_service;
pub mod credential_normalizer;
pub mod event_emitter;
pub mod qr_login_service;
pub mod selector_resolver;
pub mod session_manager;

// 重导出常用类型,简化外部引用
pub use browser_service::{BrowserDriver, ChromiumDriver, ElementHandle, FrameRef};
pub use config_service::{BrowserSettings, ConfigService, FlowTimings, LoginConfig};
pub use event_emitter::{EventSink, LineEmitter};
pub use qr_login_service::QrLoginService;
pub use selector_resolver::{ResolveOptions, SelectorResolver};
pub use session_manager::SessionManager;
