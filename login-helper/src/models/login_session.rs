use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::Platform;

/// 扫码登录会话
///
/// 追踪一次调用内的登录过程: 平台、尝试次数、开始时间。
/// 由状态机独占,会话结束时浏览器随之销毁。
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// 会话唯一ID (仅用于日志关联)
    pub session_id: String,

    /// 目标平台,会话期间不可变
    pub platform: Platform,

    /// 当前是第几次获取二维码 (从1开始,每次过期重试+1)
    pub attempt: u32,

    /// 会话开始时间
    pub started_at: DateTime<Utc>,

    /// 当前状态
    pub state: LoginState,
}

/// 登录状态
///
/// 状态转换流程:
/// Start -> Triggered -> QrCaptured -> Polling -> Success
///   ^                       |            |
///   |                       +-> Failed   +-> Expired --+
///   +--------------------------------------------------+
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// 打开首页,等待页面稳定
    Start,
    /// 已点击登录按钮 (或直接导航到登录页)
    Triggered,
    /// 已截取二维码
    QrCaptured,
    /// 轮询cookie / 提示元素
    Polling,
    /// 登录成功 (终态)
    Success,
    /// 二维码过期,即将重试
    Expired,
    /// 失败 (终态)
    Failed,
}

impl LoginState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Success | LoginState::Failed)
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::Start => "START",
            LoginState::Triggered => "TRIGGERED",
            LoginState::QrCaptured => "QR_CAPTURED",
            LoginState::Polling => "POLLING",
            LoginState::Success => "SUCCESS",
            LoginState::Expired => "EXPIRED",
            LoginState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

impl LoginSession {
    /// 创建新的登录会话
    ///
    /// # 示例
    /// ```
    /// use qr_login_helper::models::{LoginSession, LoginState, Platform};
    /// let session = LoginSession::new(Platform::Qq);
    /// assert_eq!(session.state, LoginState::Start);
    /// assert_eq!(session.attempt, 0);
    /// ```
    pub fn new(platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!(
                "{}_{}_{}",
                platform,
                now.timestamp_millis(),
                uuid::Uuid::new_v4().simple()
            ),
            platform,
            attempt: 0,
            started_at: now,
            state: LoginState::Start,
        }
    }

    /// 开始新一轮二维码获取
    pub fn begin_attempt(&mut self) {
        self.attempt += 1;
        self.state = LoginState::Start;
    }

    /// 状态转换,返回旧状态
    pub fn transition(&mut self, next: LoginState) -> LoginState {
        std::mem::replace(&mut self.state, next)
    }

    /// 会话持续时长(秒)
    pub fn duration_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
