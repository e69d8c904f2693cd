//! 会话取消管理
//!
//! 职责: 把外部终止信号 (SIGINT / SIGTERM) 转换为会话取消
//! 策略: 单个 `CancellationToken`,登录命令与之竞速,取消后仍执行浏览器清理

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 会话管理器
///
/// - 持有本次调用唯一的取消令牌
/// - 监听终止信号并触发取消
pub struct SessionManager {
    token: CancellationToken,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// 取消令牌 (克隆共享同一状态)
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 手动取消当前会话
    pub fn cancel(&self, reason: &str) {
        if !self.token.is_cancelled() {
            tracing::info!(原因 = %reason, "取消登录会话");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 启动信号监听任务
    ///
    /// 收到 Ctrl-C 或 SIGTERM 时取消会话;会话正常结束时任务随令牌一起退出。
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                signal = wait_for_termination() => {
                    tracing::warn!(信号 = signal, "收到终止信号,取消登录会话");
                    token.cancel();
                }
            }
        })
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::warn!("无法注册 SIGTERM 监听: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}
