use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{Credential, LoginError, LoginEvent, Platform};
use crate::services::{
    BrowserDriver, ChromiumDriver, EventSink, FlowTimings, LoginConfig, QrLoginService,
};

/// 登录命令
///
/// 一次调用的完整入口: 启动浏览器、运行状态机、清理浏览器。
/// 这里是唯一的故障边界: 任何错误都在这里转换为一个 `error` 事件。
///
/// # 返回值
/// 与终态事件一致: `Ok` 对应 `login_success`,`Err` 对应 `error`。
pub async fn login<S: EventSink + ?Sized>(
    platform: Platform,
    config: &LoginConfig,
    sink: &mut S,
    cancel: CancellationToken,
) -> Result<Credential, LoginError> {
    info!(platform = %platform, "开始扫码登录");

    let launched = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LoginError::Cancelled),
        driver = ChromiumDriver::launch(&config.browser) => driver,
    };

    let mut driver = match launched {
        Ok(driver) => driver,
        Err(e) => {
            report_error(sink, &e);
            return Err(e);
        }
    };

    run_session(&mut driver, sink, platform, config.timings.clone(), cancel).await
}

/// 在已启动的浏览器上运行一次登录会话
///
/// 状态机与取消令牌竞速;无论结果如何都会关闭浏览器。
pub async fn run_session<D, S>(
    driver: &mut D,
    sink: &mut S,
    platform: Platform,
    timings: FlowTimings,
    cancel: CancellationToken,
) -> Result<Credential, LoginError>
where
    D: BrowserDriver + ?Sized,
    S: EventSink + ?Sized,
{
    let result = {
        let mut service = QrLoginService::new(&*driver, &mut *sink, platform, timings);
        let session_id = service.session().session_id.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(session_id = %session_id, "登录会话被取消");
                Err(LoginError::Cancelled)
            }
            result = service.run() => result,
        }
    };

    if let Err(e) = driver.shutdown().await {
        warn!("关闭浏览器失败: {}", e);
    }

    if let Err(e) = &result {
        report_error(sink, e);
    }
    result
}

/// 输出终态错误事件
///
/// 已有终态事件时不再输出;输出本身失败只能记录日志。
pub fn report_error<S: EventSink + ?Sized>(sink: &mut S, err: &LoginError) {
    if sink.finished() {
        warn!(error = %err, "终态事件已输出,忽略错误");
        return;
    }

    error!(error = %err, "登录失败");
    if let Err(emit_err) = sink.emit(LoginEvent::error(err.to_string())) {
        error!("错误事件输出失败: {}", emit_err);
    }
}

/// 进程退出码: 成功为 0,失败为 1
pub fn exit_code<T>(result: &Result<T, LoginError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
