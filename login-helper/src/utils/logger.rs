use std::io;
use std::path::Path;
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// 日志守卫
///
/// 持有期间日志生效;drop 时刷新文件写入器并卸下订阅器。
/// 必须由调用者保存到进程退出。
pub struct LoggerGuard {
    _dispatch: DefaultGuard,
    _file_writer: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// stdout 专用于行协议,因此:
/// - 控制台层: 人类可读格式,写入 stderr
/// - 文件层 (可选): JSON格式,按天轮转,non_blocking 写入 `log_dir`
/// - 环境变量控制: RUST_LOG=debug 可调整日志级别,默认 INFO
///
/// 订阅器以 `set_default` 作用于当前线程,不设置全局订阅器;
/// 二进制使用单线程运行时,所有任务都在该线程上执行。
///
/// 文件层初始化失败时退化为仅控制台输出,并记录告警。
///
/// # 示例日志 (文件层)
/// ```json
/// {
///   "timestamp": "2025-10-05T10:30:45.123Z",
///   "level": "INFO",
///   "target": "qr_login_helper::services::qr_login_service",
///   "fields": { "tick": 3, "message": "检测到登录cookie" },
///   "span": { "name": "qr_login", "platform": "netease" }
/// }
/// ```
pub fn init(log_dir: Option<&Path>) -> LoggerGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    let (file_writer, file_guard, file_error) = match log_dir.map(open_file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    let dispatch = tracing::subscriber::set_default(subscriber);

    if let Some(e) = file_error {
        tracing::warn!("文件日志初始化失败,仅输出到stderr: {}", e);
    }

    LoggerGuard {
        _dispatch: dispatch,
        _file_writer: file_guard,
    }
}

/// 按天轮转的文件写入器
///
/// 文件命名格式: login-helper.2025-10-05.log
fn open_file_appender(log_dir: &Path) -> Result<RollingFileAppender, io::Error> {
    std::fs::create_dir_all(log_dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("login-helper")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
