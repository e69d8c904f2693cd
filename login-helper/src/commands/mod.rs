/// 命令模块
///
/// 进程入口调用的命令:
/// - login_command: 扫码登录 (故障边界,负责浏览器清理与错误事件)

pub mod login_command;

pub use login_command::{exit_code, login, report_error, run_session};
