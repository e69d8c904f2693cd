use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Arg, Command};
use qr_login_helper::commands::{self, report_error};
use qr_login_helper::models::{LoginError, Platform};
use qr_login_helper::services::{ConfigService, LineEmitter, SessionManager};
use qr_login_helper::utils::logger;

const USAGE: &str = "usage: login-helper <netease|qq>";

fn cli() -> Command {
    Command::new("login-helper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("网易云音乐 / QQ音乐 扫码登录助手,事件以JSON行输出到stdout")
        .arg(
            Arg::new("platform")
                .value_name("PLATFORM")
                .help("目标平台: netease | qq (大小写不敏感)"),
        )
}

fn main() -> ExitCode {
    // 配置解析的告警也需要输出,先用仅控制台的日志加载配置
    let config = {
        let _boot = logger::init(None);
        ConfigService::load()
    };
    let _logger = logger::init(config.log_dir.as_deref());

    let mut emitter = LineEmitter::stdout();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            eprint!("{}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let message = match e.kind().as_str() {
                Some(kind) => format!("{}; {}", kind, USAGE),
                None => USAGE.to_string(),
            };
            report_error(&mut emitter, &LoginError::InvalidArgument(message));
            return ExitCode::from(1);
        }
    };

    let platform = match matches.get_one::<String>("platform") {
        Some(raw) => match raw.parse::<Platform>() {
            Ok(platform) => platform,
            Err(e) => {
                report_error(&mut emitter, &e);
                return ExitCode::from(1);
            }
        },
        None => {
            report_error(&mut emitter, &LoginError::InvalidArgument(USAGE.to_string()));
            return ExitCode::from(1);
        }
    };

    // 单线程运行时: 日志订阅器作用于当前线程
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            report_error(
                &mut emitter,
                &LoginError::BrowserLaunch(format!("运行时初始化失败: {}", e)),
            );
            return ExitCode::from(1);
        }
    };

    let result = runtime.block_on(async {
        let sessions = SessionManager::new();
        let listener = sessions.listen_for_signals();

        let result = commands::login(platform, &config, &mut emitter, sessions.token()).await;

        listener.abort();
        result
    });

    ExitCode::from(commands::exit_code(&result))
}
