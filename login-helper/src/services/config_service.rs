use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// 单个角色解析的总时长上限
///
/// 候选再多,一次解析也不能超过这个值,避免单轮尝试卡死。
pub const MAX_ROLE_BUDGET: Duration = Duration::from_secs(10);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 浏览器启动与上下文参数
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserSettings {
    /// 无头模式
    pub headless: bool,

    /// Chrome/Chromium 可执行文件 (None 时由 chromiumoxide 自动探测)
    pub chrome_path: Option<PathBuf>,

    pub user_agent: String,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// 浏览器语言 (如 zh-CN)
    pub locale: String,

    /// 单次浏览器/网络调用的超时上限
    pub call_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            locale: "zh-CN".to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// 状态机各阶段的等待时长
///
/// 固定延时只是页面就绪的粗略代理,这里的值是默认值而不是契约。
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTimings {
    /// 导航后等待页面稳定
    pub settle: Duration,

    /// 点击登录后等待二维码渲染
    pub qr_render: Duration,

    /// 轮询间隔
    pub poll_interval: Duration,

    /// 单个二维码的轮询总时长
    pub poll_timeout: Duration,

    /// 过期后重新获取二维码前的冷却
    pub cooldown: Duration,

    /// 单个候选定位器的可见性等待
    pub candidate_wait: Duration,

    /// 单个角色解析的总时长 (不超过 `MAX_ROLE_BUDGET`)
    pub role_budget: Duration,

    /// 轮询中探测提示元素时的可见性等待
    pub indicator_wait: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(2000),
            qr_render: Duration::from_millis(3000),
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(300),
            cooldown: Duration::from_secs(2),
            candidate_wait: Duration::from_millis(1500),
            role_budget: MAX_ROLE_BUDGET,
            indicator_wait: Duration::from_millis(300),
        }
    }
}

/// 运行配置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginConfig {
    pub browser: BrowserSettings,
    pub timings: FlowTimings,

    /// JSON 文件日志目录 (None 时只输出到stderr)
    pub log_dir: Option<PathBuf>,
}

/// 配置服务
///
/// 从环境变量加载配置,职责单一:
/// - 可选加载 .env 文件
/// - 解析 `QR_LOGIN_*` 变量,非法值回退默认值并告警
pub struct ConfigService;

impl ConfigService {
    /// 从进程环境加载配置
    ///
    /// .env 文件不存在不是错误。
    pub fn load() -> LoginConfig {
        if let Err(e) = dotenvy::dotenv() {
            debug!("未加载 .env 文件: {}, 使用进程环境变量", e);
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载配置 (测试时注入)
    pub fn from_lookup<F>(lookup: F) -> LoginConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults_browser = BrowserSettings::default();
        let defaults_timings = FlowTimings::default();

        let (viewport_width, viewport_height) = lookup("QR_LOGIN_VIEWPORT")
            .and_then(|raw| {
                let parsed = parse_viewport(&raw);
                if parsed.is_none() {
                    warn!(key = "QR_LOGIN_VIEWPORT", value = %raw, "配置值无效,使用默认值");
                }
                parsed
            })
            .unwrap_or((
                defaults_browser.viewport_width,
                defaults_browser.viewport_height,
            ));

        let browser = BrowserSettings {
            headless: parse_or(&lookup, "QR_LOGIN_HEADLESS", defaults_browser.headless, parse_bool),
            chrome_path: lookup("QR_LOGIN_CHROME_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            user_agent: lookup("QR_LOGIN_USER_AGENT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults_browser.user_agent),
            viewport_width,
            viewport_height,
            locale: lookup("QR_LOGIN_LOCALE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults_browser.locale),
            call_timeout: positive_secs_or(&lookup, "QR_LOGIN_CALL_TIMEOUT_SECS", defaults_browser.call_timeout),
        };

        let role_budget = positive_millis_or(&lookup, "QR_LOGIN_ROLE_BUDGET_MS", defaults_timings.role_budget);
        let timings = FlowTimings {
            settle: millis_or(&lookup, "QR_LOGIN_SETTLE_MS", defaults_timings.settle),
            qr_render: millis_or(&lookup, "QR_LOGIN_QR_RENDER_MS", defaults_timings.qr_render),
            poll_interval: positive_secs_or(&lookup, "QR_LOGIN_POLL_INTERVAL_SECS", defaults_timings.poll_interval),
            poll_timeout: positive_secs_or(&lookup, "QR_LOGIN_POLL_TIMEOUT_SECS", defaults_timings.poll_timeout),
            cooldown: secs_or(&lookup, "QR_LOGIN_COOLDOWN_SECS", defaults_timings.cooldown),
            candidate_wait: millis_or(&lookup, "QR_LOGIN_CANDIDATE_WAIT_MS", defaults_timings.candidate_wait),
            role_budget: role_budget.min(MAX_ROLE_BUDGET),
            indicator_wait: millis_or(&lookup, "QR_LOGIN_INDICATOR_WAIT_MS", defaults_timings.indicator_wait),
        };

        let log_dir = lookup("QR_LOGIN_LOG_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                if v == "default" {
                    default_log_dir()
                } else {
                    PathBuf::from(v)
                }
            });

        LoginConfig {
            browser,
            timings,
            log_dir,
        }
    }
}

/// 默认日志目录
///
/// - Linux: `~/.local/share/qr-login-helper/logs`
/// - macOS: `~/Library/Application Support/qr-login-helper/logs`
/// - Windows: `C:\Users\<user>\AppData\Local\qr-login-helper\logs`
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("qr-login-helper"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T, parse: fn(&str) -> Option<T>) -> T
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse(raw.trim()).unwrap_or_else(|| {
            warn!(key = key, value = %raw, "配置值无效,使用默认值");
            default
        }),
        None => default,
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default, |v| v.parse::<u64>().ok().map(Duration::from_millis))
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default, |v| v.parse::<u64>().ok().map(Duration::from_secs))
}

/// 零值无意义的时长 (轮询间隔、超时、角色总时长)
fn positive_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default, |v| {
        v.parse::<u64>().ok().filter(|n| *n > 0).map(Duration::from_millis)
    })
}

fn positive_secs_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default, |v| {
        v.parse::<u64>().ok().filter(|n| *n > 0).map(Duration::from_secs)
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// 解析 `1280x800` 形式的视口
fn parse_viewport(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
    let height = h.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
    Some((width, height))
}
