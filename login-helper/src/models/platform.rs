//! 平台数据表
//!
//! 每个平台的选择器、cookie 键名、昵称获取策略都是纯数据,
//! 与解析算法分离: 站点改版时只需调整这里的表。

use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;

use crate::models::errors::LoginError;
use crate::models::locator::{Locator, LocatorSpec, Role};

/// 目标平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// 网易云音乐
    Netease,
    /// QQ音乐
    Qq,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Netease => "netease",
            Platform::Qq => "qq",
        }
    }

    /// 面向用户的名称,用于错误消息
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Netease => "网易云",
            Platform::Qq => "QQ音乐",
        }
    }

    /// 平台数据表
    pub fn profile(&self) -> &'static PlatformProfile {
        match self {
            Platform::Netease => &*NETEASE,
            Platform::Qq => &*QQ,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LoginError;

    /// 大小写不敏感: `NetEase` 与 `netease` 等价
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netease" => Ok(Platform::Netease),
            "qq" => Ok(Platform::Qq),
            _ => Err(LoginError::InvalidArgument(format!(
                "unknown platform: {}",
                s
            ))),
        }
    }
}

/// HTTP 方法 (昵称API)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 已认证的JSON接口请求描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: &'static str,
    pub referer: &'static str,
}

/// 昵称获取策略
#[derive(Debug, Clone)]
pub enum NicknameStrategy {
    /// 用新获得的cookie调用账号接口,从JSON中按指针取值;
    /// 接口无结果时回到首页读取页头昵称
    AccountApi {
        request: ApiRequest,
        json_pointer: &'static str,
        landing_fallback: bool,
    },
    /// 从cookie值中提取 (按顺序取第一个存在的cookie)
    CookieValue {
        cookie_names: &'static [&'static str],
    },
}

/// 单个平台的全部静态配置
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub platform: Platform,

    /// 首页 (START 状态导航目标)
    pub landing_url: &'static str,

    /// 找不到登录按钮时直接导航的登录地址
    pub login_url: Option<&'static str>,

    /// 可注册域名族 (cookie 域名后缀匹配)
    pub cookie_domain: &'static str,

    /// 任一出现即视为登录成功的cookie键
    pub auth_cookie_keys: &'static [&'static str],

    /// 昵称需要去掉的前缀 (QQ uin 形如 `o12345`)
    pub nickname_prefix: Option<&'static str>,

    pub nickname: NicknameStrategy,

    login_trigger: LocatorSpec,
    qr_image: LocatorSpec,
    login_modal: LocatorSpec,
    scan_indicator: LocatorSpec,
    expiry_indicator: LocatorSpec,
    nickname_label: LocatorSpec,
}

impl PlatformProfile {
    /// 语义角色 -> 候选定位器
    pub fn locators(&self, role: Role) -> &LocatorSpec {
        match role {
            Role::LoginTrigger => &self.login_trigger,
            Role::QrImage => &self.qr_image,
            Role::LoginModal => &self.login_modal,
            Role::ScanIndicator => &self.scan_indicator,
            Role::ExpiryIndicator => &self.expiry_indicator,
            Role::NicknameLabel => &self.nickname_label,
        }
    }

    /// 是否为登录成功标志cookie
    pub fn is_auth_cookie(&self, name: &str) -> bool {
        self.auth_cookie_keys.contains(&name)
    }
}

/// "已扫码,等待手机确认" 的状态码 (调用方按 802 识别)
pub const SCANNED_STATUS_CODE: i32 = 802;

/// 登录组件所在 frame 的 URL 特征
const QQ_LOGIN_FRAME: &str = "ptlogin";

static NETEASE: Lazy<PlatformProfile> = Lazy::new(|| PlatformProfile {
    platform: Platform::Netease,
    landing_url: "https://music.163.com/",
    login_url: Some("https://music.163.com/#/login"),
    cookie_domain: "163.com",
    auth_cookie_keys: &["MUSIC_U"],
    nickname_prefix: None,
    nickname: NicknameStrategy::AccountApi {
        request: ApiRequest {
            method: HttpMethod::Post,
            url: "https://music.163.com/api/nuser/account/get",
            referer: "https://music.163.com/",
        },
        json_pointer: "/profile/nickname",
        landing_fallback: true,
    },
    login_trigger: LocatorSpec::new(vec![
        Locator::css("a.link.s-fc3"),
        Locator::css("a[href=\"javascript:void(0)\"]"),
        Locator::text("登录"),
    ]),
    qr_image: LocatorSpec::new(vec![
        Locator::css(".qr-code-area img"),
        Locator::css(".qr-code img"),
        Locator::css("img[src*='qrcode']"),
        Locator::css("img[src*='login']"),
        Locator::css("canvas"),
        Locator::css(".j-img"),
        Locator::css("#qrImg"),
        Locator::css("img.qr"),
    ]),
    login_modal: LocatorSpec::new(vec![
        Locator::css(".m-layer"),
        Locator::css(".u-layer"),
        Locator::css(".login-box"),
        Locator::css(".qr-login"),
        Locator::css("[class*='login']"),
    ]),
    scan_indicator: LocatorSpec::new(vec![
        Locator::text("扫描成功"),
        Locator::text("请在手机上确认登录"),
    ]),
    expiry_indicator: LocatorSpec::new(vec![
        Locator::text("二维码已过期"),
        Locator::text("二维码已失效"),
        Locator::text("已失效"),
        Locator::text("expired"),
    ]),
    nickname_label: LocatorSpec::new(vec![
        Locator::css(".head_name .f-thide"),
        Locator::css(".nickname"),
        Locator::css("span.name"),
    ]),
});

static QQ: Lazy<PlatformProfile> = Lazy::new(|| PlatformProfile {
    platform: Platform::Qq,
    landing_url: "https://y.qq.com/",
    // y.qq.com 没有独立的登录页,登录弹窗只能从页头打开
    login_url: None,
    cookie_domain: "qq.com",
    auth_cookie_keys: &["qqmusic_key", "qm_keyst"],
    nickname_prefix: Some("o"),
    nickname: NicknameStrategy::CookieValue {
        cookie_names: &["uin", "p_uin"],
    },
    login_trigger: LocatorSpec::new(vec![
        Locator::css("a.top_login__link"),
        Locator::text("登录"),
        Locator::css(".login_link"),
        Locator::css("a[href*='login']"),
    ]),
    qr_image: LocatorSpec::new(vec![
        Locator::css("#qrlogin_img").in_frame(QQ_LOGIN_FRAME),
        Locator::css("img[src*='ptqrshow']").in_frame(QQ_LOGIN_FRAME),
        Locator::css("img.qr").in_frame(QQ_LOGIN_FRAME),
        Locator::css("img[src*='qr']"),
        Locator::css("img[src*='ptqrshow']"),
        Locator::css("#login_qr_img"),
        Locator::css("canvas"),
    ]),
    login_modal: LocatorSpec::new(vec![
        Locator::css(".login_dialog"),
        Locator::css(".mod_login"),
        Locator::css("[class*='login']"),
    ]),
    scan_indicator: LocatorSpec::new(vec![
        Locator::text("扫描成功").in_frame(QQ_LOGIN_FRAME),
        Locator::text("请在手机上确认").in_frame(QQ_LOGIN_FRAME),
    ]),
    expiry_indicator: LocatorSpec::new(vec![
        Locator::text("二维码已失效").in_frame(QQ_LOGIN_FRAME),
        Locator::text("已过期").in_frame(QQ_LOGIN_FRAME),
        Locator::css("#qr_invalid").in_frame(QQ_LOGIN_FRAME),
    ]),
    nickname_label: LocatorSpec::empty(),
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::locator::SearchScope;

    #[test]
    fn test_parse_platform() {
        assert_eq!("netease".parse::<Platform>().unwrap(), Platform::Netease);
        assert_eq!("QQ".parse::<Platform>().unwrap(), Platform::Qq);
        assert_eq!(" NetEase ".parse::<Platform>().unwrap(), Platform::Netease);

        let err = "spotify".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "unknown platform: spotify");
    }

    #[test]
    fn test_profile_matches_platform() {
        assert_eq!(Platform::Netease.profile().platform, Platform::Netease);
        assert_eq!(Platform::Qq.profile().platform, Platform::Qq);
    }

    #[test]
    fn test_auth_cookie_keys() {
        let netease = Platform::Netease.profile();
        assert!(netease.is_auth_cookie("MUSIC_U"));
        assert!(!netease.is_auth_cookie("NMTID"));

        let qq = Platform::Qq.profile();
        assert!(qq.is_auth_cookie("qqmusic_key"));
        assert!(qq.is_auth_cookie("qm_keyst"));
        assert!(!qq.is_auth_cookie("uin"));
    }

    #[test]
    fn test_qq_qr_prefers_login_frame() {
        let spec = Platform::Qq.profile().locators(Role::QrImage);
        let first = spec.candidates()[0];
        assert_eq!(first.scope, SearchScope::FrameUrlContains("ptlogin"));

        // frame 候选全部排在页面候选之前
        let first_page = spec
            .candidates()
            .iter()
            .position(|l| l.scope == SearchScope::Page)
            .unwrap();
        assert!(spec.candidates()[first_page..]
            .iter()
            .all(|l| l.scope == SearchScope::Page));
    }

    #[test]
    fn test_every_platform_has_core_roles() {
        for platform in [Platform::Netease, Platform::Qq] {
            let profile = platform.profile();
            for role in [
                Role::LoginTrigger,
                Role::QrImage,
                Role::LoginModal,
                Role::ScanIndicator,
                Role::ExpiryIndicator,
            ] {
                assert!(
                    !profile.locators(role).is_empty(),
                    "{} 缺少 {} 定位器",
                    platform,
                    role
                );
            }
        }
    }
}
