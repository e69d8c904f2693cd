//! 凭证归一化
//!
//! 把浏览器上下文中的原始cookie整理成调用方需要的形式:
//! 按平台域名族过滤,保持浏览器顺序,以 `"; "` 连接。

use crate::models::{Credential, PlatformProfile, RawCookie};

/// cookie 域名是否属于 `family` 域名族
///
/// 去掉前导 `.` 后,等于 `family` 或以 `.family` 结尾。
/// `evil163.com` 不属于 `163.com`。
pub fn matches_domain(cookie_domain: &str, family: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    if domain.eq_ignore_ascii_case(family) {
        return true;
    }
    domain.len() > family.len()
        && domain.as_bytes()[domain.len() - family.len() - 1] == b'.'
        && domain[domain.len() - family.len()..].eq_ignore_ascii_case(family)
}

/// 过滤出属于平台域名族的cookie
pub fn filter_domain<'a>(raw: &'a [RawCookie], profile: &PlatformProfile) -> Vec<&'a RawCookie> {
    raw.iter()
        .filter(|c| matches_domain(&c.domain, profile.cookie_domain))
        .collect()
}

/// 已过滤cookie中是否出现登录标志键
pub fn has_auth_cookie(cookies: &[&RawCookie], profile: &PlatformProfile) -> bool {
    cookies.iter().any(|c| profile.is_auth_cookie(&c.name))
}

/// 去掉平台昵称前缀并修剪空白
///
/// # 示例
/// ```
/// use qr_login_helper::services::credential_normalizer::clean_nickname;
/// assert_eq!(clean_nickname(" o12345 ", Some("o")), "12345");
/// assert_eq!(clean_nickname("张三", None), "张三");
/// ```
pub fn clean_nickname(raw: &str, prefix: Option<&str>) -> String {
    let trimmed = raw.trim();
    let stripped = match prefix {
        Some(p) => trimmed.strip_prefix(p).unwrap_or(trimmed),
        None => trimmed,
    };
    stripped.trim().to_string()
}

/// 生成登录凭证
///
/// 昵称获取失败时传入空字符串,不影响凭证本身。
pub fn normalize(raw: &[RawCookie], profile: &PlatformProfile, nickname: &str) -> Credential {
    let cookies = filter_domain(raw, profile)
        .into_iter()
        .map(RawCookie::pair)
        .collect::<Vec<_>>()
        .join("; ");

    Credential::new(cookies, clean_nickname(nickname, profile.nickname_prefix))
}
