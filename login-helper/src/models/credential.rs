/// 浏览器上下文中的原始cookie
///
/// 只保留归一化需要的三个字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

impl RawCookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }

    /// `name=value` 形式
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// 登录凭证
///
/// 一次成功会话只产生一个,构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// `name=value` 以 `"; "` 连接,已按平台域名过滤
    cookies: String,

    /// 用户昵称 (可能为空)
    nickname: String,
}

impl Credential {
    pub fn new(cookies: String, nickname: String) -> Self {
        Self { cookies, nickname }
    }

    pub fn cookies(&self) -> &str {
        &self.cookies
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// 是否包含指定cookie键
    pub fn contains_cookie(&self, name: &str) -> bool {
        self.cookies
            .split("; ")
            .any(|pair| pair.split_once('=').map(|(k, _)| k) == Some(name))
    }

    /// cookie键名列表 (用于日志,不包含值)
    ///
    /// # 示例
    /// ```
    /// use qr_login_helper::models::Credential;
    /// let c = Credential::new("MUSIC_U=abc; __csrf=x".into(), String::new());
    /// assert_eq!(c.sample_for_logging(), "MUSIC_U, __csrf");
    /// ```
    pub fn sample_for_logging(&self) -> String {
        self.cookies
            .split("; ")
            .filter_map(|pair| pair.split_once('=').map(|(k, _)| k))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// cookie数量
    pub fn cookie_count(&self) -> usize {
        if self.cookies.is_empty() {
            0
        } else {
            self.cookies.split("; ").count()
        }
    }

    pub fn into_parts(self) -> (String, String) {
        (self.cookies, self.nickname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_cookie_pair() {
        let cookie = RawCookie::new("MUSIC_U", "abc", ".music.163.com");
        assert_eq!(cookie.pair(), "MUSIC_U=abc");
    }

    #[test]
    fn test_contains_cookie() {
        let credential = Credential::new("qm_keyst=k; uin=o123".into(), "123".into());
        assert!(credential.contains_cookie("qm_keyst"));
        assert!(credential.contains_cookie("uin"));
        assert!(!credential.contains_cookie("qm_key"));
    }

    #[test]
    fn test_sample_hides_values() {
        let credential = Credential::new("MUSIC_U=secret; NMTID=other".into(), String::new());
        let sample = credential.sample_for_logging();
        assert!(!sample.contains("secret"));
        assert!(sample.contains("MUSIC_U"));
        assert!(sample.contains("NMTID"));
    }

    #[test]
    fn test_cookie_count() {
        assert_eq!(Credential::new(String::new(), String::new()).cookie_count(), 0);
        assert_eq!(Credential::new("a=1; b=2".into(), String::new()).cookie_count(), 2);
    }
}
