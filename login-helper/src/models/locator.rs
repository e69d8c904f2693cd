use std::fmt;

/// 元素查询表达式
///
/// - `Css`: 标准CSS选择器
/// - `Text`: 元素自身文本包含给定字符串 (不含子元素文本)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    Css(&'static str),
    Text(&'static str),
}

/// 搜索范围
///
/// 登录组件经常托管在跨域 iframe 中 (如 QQ 的 ptlogin),
/// 因此定位器需要声明在主页面还是某个 URL 匹配的 frame 中查找。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// 顶层页面
    Page,
    /// URL 包含指定子串的任意 frame
    FrameUrlContains(&'static str),
}

/// 单个定位器: 查询表达式 + 搜索范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub query: Query,
    pub scope: SearchScope,
}

impl Locator {
    /// 在顶层页面按CSS查找
    pub const fn css(selector: &'static str) -> Self {
        Self {
            query: Query::Css(selector),
            scope: SearchScope::Page,
        }
    }

    /// 在顶层页面按文本查找
    pub const fn text(text: &'static str) -> Self {
        Self {
            query: Query::Text(text),
            scope: SearchScope::Page,
        }
    }

    /// 改为在 URL 包含 `url_contains` 的 frame 中查找
    pub const fn in_frame(mut self, url_contains: &'static str) -> Self {
        self.scope = SearchScope::FrameUrlContains(url_contains);
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.query {
            Query::Css(selector) => write!(f, "css={}", selector)?,
            Query::Text(text) => write!(f, "text={}", text)?,
        }
        if let SearchScope::FrameUrlContains(hint) = self.scope {
            write!(f, " @frame[{}]", hint)?;
        }
        Ok(())
    }
}

/// 有序候选定位器列表
///
/// 顺序即优先级: 第一个解析到可见元素的候选胜出。
/// 构造后不可变,站点改版时只需修改数据表,不需要改算法。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSpec {
    candidates: Vec<Locator>,
}

impl LocatorSpec {
    pub fn new(candidates: Vec<Locator>) -> Self {
        Self { candidates }
    }

    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// 语义角色
///
/// 状态机只按角色请求元素,每个平台把角色映射到自己的 `LocatorSpec`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// 登录入口按钮
    LoginTrigger,
    /// 二维码图片
    QrImage,
    /// 登录弹窗 (二维码截图的最后兜底)
    LoginModal,
    /// "已扫码,等待确认" 提示
    ScanIndicator,
    /// 二维码过期提示或刷新按钮
    ExpiryIndicator,
    /// 登录后页头昵称
    NicknameLabel,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::LoginTrigger => "login-trigger",
            Role::QrImage => "qr-image",
            Role::LoginModal => "login-modal",
            Role::ScanIndicator => "scan-indicator",
            Role::ExpiryIndicator => "expiry-indicator",
            Role::NicknameLabel => "nickname-label",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
