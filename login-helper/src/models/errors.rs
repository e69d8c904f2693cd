use thiserror::Error;

use crate::models::Platform;

/// 扫码登录相关错误
///
/// 覆盖一次登录会话中可能出现的全部失败场景。
/// 分为两类:
/// - 平台级故障 (浏览器崩溃、启动失败、输出管道断开、取消): 直接终止会话
/// - 候选级故障 (元素不存在、frame已分离、单次调用超时): 由选择器解析策略吸收
#[derive(Debug, Error)]
pub enum LoginError {
    /// 浏览器启动失败
    ///
    /// 可能原因:
    /// - 未安装 Chromium / Chrome
    /// - 沙箱或共享内存受限
    #[error("浏览器启动失败: {0}")]
    BrowserLaunch(String),

    /// 浏览器连接断开
    ///
    /// CDP websocket 关闭或浏览器进程崩溃
    #[error("浏览器连接已断开: {0}")]
    BrowserDisconnected(String),

    /// 浏览器操作错误
    ///
    /// CDP 命令执行失败 (脚本异常、协议错误等)
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 页面脚本抛出异常 (执行上下文仍然有效)
    #[error("脚本异常: {0}")]
    Script(String),

    /// 页面导航失败
    #[error("页面导航失败: {url}: {message}")]
    Navigation { url: String, message: String },

    /// 元素未找到或已从DOM移除
    #[error("元素未找到: {0}")]
    ElementNotFound(String),

    /// frame 已分离 (页面跳转或登录组件重建)
    #[error("frame已分离: {0}")]
    FrameDetached(String),

    /// 单次浏览器调用超时
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 所有层级的二维码候选都无法解析
    ///
    /// 表示页面结构发生变化,需要排查,不自动重试
    #[error("无法获取{}二维码", .platform.display_name())]
    QrCodeNotFound { platform: Platform },

    /// 网络请求失败 (昵称查询等)
    #[error("网络请求失败: {0}")]
    Network(String),

    /// JSON解析失败
    #[error("响应数据解析失败: {0}")]
    JsonParse(String),

    /// 命令行参数无效
    #[error("{0}")]
    InvalidArgument(String),

    /// 行协议输出失败 (stdout 已关闭)
    #[error("事件输出失败: {0}")]
    Emit(String),

    /// 会话被外部取消 (SIGINT / SIGTERM)
    #[error("登录已取消")]
    Cancelled,
}

impl LoginError {
    /// 是否为平台级故障
    ///
    /// 平台级故障没有后备方案,必须传播到会话边界;
    /// 其余错误只影响当前候选,选择器解析会继续尝试下一个。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LoginError::BrowserLaunch(_)
                | LoginError::BrowserDisconnected(_)
                | LoginError::Emit(_)
                | LoginError::Cancelled
        )
    }
}

impl From<chromiumoxide::error::CdpError> for LoginError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;

        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                LoginError::BrowserDisconnected(err.to_string())
            }
            CdpError::Timeout => LoginError::Timeout("CDP请求超时".to_string()),
            other => LoginError::Browser(other.to_string()),
        }
    }
}

/// 实现从reqwest::Error到LoginError的转换
impl From<reqwest::Error> for LoginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LoginError::Network("请求超时".to_string())
        } else if err.is_connect() {
            LoginError::Network("无法连接到服务器".to_string())
        } else {
            LoginError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LoginError {
    fn from(err: serde_json::Error) -> Self {
        LoginError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for LoginError {
    fn from(err: std::io::Error) -> Self {
        LoginError::Emit(err.to_string())
    }
}
