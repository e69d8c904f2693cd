//! 测试公共模块
//!
//! 提供脚本化的Mock浏览器和测试工具。
//! Mock浏览器按 (frame, 查询表达式) 决定元素是否可见,
//! 按调用次数决定 cookie 内容,并记录导航、点击、截图与关闭。

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use qr_login_helper::models::{ApiRequest, LoginError, LoginEvent, Query, RawCookie};
use qr_login_helper::services::{BrowserDriver, ElementHandle, FlowTimings, FrameRef, LineEmitter};

/// 模拟的故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// 浏览器断开 (平台级)
    Disconnected,
    /// frame 已分离 (候选级)
    Detached,
    /// 单次调用超时 (候选级)
    Timeout,
}

impl Failure {
    fn to_error(self, what: &str) -> LoginError {
        match self {
            Failure::Disconnected => LoginError::BrowserDisconnected(what.to_string()),
            Failure::Detached => LoginError::FrameDetached(what.to_string()),
            Failure::Timeout => LoginError::Timeout(what.to_string()),
        }
    }
}

type ElementKey = (Option<String>, Query);

#[derive(Default)]
struct MockState {
    frames: Vec<FrameRef>,
    visible: HashSet<ElementKey>,
    failing_queries: HashMap<ElementKey, Failure>,
    /// 无视等待参数、卡住指定时长的查询
    hanging_queries: HashMap<ElementKey, Duration>,
    texts: HashMap<String, String>,
    failing_screenshots: HashSet<String>,
    failing_gotos: HashSet<String>,
    /// (从第几次调用开始, cookie列表)
    cookie_schedule: Vec<(u32, Vec<RawCookie>)>,
    cookie_failure: Option<(u32, Failure)>,
    cookie_calls: u32,
    account_api: Option<Value>,
    api_headers: Vec<String>,
    visited: Vec<String>,
    clicks: Vec<String>,
    screenshots: Vec<ElementHandle>,
    queries: u32,
    shutdown_calls: u32,
}

/// Mock浏览器
///
/// 克隆共享同一状态,测试在会话结束后检查记录。
#[derive(Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

/// 元素标记: `<frame>|<查询>`
pub fn marker_for(frame: Option<&str>, query: &Query) -> String {
    let query = match query {
        Query::Css(selector) => format!("css={}", selector),
        Query::Text(text) => format!("text={}", text),
    };
    format!("{}|{}", frame.unwrap_or("page"), query)
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加 frame
    pub async fn add_frame(&self, id: &str, url: &str) {
        self.state.lock().await.frames.push(FrameRef {
            id: id.to_string(),
            url: url.to_string(),
        });
    }

    /// 顶层页面中的元素可见
    pub async fn show(&self, query: Query) {
        self.state.lock().await.visible.insert((None, query));
    }

    /// frame 中的元素可见
    pub async fn show_in_frame(&self, frame_id: &str, query: Query) {
        self.state
            .lock()
            .await
            .visible
            .insert((Some(frame_id.to_string()), query));
    }

    /// 顶层页面中查询该元素时失败
    pub async fn fail_query(&self, query: Query, failure: Failure) {
        self.state
            .lock()
            .await
            .failing_queries
            .insert((None, query), failure);
    }

    /// 顶层页面中查询该元素时卡住 `stall` 后才返回未命中 (不理会等待参数)
    pub async fn hang_query(&self, query: Query, stall: Duration) {
        self.state
            .lock()
            .await
            .hanging_queries
            .insert((None, query), stall);
    }

    /// 设置元素文本 (同时设为可见)
    pub async fn set_text(&self, query: Query, text: &str) {
        let mut state = self.state.lock().await;
        state.texts.insert(marker_for(None, &query), text.to_string());
        state.visible.insert((None, query));
    }

    pub async fn fail_screenshot(&self, query: Query) {
        self.state
            .lock()
            .await
            .failing_screenshots
            .insert(marker_for(None, &query));
    }

    pub async fn fail_goto(&self, url: &str) {
        self.state.lock().await.failing_gotos.insert(url.to_string());
    }

    /// 从第 `call` 次读取开始返回 `cookies`
    pub async fn cookies_from_call(&self, call: u32, cookies: Vec<RawCookie>) {
        let mut state = self.state.lock().await;
        state.cookie_schedule.push((call, cookies));
        state.cookie_schedule.sort_by_key(|(from, _)| *from);
    }

    /// 从第 `call` 次读取开始cookie读取失败
    pub async fn fail_cookies_from_call(&self, call: u32, failure: Failure) {
        self.state.lock().await.cookie_failure = Some((call, failure));
    }

    pub async fn set_account_api(&self, body: Value) {
        self.state.lock().await.account_api = Some(body);
    }

    pub async fn visited(&self) -> Vec<String> {
        self.state.lock().await.visited.clone()
    }

    pub async fn clicks(&self) -> Vec<String> {
        self.state.lock().await.clicks.clone()
    }

    pub async fn screenshots(&self) -> Vec<ElementHandle> {
        self.state.lock().await.screenshots.clone()
    }

    pub async fn api_headers(&self) -> Vec<String> {
        self.state.lock().await.api_headers.clone()
    }

    pub async fn cookie_calls(&self) -> u32 {
        self.state.lock().await.cookie_calls
    }

    pub async fn query_count(&self) -> u32 {
        self.state.lock().await.queries
    }

    pub async fn shutdown_calls(&self) -> u32 {
        self.state.lock().await.shutdown_calls
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn goto(&self, url: &str) -> Result<(), LoginError> {
        let mut state = self.state.lock().await;
        state.visited.push(url.to_string());
        if state.failing_gotos.contains(url) {
            return Err(LoginError::Navigation {
                url: url.to_string(),
                message: "net::ERR_ABORTED".to_string(),
            });
        }
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<FrameRef>, LoginError> {
        Ok(self.state.lock().await.frames.clone())
    }

    async fn query_visible(
        &self,
        frame: Option<&FrameRef>,
        query: &Query,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, LoginError> {
        let key = (frame.map(|f| f.id.clone()), *query);
        let (found, stall) = {
            let mut state = self.state.lock().await;
            state.queries += 1;
            if let Some(failure) = state.failing_queries.get(&key) {
                return Err(failure.to_error(&marker_for(key.0.as_deref(), query)));
            }
            (state.visible.contains(&key), state.hanging_queries.get(&key).copied())
        };

        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            return Ok(None);
        }

        if found {
            return Ok(Some(ElementHandle {
                frame: frame.cloned(),
                marker: marker_for(key.0.as_deref(), query),
            }));
        }

        // 未命中时等满可见性等待
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), LoginError> {
        self.state.lock().await.clicks.push(element.marker.clone());
        Ok(())
    }

    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, LoginError> {
        let mut state = self.state.lock().await;
        if state.failing_screenshots.contains(&element.marker) {
            return Err(LoginError::ElementNotFound(element.marker.clone()));
        }
        state.screenshots.push(element.clone());
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, LoginError> {
        self.state
            .lock()
            .await
            .texts
            .get(&element.marker)
            .cloned()
            .ok_or_else(|| LoginError::ElementNotFound(element.marker.clone()))
    }

    async fn cookies(&self) -> Result<Vec<RawCookie>, LoginError> {
        let mut state = self.state.lock().await;
        state.cookie_calls += 1;
        let call = state.cookie_calls;

        if let Some((from, failure)) = state.cookie_failure {
            if call >= from {
                return Err(failure.to_error("cookies"));
            }
        }

        Ok(state
            .cookie_schedule
            .iter()
            .rev()
            .find(|(from, _)| call >= *from)
            .map(|(_, cookies)| cookies.clone())
            .unwrap_or_default())
    }

    async fn fetch_json(
        &self,
        request: &ApiRequest,
        cookie_header: &str,
    ) -> Result<Value, LoginError> {
        let mut state = self.state.lock().await;
        state.api_headers.push(cookie_header.to_string());
        state
            .account_api
            .clone()
            .ok_or_else(|| LoginError::Network(format!("{} 无法连接到服务器", request.url)))
    }

    async fn shutdown(&mut self) -> Result<(), LoginError> {
        self.state.lock().await.shutdown_calls += 1;
        Ok(())
    }
}

/// 测试用时长: 轮询10秒超时,提示探测不等待
pub fn test_timings() -> FlowTimings {
    FlowTimings {
        settle: Duration::from_secs(2),
        qr_render: Duration::from_secs(3),
        poll_interval: Duration::from_secs(2),
        poll_timeout: Duration::from_secs(10),
        cooldown: Duration::from_secs(2),
        candidate_wait: Duration::from_millis(100),
        role_budget: Duration::from_secs(1),
        indicator_wait: Duration::ZERO,
    }
}

/// 解析输出的事件行
pub fn parse_events(emitter: LineEmitter<Vec<u8>>) -> Vec<LoginEvent> {
    String::from_utf8(emitter.into_inner())
        .expect("输出必须是UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("每行必须是一个JSON事件"))
        .collect()
}

/// 事件类型序列
pub fn kinds(events: &[LoginEvent]) -> Vec<&'static str> {
    events.iter().map(LoginEvent::kind).collect()
}

/// 恰好一个终态事件,且位于末尾
pub fn assert_single_terminal(events: &[LoginEvent]) {
    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "终态事件数量错误: {:?}", kinds(events));
    assert!(
        events.last().map(LoginEvent::is_terminal).unwrap_or(false),
        "终态事件必须是最后一个: {:?}",
        kinds(events)
    );
}

/// 网易云登录后的cookie
pub fn netease_cookies() -> Vec<RawCookie> {
    vec![
        RawCookie::new("NMTID", "n1", ".music.163.com"),
        RawCookie::new("_ga", "ga", ".google-analytics.com"),
        RawCookie::new("MUSIC_U", "abc", ".music.163.com"),
        RawCookie::new("__csrf", "x", "music.163.com"),
    ]
}

/// QQ音乐登录后的cookie
pub fn qq_cookies() -> Vec<RawCookie> {
    vec![
        RawCookie::new("uin", "o0012345", ".qq.com"),
        RawCookie::new("pgv_pvid", "p", ".other.com"),
        RawCookie::new("qm_keyst", "k", ".y.qq.com"),
    ]
}
