//! 浏览器服务 - 页面能力抽象与 Chromium 实现
//!
//! 职责:
//! - 定义状态机所需的最小浏览器能力 (`BrowserDriver`)
//! - 启动并持有单个 Chromium 实例与页面
//! - 在主页面和跨域 frame 中查找可见元素、点击、截图、读取cookie
//!
//! 跨域登录组件 (如 QQ 的 ptlogin iframe) 通过 isolated world 访问,
//! 不依赖页面脚本环境。每个 frame 只创建一个 world,上下文失效后才重建。

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::GetBoxModelParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CreateIsolatedWorldParams,
    FrameId, FrameTree, GetFrameTreeParams, Viewport as ClipRect,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId, RemoteObject};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::models::{ApiRequest, HttpMethod, LoginError, Query, RawCookie};
use crate::services::config_service::BrowserSettings;

/// 可见性轮询间隔
const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// 元素标记属性 (同一元素重复解析得到同一标记)
const HANDLE_ATTR: &str = "data-qrl-handle";

/// isolated world 名称 (调试工具中可见)
const WORLD_NAME: &str = "qr-login-helper";

const WEBDRIVER_OVERRIDE: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// 在当前文档中查找第一个可见匹配元素,返回其标记
const LOOKUP_JS: &str = r#"
(() => {
    const q = __QUERY__;
    const visible = (el) => {
        const rect = el.getBoundingClientRect();
        if (rect.width <= 0 || rect.height <= 0) return false;
        const style = window.getComputedStyle(el);
        return style.display !== 'none'
            && style.visibility !== 'hidden'
            && parseFloat(style.opacity || '1') > 0;
    };
    let nodes;
    if (q.kind === 'css') {
        nodes = Array.from(document.querySelectorAll(q.value));
    } else {
        nodes = Array.from(document.querySelectorAll('body *')).filter((el) =>
            Array.from(el.childNodes).some(
                (n) => n.nodeType === Node.TEXT_NODE && n.textContent.includes(q.value)
            )
        );
    }
    const el = nodes.find(visible);
    if (!el) return null;
    let marker = el.getAttribute('data-qrl-handle');
    if (!marker) {
        const root = document.documentElement;
        const seq = parseInt(root.getAttribute('data-qrl-seq') || '0', 10) + 1;
        root.setAttribute('data-qrl-seq', String(seq));
        marker = String(seq);
        el.setAttribute('data-qrl-handle', marker);
    }
    return marker;
})()
"#;

/// frame 执行上下文缓存
///
/// 以 frame id 为键。失效只移除仍指向旧上下文的条目,
/// 避免覆盖其他调用刚建好的新上下文。
#[derive(Debug)]
struct FrameContexts<C> {
    entries: HashMap<String, C>,
}

impl<C: Clone + PartialEq> FrameContexts<C> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn get(&self, frame_id: &str) -> Option<C> {
        self.entries.get(frame_id).cloned()
    }

    fn insert(&mut self, frame_id: &str, context: C) {
        self.entries.insert(frame_id.to_string(), context);
    }

    /// 移除失效上下文,返回是否移除
    fn invalidate(&mut self, frame_id: &str, stale: &C) -> bool {
        if self.entries.get(frame_id) == Some(stale) {
            self.entries.remove(frame_id);
            true
        } else {
            false
        }
    }

    /// 只保留仍在页面中的 frame
    fn retain_frames(&mut self, frames: &[FrameRef]) {
        self.entries
            .retain(|id, _| frames.iter().any(|frame| frame.id == *id));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// frame 引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub id: String,
    pub url: String,
}

/// 已解析的元素
///
/// 元素所在 frame 为 None 表示顶层页面。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub frame: Option<FrameRef>,
    pub marker: String,
}

/// 浏览器能力
///
/// 状态机只通过这组操作与页面交互,测试时以脚本化实现替换。
/// 错误分类遵循 `LoginError::is_fatal`: 连接断开等平台级故障必须原样返回。
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 导航到指定地址
    async fn goto(&self, url: &str) -> Result<(), LoginError>;

    /// 当前页面的全部 frame (含主 frame)
    async fn frames(&self) -> Result<Vec<FrameRef>, LoginError>;

    /// 在 `frame` (None 为顶层页面) 中等待 `query` 的第一个可见匹配,最多等 `wait`
    async fn query_visible(
        &self,
        frame: Option<&FrameRef>,
        query: &Query,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, LoginError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), LoginError>;

    /// 元素截图 (PNG)
    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, LoginError>;

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, LoginError>;

    /// 浏览器上下文中的全部cookie,保持浏览器返回顺序
    async fn cookies(&self) -> Result<Vec<RawCookie>, LoginError>;

    /// 携带cookie调用JSON接口
    async fn fetch_json(&self, request: &ApiRequest, cookie_header: &str)
        -> Result<Value, LoginError>;

    /// 关闭浏览器,每个会话恰好调用一次
    async fn shutdown(&mut self) -> Result<(), LoginError>;
}

/// Chromium 驱动
///
/// 单个浏览器进程 + 单个页面,随会话创建和销毁。
pub struct ChromiumDriver {
    browser: Option<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    http: reqwest::Client,
    call_timeout: Duration,
    contexts: Mutex<FrameContexts<ExecutionContextId>>,
}

impl ChromiumDriver {
    /// 启动浏览器并打开空白页
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, LoginError> {
        info!(
            headless = settings.headless,
            viewport = %format!("{}x{}", settings.viewport_width, settings.viewport_height),
            "启动 Chromium 实例"
        );

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            })
            .request_timeout(settings.call_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--lang={}", settings.locale))
            // 登录 iframe 与主页面同进程,才能直接取元素盒模型
            .arg("--disable-features=IsolateOrigins,site-per-process");

        if settings.headless {
            builder = builder.with_head().arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| LoginError::BrowserLaunch(format!("浏览器配置失败: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LoginError::BrowserLaunch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("浏览器事件处理错误: {}", e);
                }
            }
            debug!("浏览器事件处理器已退出");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| LoginError::BrowserLaunch(format!("创建页面失败: {}", e)))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            WEBDRIVER_OVERRIDE.to_string(),
        ))
        .await
        .map_err(|e| LoginError::BrowserLaunch(format!("注入脚本失败: {}", e)))?;

        page.set_user_agent(settings.user_agent.as_str())
            .await
            .map_err(|e| LoginError::BrowserLaunch(format!("设置 UserAgent 失败: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.call_timeout)
            .build()
            .map_err(|e| LoginError::BrowserLaunch(format!("HTTP客户端初始化失败: {}", e)))?;

        info!("Chromium 实例启动成功");

        Ok(Self {
            browser: Some(browser),
            page,
            handler_task,
            http,
            call_timeout: settings.call_timeout,
            contexts: Mutex::new(FrameContexts::new()),
        })
    }

    /// 单次调用加超时上限
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, LoginError>
    where
        F: Future<Output = Result<T, CdpError>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(LoginError::from),
            Err(_) => Err(LoginError::Timeout(what.to_string())),
        }
    }

    /// frame 的 isolated world 上下文 (有缓存时直接复用)
    async fn frame_context(&self, frame: &FrameRef) -> Result<ExecutionContextId, LoginError> {
        if let Some(context) = self.contexts.lock().await.get(&frame.id) {
            return Ok(context);
        }

        let mut params = CreateIsolatedWorldParams::new(FrameId::new(frame.id.clone()));
        params.world_name = Some(WORLD_NAME.to_string());
        let response = self
            .bounded("createIsolatedWorld", self.page.execute(params))
            .await
            .map_err(|e| match e {
                LoginError::Browser(message) => {
                    LoginError::FrameDetached(format!("{}: {}", frame.url, message))
                }
                other => other,
            })?;

        let context = response.result.execution_context_id.clone();
        let mut contexts = self.contexts.lock().await;
        contexts.insert(&frame.id, context.clone());
        debug!(frame = %frame.url, worlds = contexts.len(), "创建 isolated world");
        Ok(context)
    }

    /// 在 frame (None 为顶层页面) 中执行脚本
    ///
    /// frame 导航后缓存的上下文失效: 丢弃后用新上下文重试一次。
    async fn evaluate_in(
        &self,
        frame: Option<&FrameRef>,
        expression: String,
        by_value: bool,
    ) -> Result<RemoteObject, LoginError> {
        let Some(frame) = frame else {
            return self.evaluate(None, expression, by_value).await;
        };

        let context = self.frame_context(frame).await?;
        match self
            .evaluate(Some(context.clone()), expression.clone(), by_value)
            .await
        {
            Err(LoginError::Browser(message)) => {
                if !self.contexts.lock().await.invalidate(&frame.id, &context) {
                    return Err(LoginError::Browser(message));
                }
                debug!(frame = %frame.url, error = %message, "执行上下文失效,重建");
                let fresh = self.frame_context(frame).await?;
                self.evaluate(Some(fresh), expression, by_value).await
            }
            other => other,
        }
    }

    async fn evaluate(
        &self,
        context: Option<ExecutionContextId>,
        expression: String,
        by_value: bool,
    ) -> Result<RemoteObject, LoginError> {
        let mut params = EvaluateParams::new(expression);
        params.context_id = context;
        params.return_by_value = Some(by_value);
        params.await_promise = Some(true);

        let response = self.bounded("evaluate", self.page.execute(params)).await?;
        if let Some(details) = response.result.exception_details {
            return Err(LoginError::Script(details.text));
        }
        Ok(response.result.result)
    }

    /// 在元素上执行脚本 (`el` 已绑定到标记对应的元素,可能为 null)
    async fn eval_on(&self, element: &ElementHandle, body: &str) -> Result<Value, LoginError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); {} }})()",
            marker_selector(&element.marker),
            body
        );
        let object = self
            .evaluate_in(element.frame.as_ref(), expression, true)
            .await?;
        Ok(object.value.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<(), LoginError> {
        debug!(url = %url, "页面导航");
        self.bounded("goto", self.page.goto(url))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                LoginError::Browser(message) => LoginError::Navigation {
                    url: url.to_string(),
                    message,
                },
                other => other,
            })
    }

    async fn frames(&self) -> Result<Vec<FrameRef>, LoginError> {
        let response = self
            .bounded("getFrameTree", self.page.execute(GetFrameTreeParams::default()))
            .await?;

        let mut frames = Vec::new();
        flatten_frames(&response.result.frame_tree, &mut frames);
        self.contexts.lock().await.retain_frames(&frames);
        Ok(frames)
    }

    async fn query_visible(
        &self,
        frame: Option<&FrameRef>,
        query: &Query,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, LoginError> {
        let deadline = Instant::now() + wait;
        let expression = LOOKUP_JS.replace("__QUERY__", &query_literal(query));

        loop {
            let object = self.evaluate_in(frame, expression.clone(), true).await?;

            if let Some(Value::String(marker)) = object.value {
                return Ok(Some(ElementHandle {
                    frame: frame.cloned(),
                    marker,
                }));
            }

            if Instant::now() + VISIBILITY_POLL > deadline {
                return Ok(None);
            }
            sleep(VISIBILITY_POLL).await;
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), LoginError> {
        let clicked = self
            .eval_on(
                element,
                "if (!el) return false; el.scrollIntoView({ block: 'center' }); el.click(); return true;",
            )
            .await?;

        match clicked {
            Value::Bool(true) => Ok(()),
            _ => Err(LoginError::ElementNotFound(element.marker.clone())),
        }
    }

    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, LoginError> {
        let present = self
            .eval_on(
                element,
                "if (!el) return false; el.scrollIntoView({ block: 'center', inline: 'center' }); return true;",
            )
            .await?;
        if present != Value::Bool(true) {
            return Err(LoginError::ElementNotFound(element.marker.clone()));
        }

        let object = self
            .evaluate_in(
                element.frame.as_ref(),
                format!("document.querySelector({})", marker_selector(&element.marker)),
                false,
            )
            .await?;
        let object_id = object
            .object_id
            .ok_or_else(|| LoginError::ElementNotFound(element.marker.clone()))?;

        let box_model = self
            .bounded(
                "getBoxModel",
                self.page.execute(GetBoxModelParams {
                    node_id: None,
                    backend_node_id: None,
                    object_id: Some(object_id),
                }),
            )
            .await?;

        let quad = box_model.result.model.content.inner();
        let xs = quad.iter().step_by(2);
        let ys = quad.iter().skip(1).step_by(2);
        let (min_x, max_x) = xs.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let (min_y, max_y) = ys.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let (width, height) = (max_x - min_x, max_y - min_y);
        if !(width > 0.0 && height > 0.0) {
            return Err(LoginError::ElementNotFound(format!(
                "{} 尺寸为零",
                element.marker
            )));
        }

        // 盒模型坐标相对视口,截图裁剪区域相对文档
        let scroll = self
            .evaluate(None, "[window.scrollX, window.scrollY]".to_string(), true)
            .await?
            .value
            .unwrap_or(Value::Null);
        let scroll_x = scroll.get(0).and_then(Value::as_f64).unwrap_or(0.0);
        let scroll_y = scroll.get(1).and_then(Value::as_f64).unwrap_or(0.0);

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(ClipRect {
                x: min_x + scroll_x,
                y: min_y + scroll_y,
                width,
                height,
                scale: 1.0,
            })
            .build();

        let png = self.bounded("screenshot", self.page.screenshot(params)).await?;
        debug!(bytes = png.len(), "元素截图完成");
        Ok(png)
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, LoginError> {
        match self.eval_on(element, "return el ? el.innerText : null;").await? {
            Value::String(text) => Ok(text),
            _ => Err(LoginError::ElementNotFound(element.marker.clone())),
        }
    }

    async fn cookies(&self) -> Result<Vec<RawCookie>, LoginError> {
        let cookies = self.bounded("getCookies", self.page.get_cookies()).await?;
        Ok(cookies
            .into_iter()
            .map(|c| RawCookie::new(c.name, c.value, c.domain))
            .collect())
    }

    async fn fetch_json(
        &self,
        request: &ApiRequest,
        cookie_header: &str,
    ) -> Result<Value, LoginError> {
        let builder = match request.method {
            HttpMethod::Get => self.http.get(request.url),
            HttpMethod::Post => self.http.post(request.url),
        };

        let response = builder
            .header(reqwest::header::COOKIE, cookie_header)
            .header(reqwest::header::REFERER, request.referer)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }

    async fn shutdown(&mut self) -> Result<(), LoginError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        info!("正在关闭浏览器实例");
        if finish_within(self.call_timeout, "close", browser.close()).await {
            finish_within(self.call_timeout, "wait", browser.wait()).await;
        }
        self.handler_task.abort();
        info!("浏览器实例已关闭");
        Ok(())
    }
}

/// 关闭阶段的有限等待,失败或超时只告警,返回是否正常完成
async fn finish_within<T, E, F>(limit: Duration, step: &str, fut: F) -> bool
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(step = step, error = %e, "关闭浏览器失败");
            false
        }
        Err(_) => {
            warn!(step = step, timeout_secs = limit.as_secs(), "关闭浏览器超时");
            false
        }
    }
}

fn flatten_frames(tree: &FrameTree, out: &mut Vec<FrameRef>) {
    out.push(FrameRef {
        id: tree.frame.id.inner().clone(),
        url: tree.frame.url.clone(),
    });
    if let Some(children) = &tree.child_frames {
        for child in children {
            flatten_frames(child, out);
        }
    }
}

/// 查询表达式的JS字面量
fn query_literal(query: &Query) -> String {
    let (kind, value) = match query {
        Query::Css(selector) => ("css", *selector),
        Query::Text(text) => ("text", *text),
    };
    json!({ "kind": kind, "value": value }).to_string()
}

/// 标记对应的CSS选择器 (JS字符串字面量)
fn marker_selector(marker: &str) -> String {
    Value::String(format!("[{}=\"{}\"]", HANDLE_ATTR, marker)).to_string()
}
