//! 选择器解析策略
//!
//! 按优先级依次尝试候选定位器,第一个解析到可见元素的候选胜出。
//! 单个候选的失败 (不存在、不可见、frame 已分离、单次超时) 只影响该候选;
//! 浏览器断开等平台级故障立即向上传播。
//!
//! 角色总时长同时约束驱动调用本身: 卡住的调用在时长耗尽时按未命中处理。

use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::models::{Locator, LocatorSpec, LoginError, Role, SearchScope};
use crate::services::browser_service::{BrowserDriver, ElementHandle};
use crate::services::config_service::{FlowTimings, MAX_ROLE_BUDGET};

/// 解析时长参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// 单个候选的可见性等待
    pub candidate_wait: Duration,

    /// 整个角色的总时长
    pub role_budget: Duration,
}

impl ResolveOptions {
    pub fn new(candidate_wait: Duration, role_budget: Duration) -> Self {
        Self {
            candidate_wait,
            role_budget: role_budget.min(MAX_ROLE_BUDGET),
        }
    }

    /// 常规解析 (按钮、二维码、弹窗)
    pub fn from_timings(timings: &FlowTimings) -> Self {
        Self::new(timings.candidate_wait, timings.role_budget)
    }

    /// 轮询中的提示探测: 每个候选只做短暂检查
    pub fn indicator(timings: &FlowTimings) -> Self {
        Self::new(timings.indicator_wait, timings.role_budget)
    }
}

/// 选择器解析器
pub struct SelectorResolver<'a, D: BrowserDriver + ?Sized> {
    driver: &'a D,
    options: ResolveOptions,
}

impl<'a, D: BrowserDriver + ?Sized> SelectorResolver<'a, D> {
    pub fn new(driver: &'a D, options: ResolveOptions) -> Self {
        Self { driver, options }
    }

    /// 解析角色
    ///
    /// # 返回值
    /// - `Ok(Some(element))`: 第一个可见候选
    /// - `Ok(None)`: 全部候选不可用 (含空列表)
    /// - `Err(e)`: 平台级故障
    pub async fn resolve(
        &self,
        role: Role,
        spec: &LocatorSpec,
    ) -> Result<Option<ElementHandle>, LoginError> {
        let deadline = Instant::now() + self.options.role_budget;

        for (index, locator) in spec.candidates().iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(role = %role, tried = index, "角色解析时长耗尽");
                break;
            }
            let wait = self.options.candidate_wait.min(remaining);

            let attempt = match timeout(remaining, self.try_candidate(locator, wait)).await {
                Ok(result) => result,
                Err(_) => Err(LoginError::Timeout(format!("{} {}", role, locator))),
            };

            match attempt {
                Ok(Some(element)) => {
                    debug!(role = %role, locator = %locator, index, "候选命中");
                    return Ok(Some(element));
                }
                Ok(None) => {
                    debug!(role = %role, locator = %locator, "候选未命中");
                }
                Err(e) if e.is_fatal() => {
                    warn!(role = %role, locator = %locator, error = %e, "解析中断");
                    return Err(e);
                }
                Err(e) => {
                    debug!(role = %role, locator = %locator, error = %e, "候选失败,继续下一个");
                }
            }
        }

        Ok(None)
    }

    async fn try_candidate(
        &self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, LoginError> {
        match locator.scope {
            SearchScope::Page => self.driver.query_visible(None, &locator.query, wait).await,
            SearchScope::FrameUrlContains(hint) => {
                let frames = self.driver.frames().await?;
                let mut matched = frames.iter().filter(|f| f.url.contains(hint)).peekable();
                if matched.peek().is_none() {
                    return Ok(None);
                }

                // 等待时长由所有匹配 frame 分摊
                let deadline = Instant::now() + wait;
                for frame in matched {
                    let slice = deadline.saturating_duration_since(Instant::now());
                    match self
                        .driver
                        .query_visible(Some(frame), &locator.query, slice)
                        .await
                    {
                        Ok(Some(element)) => return Ok(Some(element)),
                        Ok(None) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => debug!(frame = %frame.url, error = %e, "frame 查询失败"),
                    }
                }
                Ok(None)
            }
        }
    }
}
