//! 扫码登录服务 - 核心状态机
//!
//! 职责:
//! - 打开首页并触发登录弹窗
//! - 截取二维码 (frame -> 顶层页面 -> 登录弹窗 逐级兜底)
//! - 轮询cookie与提示元素,判定成功 / 已扫码 / 过期
//! - 过期后冷却并重新获取二维码,成功后生成登录凭证
//!
//! 状态转换见 [`LoginState`]。错误事件不在这里输出,
//! 由命令层统一转换,保证每次调用恰好一个终态事件。

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::{
    Credential, LoginError, LoginEvent, LoginSession, LoginState, NicknameStrategy, Platform,
    PlatformProfile, RawCookie, Role, SCANNED_STATUS_CODE,
};
use crate::services::browser_service::BrowserDriver;
use crate::services::config_service::FlowTimings;
use crate::services::credential_normalizer::{self, filter_domain, has_auth_cookie};
use crate::services::event_emitter::EventSink;
use crate::services::selector_resolver::{ResolveOptions, SelectorResolver};

/// 单轮轮询的结果
enum PollOutcome {
    /// 出现登录标志cookie,携带当时的全部原始cookie
    Authenticated(Vec<RawCookie>),
    /// 过期提示出现,或轮询超时
    Expired,
}

/// 扫码登录服务
///
/// 一次调用一个实例,独占浏览器驱动与事件输出。
pub struct QrLoginService<'a, D: BrowserDriver + ?Sized, S: EventSink + ?Sized> {
    driver: &'a D,
    sink: &'a mut S,
    profile: &'static PlatformProfile,
    timings: FlowTimings,
    session: LoginSession,
}

impl<'a, D: BrowserDriver + ?Sized, S: EventSink + ?Sized> QrLoginService<'a, D, S> {
    pub fn new(driver: &'a D, sink: &'a mut S, platform: Platform, timings: FlowTimings) -> Self {
        Self {
            driver,
            sink,
            profile: platform.profile(),
            timings,
            session: LoginSession::new(platform),
        }
    }

    pub fn session(&self) -> &LoginSession {
        &self.session
    }

    /// 运行登录流程直到成功或失败
    ///
    /// 成功时已输出 `login_success`;失败时状态为 `Failed`,
    /// 由调用方输出 `error`。
    pub async fn run(&mut self) -> Result<Credential, LoginError> {
        let span = info_span!(
            "qr_login",
            session_id = %self.session.session_id,
            platform = %self.session.platform
        );

        let result = self.drive().instrument(span).await;
        if let Err(e) = &result {
            self.session.transition(LoginState::Failed);
            warn!(
                session_id = %self.session.session_id,
                attempt = self.session.attempt,
                error = %e,
                "登录流程失败"
            );
        }
        result
    }

    async fn drive(&mut self) -> Result<Credential, LoginError> {
        loop {
            if let Some(raw) = self.attempt().await? {
                self.advance(LoginState::Success);
                let credential = self.finish(&raw).await;
                info!(
                    attempt = self.session.attempt,
                    cookie_count = credential.cookie_count(),
                    cookies = %credential.sample_for_logging(),
                    has_nickname = !credential.nickname().is_empty(),
                    duration_secs = self.session.duration_seconds(),
                    "登录成功"
                );
                self.sink.emit(LoginEvent::login_success(credential.clone()))?;
                return Ok(credential);
            }

            self.advance(LoginState::Expired);
            self.sink.emit(LoginEvent::Expired)?;
            info!(attempt = self.session.attempt, "二维码已过期,冷却后重新获取");
            sleep(self.timings.cooldown).await;
        }
    }

    /// 一轮二维码: 打开首页到轮询结束
    ///
    /// 登录成功时返回当时的原始cookie,过期时返回 None。
    async fn attempt(&mut self) -> Result<Option<Vec<RawCookie>>, LoginError> {
        self.session.begin_attempt();
        self.open_landing().await?;

        self.advance(LoginState::Triggered);
        self.trigger_login().await?;

        let image = self.capture_qr().await?;
        self.advance(LoginState::QrCaptured);
        self.sink.emit(LoginEvent::qr_ready(image))?;

        self.advance(LoginState::Polling);
        match self.poll().await? {
            PollOutcome::Authenticated(raw) => Ok(Some(raw)),
            PollOutcome::Expired => Ok(None),
        }
    }

    fn advance(&mut self, next: LoginState) {
        let prev = self.session.transition(next);
        debug!(from = %prev, to = %next, "状态转换");
    }

    fn resolver(&self, options: ResolveOptions) -> SelectorResolver<'a, D> {
        SelectorResolver::new(self.driver, options)
    }

    async fn open_landing(&self) -> Result<(), LoginError> {
        info!(
            attempt = self.session.attempt,
            url = self.profile.landing_url,
            "打开首页"
        );
        self.driver.goto(self.profile.landing_url).await?;
        sleep(self.timings.settle).await;
        Ok(())
    }

    /// 点击登录入口;找不到时直接导航到登录页
    ///
    /// 两种情况都继续截取二维码,部分页面无需点击即显示二维码。
    async fn trigger_login(&self) -> Result<(), LoginError> {
        let resolver = self.resolver(ResolveOptions::from_timings(&self.timings));
        let trigger = resolver
            .resolve(Role::LoginTrigger, self.profile.locators(Role::LoginTrigger))
            .await?;

        let clicked = match trigger {
            Some(element) => match self.driver.click(&element).await {
                Ok(()) => true,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(error = %e, "点击登录按钮失败");
                    false
                }
            },
            None => false,
        };

        if clicked {
            info!("已点击登录按钮");
        } else if let Some(login_url) = self.profile.login_url {
            info!(url = login_url, "未找到登录按钮,直接导航到登录页");
            match self.driver.goto(login_url).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "导航到登录页失败"),
            }
        } else {
            debug!("未找到登录按钮,直接尝试截取二维码");
        }

        sleep(self.timings.qr_render).await;
        Ok(())
    }

    /// 截取二维码并编码为base64
    ///
    /// 二维码候选表中 frame 候选在前,顶层页面在后;都失败时截取登录弹窗。
    async fn capture_qr(&self) -> Result<String, LoginError> {
        let resolver = self.resolver(ResolveOptions::from_timings(&self.timings));

        for role in [Role::QrImage, Role::LoginModal] {
            let Some(element) = resolver.resolve(role, self.profile.locators(role)).await? else {
                continue;
            };

            match self.driver.screenshot(&element).await {
                Ok(png) => {
                    info!(role = %role, bytes = png.len(), "二维码截图成功");
                    return Ok(general_purpose::STANDARD.encode(png));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(role = %role, error = %e, "截图失败,尝试下一级"),
            }
        }

        Err(LoginError::QrCodeNotFound {
            platform: self.profile.platform,
        })
    }

    /// 轮询登录状态
    ///
    /// 每个间隔读取一次cookie;同一轮中cookie成功优先于过期提示。
    async fn poll(&mut self) -> Result<PollOutcome, LoginError> {
        let deadline = Instant::now() + self.timings.poll_timeout;
        let indicator = ResolveOptions::indicator(&self.timings);
        let mut tick: u32 = 0;

        info!(
            attempt = self.session.attempt,
            timeout_secs = self.timings.poll_timeout.as_secs(),
            "开始轮询登录状态"
        );

        while Instant::now() < deadline {
            sleep(self.timings.poll_interval).await;
            tick += 1;

            let raw = self.driver.cookies().await?;
            if has_auth_cookie(&filter_domain(&raw, self.profile), self.profile) {
                info!(tick, "检测到登录cookie");
                return Ok(PollOutcome::Authenticated(raw));
            }

            let resolver = self.resolver(indicator);
            let scanned = resolver
                .resolve(Role::ScanIndicator, self.profile.locators(Role::ScanIndicator))
                .await?;
            if scanned.is_some() {
                debug!(tick, "已扫码,等待确认");
                self.sink.emit(LoginEvent::status(SCANNED_STATUS_CODE))?;
                continue;
            }

            let expired = resolver
                .resolve(
                    Role::ExpiryIndicator,
                    self.profile.locators(Role::ExpiryIndicator),
                )
                .await?;
            if expired.is_some() {
                info!(tick, "检测到二维码过期提示");
                return Ok(PollOutcome::Expired);
            }
        }

        info!(tick, "轮询超时,按过期处理");
        Ok(PollOutcome::Expired)
    }

    /// 生成凭证 (昵称获取失败不影响结果)
    async fn finish(&self, raw: &[RawCookie]) -> Credential {
        let draft = credential_normalizer::normalize(raw, self.profile, "");
        let nickname = self.resolve_nickname(draft.cookies(), raw).await;
        credential_normalizer::normalize(raw, self.profile, &nickname)
    }

    async fn resolve_nickname(&self, cookie_header: &str, raw: &[RawCookie]) -> String {
        match &self.profile.nickname {
            NicknameStrategy::AccountApi {
                request,
                json_pointer,
                landing_fallback,
            } => {
                match self.driver.fetch_json(request, cookie_header).await {
                    Ok(body) => {
                        if let Some(name) = nickname_at(&body, json_pointer) {
                            return name;
                        }
                        debug!("账号接口未返回昵称");
                    }
                    Err(e) => warn!(error = %e, "账号接口调用失败"),
                }

                if *landing_fallback {
                    self.nickname_from_landing().await
                } else {
                    String::new()
                }
            }
            NicknameStrategy::CookieValue { cookie_names } => {
                let in_domain = filter_domain(raw, self.profile);
                cookie_names
                    .iter()
                    .find_map(|name| in_domain.iter().find(|c| c.name == *name))
                    .map(|c| c.value.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// 回到首页读取页头昵称
    async fn nickname_from_landing(&self) -> String {
        if let Err(e) = self.driver.goto(self.profile.landing_url).await {
            warn!(error = %e, "返回首页失败,放弃获取昵称");
            return String::new();
        }
        sleep(self.timings.settle).await;

        let resolver = self.resolver(ResolveOptions::from_timings(&self.timings));
        let label = match resolver
            .resolve(Role::NicknameLabel, self.profile.locators(Role::NicknameLabel))
            .await
        {
            Ok(Some(label)) => label,
            Ok(None) => return String::new(),
            Err(e) => {
                warn!(error = %e, "昵称元素解析失败");
                return String::new();
            }
        };

        match self.driver.inner_text(&label).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "读取昵称失败");
                String::new()
            }
        }
    }
}

/// 按 JSON 指针取非空字符串
fn nickname_at(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
