use serde::{Deserialize, Serialize};

use crate::models::Credential;

/// 行协议事件
///
/// 每个事件序列化为一行JSON写入stdout:
/// - `qr_ready`: 二维码可供展示
/// - `status`: 中间进度 (如已扫码,等待确认)
/// - `login_success`: 终态成功
/// - `expired`: 当前二维码失效,随后会有新的 `qr_ready`
/// - `error`: 终态失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginEvent {
    QrReady {
        /// base64编码的PNG
        image: String,
    },
    Status {
        code: i32,
    },
    LoginSuccess {
        cookies: String,
        nickname: String,
    },
    Expired,
    Error {
        message: String,
    },
}

impl LoginEvent {
    pub fn qr_ready(image: String) -> Self {
        LoginEvent::QrReady { image }
    }

    pub fn status(code: i32) -> Self {
        LoginEvent::Status { code }
    }

    pub fn login_success(credential: Credential) -> Self {
        let (cookies, nickname) = credential.into_parts();
        LoginEvent::LoginSuccess { cookies, nickname }
    }

    pub fn error(message: impl Into<String>) -> Self {
        LoginEvent::Error {
            message: message.into(),
        }
    }

    /// 协议中的 `type` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            LoginEvent::QrReady { .. } => "qr_ready",
            LoginEvent::Status { .. } => "status",
            LoginEvent::LoginSuccess { .. } => "login_success",
            LoginEvent::Expired => "expired",
            LoginEvent::Error { .. } => "error",
        }
    }

    /// 是否为终态事件 (每次调用恰好一个)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoginEvent::LoginSuccess { .. } | LoginEvent::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let cases = vec![
            (
                LoginEvent::qr_ready("iVBORw0KGgo=".into()),
                json!({"type": "qr_ready", "image": "iVBORw0KGgo="}),
            ),
            (
                LoginEvent::status(802),
                json!({"type": "status", "code": 802}),
            ),
            (
                LoginEvent::login_success(Credential::new("MUSIC_U=abc".into(), "张三".into())),
                json!({"type": "login_success", "cookies": "MUSIC_U=abc", "nickname": "张三"}),
            ),
            (LoginEvent::Expired, json!({"type": "expired"})),
            (
                LoginEvent::error("无法获取网易云二维码"),
                json!({"type": "error", "message": "无法获取网易云二维码"}),
            ),
        ];

        for (event, expected) in cases {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value, expected, "{}", event.kind());
        }
    }

    #[test]
    fn test_parse_from_line() {
        let event: LoginEvent = serde_json::from_str(r#"{"type":"status","code":802}"#).unwrap();
        assert_eq!(event, LoginEvent::status(802));
    }

    #[test]
    fn test_terminal_events() {
        assert!(LoginEvent::error("x").is_terminal());
        assert!(LoginEvent::LoginSuccess {
            cookies: "a=1".into(),
            nickname: String::new()
        }
        .is_terminal());
        assert!(!LoginEvent::Expired.is_terminal());
        assert!(!LoginEvent::status(802).is_terminal());
        assert!(!LoginEvent::qr_ready(String::new()).is_terminal());
    }
}
