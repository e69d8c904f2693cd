//! 事件输出 - 行协议
//!
//! 每个事件序列化为单行JSON并立即刷新,调用方按行读取。
//! stdout 专用于协议,诊断日志一律走 stderr。

use std::io::Write;
use tracing::{debug, warn};

use crate::models::{LoginError, LoginEvent};

/// 事件接收端
pub trait EventSink: Send {
    /// 输出一个事件
    ///
    /// 写入失败 (如管道关闭) 返回 `LoginError::Emit`,属于平台级故障。
    fn emit(&mut self, event: LoginEvent) -> Result<(), LoginError>;

    /// 是否已输出终态事件
    fn finished(&self) -> bool;
}

/// 行协议输出器
///
/// 保证每次会话至多一个终态事件: 终态之后的任何事件都被丢弃并告警。
pub struct LineEmitter<W: Write + Send> {
    writer: W,
    terminal_sent: bool,
}

impl<W: Write + Send> LineEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            terminal_sent: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineEmitter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EventSink for LineEmitter<W> {
    fn emit(&mut self, event: LoginEvent) -> Result<(), LoginError> {
        if self.terminal_sent {
            warn!(event = event.kind(), "终态事件已输出,丢弃后续事件");
            return Ok(());
        }

        let line = serde_json::to_string(&event)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;

        debug!(event = event.kind(), "事件已输出");
        if event.is_terminal() {
            self.terminal_sent = true;
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.terminal_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credential;

    fn lines(emitter: LineEmitter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(emitter.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_one_line_per_event() {
        let mut emitter = LineEmitter::new(Vec::new());
        emitter.emit(LoginEvent::qr_ready("aGVsbG8=".into())).unwrap();
        emitter.emit(LoginEvent::status(802)).unwrap();
        emitter.emit(LoginEvent::Expired).unwrap();

        let out = lines(emitter);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], r#"{"type":"qr_ready","image":"aGVsbG8="}"#);
        assert_eq!(out[1], r#"{"type":"status","code":802}"#);
        assert_eq!(out[2], r#"{"type":"expired"}"#);
    }

    #[test]
    fn test_drops_events_after_terminal() {
        let mut emitter = LineEmitter::new(Vec::new());
        emitter
            .emit(LoginEvent::login_success(Credential::new(
                "MUSIC_U=abc".into(),
                "张三".into(),
            )))
            .unwrap();
        assert!(emitter.finished());

        emitter.emit(LoginEvent::error("late")).unwrap();
        emitter.emit(LoginEvent::status(802)).unwrap();

        let out = lines(emitter);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("login_success"));
    }

    #[test]
    fn test_non_ascii_stays_on_one_line() {
        let mut emitter = LineEmitter::new(Vec::new());
        emitter
            .emit(LoginEvent::error("无法获取网易云二维码\n详情"))
            .unwrap();

        let out = lines(emitter);
        assert_eq!(out.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&out[0]).unwrap();
        assert_eq!(value["message"], "无法获取网易云二维码\n详情");
    }
}
