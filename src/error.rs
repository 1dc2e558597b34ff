//! 错误类型 (Error types)
//!
//! 只在调用方需要按错误种类分支的地方使用具体类型,
//! 其余启动路径统一使用 `anyhow`。

use thiserror::Error;

/// 视频传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// 暂时不可用 (尚未连接 / 流卡顿), 调用方应重试
    #[error("stream unavailable: {0}")]
    Unavailable(String),

    /// 连接已关闭
    #[error("stream closed")]
    Closed,

    /// 帧解码失败 (单帧丢弃)
    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("http transport error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// 是否可以在下一次读取时自动恢复
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Decode(_))
    }
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Self::Unavailable(format!("http status {}", code)),
            ureq::Error::Transport(t) => Self::Http(t.to_string()),
        }
    }
}

/// 远程监控服务错误 (告警 / 心跳)
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport: {0}")]
    Transport(String),

    #[error("payload: {0}")]
    Payload(String),
}

impl From<ureq::Error> for LinkError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Self::Status(code),
            ureq::Error::Transport(t) => Self::Transport(t.to_string()),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Unavailable("warming up".into()).is_transient());
        assert!(TransportError::Decode("bad jpeg".into()).is_transient());
        assert!(!TransportError::Closed.is_transient());
        assert!(!TransportError::Http("refused".into()).is_transient());
    }
}
