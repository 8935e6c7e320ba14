use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnvifError {
    /// 网络或鉴权失败，可通过退避重连恢复
    #[error("Connect failed: {0}")]
    Connect(String),

    /// 畸形或不符合预期的通知，丢弃即可
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 事件流已关闭
    #[error("Event stream closed")]
    Closed,
}

impl From<reqwest::Error> for OnvifError {
    fn from(e: reqwest::Error) -> Self {
        OnvifError::Connect(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OnvifError>;
