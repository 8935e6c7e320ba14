use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    /// 无法启动采集或分配输出路径；会话保持不存在，
    /// 下一次阳性检测会重试
    #[error("Session start failed: {0}")]
    SessionStart(String),

    /// 同一设备同时最多一个未结束会话
    #[error("Session already active for device {0}")]
    AlreadyActive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecordError>;
