use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 检测事件
///
/// 由订阅客户端从原始协议通知归一化而来，
/// 不做持久化，仅在流水线内部流转。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// 设备名称
    pub device: String,

    /// 本地接收时间
    pub observed_at: DateTime<Utc>,

    /// 是否检测到人
    pub is_present: bool,
}

impl DetectionEvent {
    pub fn new(device: impl Into<String>, observed_at: DateTime<Utc>, is_present: bool) -> Self {
        Self {
            device: device.into(),
            observed_at,
            is_present,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_construction() {
        let at = Utc::now();
        let event = DetectionEvent::new("front", at, true);

        assert_eq!(event.device, "front");
        assert_eq!(event.observed_at, at);
        assert!(event.is_present);
    }
}
