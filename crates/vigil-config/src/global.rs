use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::device::{DeviceConfig, StreamFormat};

/// 全局配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub subscription: SubscriptionConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            subscription: SubscriptionConfig::default(),
            supervisor: SupervisorConfig::default(),
            devices: Vec::new(),
        }
    }
}

impl VigilConfig {
    /// 启用的设备列表
    pub fn enabled_devices(&self) -> Vec<&DeviceConfig> {
        self.devices.iter().filter(|d| d.enabled).collect()
    }
}

/// 录像配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// 最后一次检测后继续录制的秒数
    pub post_detection_secs: u64,

    /// 采集进程优雅退出的宽限秒数
    pub grace_period_secs: u64,

    /// 输出根目录
    pub output_root: PathBuf,

    /// 码流格式
    #[serde(default)]
    pub stream_format: StreamFormat,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            post_detection_secs: 15,
            grace_period_secs: 10,
            output_root: PathBuf::from("./recordings"),
            stream_format: StreamFormat::H264,
        }
    }
}

impl RecordingConfig {
    pub fn post_detection(&self) -> Duration {
        Duration::from_secs(self.post_detection_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// 订阅配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// 单次拉取的等待秒数，同时也是截止时间检查的节拍上限
    pub pull_timeout_secs: u64,

    /// 距订阅过期多少秒时触发续订
    pub renew_margin_secs: u64,

    /// 重连退避基数（秒）
    pub reconnect_base_secs: u64,

    /// 重连退避上限（秒）
    pub reconnect_max_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            pull_timeout_secs: 5,
            renew_margin_secs: 10,
            reconnect_base_secs: 1,
            reconnect_max_secs: 60,
        }
    }
}

impl SubscriptionConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn renew_margin(&self) -> Duration {
        Duration::from_secs(self.renew_margin_secs)
    }
}

/// 监督器配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// 单条流水线的最大重启次数，超过后停用该设备
    pub max_pipeline_restarts: u32,

    /// 重启间隔（秒）
    pub restart_delay_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_pipeline_restarts: 5,
            restart_delay_secs: 5,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VigilConfig::default();
        assert_eq!(config.recording.post_detection_secs, 15);
        assert_eq!(config.subscription.pull_timeout_secs, 5);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_enabled_devices_filter() {
        let mut config = VigilConfig::default();
        config.devices = vec![
            DeviceConfig {
                name: "front".to_string(),
                host: "10.0.0.1".to_string(),
                port: 8000,
                rtsp_port: 554,
                channel: 0,
                username: "admin".to_string(),
                password: "x".to_string(),
                enabled: true,
            },
            DeviceConfig {
                name: "back".to_string(),
                host: "10.0.0.2".to_string(),
                port: 8000,
                rtsp_port: 554,
                channel: 0,
                username: "admin".to_string(),
                password: "x".to_string(),
                enabled: false,
            },
        ];

        let enabled = config.enabled_devices();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "front");
    }
}
