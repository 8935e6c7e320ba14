use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use vigil_config::{DeviceConfig, VigilConfig};
use vigil_core::SystemClock;
use vigil_detect::DetectionMachine;
use vigil_onvif::{OnvifClient, OnvifEventStream, StreamOptions};
use vigil_record::{FfmpegLauncher, HttpSnapshotFetcher, OutputLayout, SessionManager};

use crate::pipeline::Pipeline;

/// 快照请求超时
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// 流水线构建接口
///
/// 测试用脚本化事件源与模拟采集替换真实实现。
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn build(&self, device: &DeviceConfig, config: &VigilConfig) -> Result<Pipeline>;
}

/// 生产流水线工厂
///
/// ONVIF 拉取点订阅 + ffmpeg 流复制采集 + HTTP 快照。
pub struct OnvifPipelineFactory;

#[async_trait]
impl PipelineFactory for OnvifPipelineFactory {
    async fn build(&self, device: &DeviceConfig, config: &VigilConfig) -> Result<Pipeline> {
        let client = OnvifClient::new(device.device_service_url(), device.event_service_url())
            .with_auth(device.username.clone(), device.password.clone());

        // 连接预检：失败只告警，事件流会带退避自行重试
        match client.get_device_information().await {
            Ok(device_info) => {
                info!(
                    device = %device.name,
                    model = %device_info.model,
                    firmware = %device_info.firmware_version,
                    "Connected to camera"
                );
            }
            Err(e) => {
                warn!(
                    device = %device.name,
                    error = %e,
                    "Device preflight failed, subscription will retry"
                );
            }
        }

        let subscription = &config.subscription;
        let mut stream = OnvifEventStream::new(
            client,
            device.name.clone(),
            StreamOptions {
                renew_margin: subscription.renew_margin(),
                reconnect_base: Duration::from_secs(subscription.reconnect_base_secs),
                reconnect_max: Duration::from_secs(subscription.reconnect_max_secs),
            },
        );

        if let Err(e) = stream.connect().await {
            warn!(device = %device.name, error = %e, "Initial subscribe failed, will reconnect");
        }

        let recording = &config.recording;
        let sessions = SessionManager::new(
            device.name.clone(),
            device.stream_url(recording.stream_format),
            OutputLayout::new(recording.output_root.clone(), device.name.clone(), device.channel),
            Arc::new(HttpSnapshotFetcher::new(device.snapshot_url(), SNAPSHOT_TIMEOUT)),
            Arc::new(FfmpegLauncher::new()),
            recording.grace_period(),
        );

        let machine = DetectionMachine::new(device.name.clone(), recording.post_detection());

        Ok(Pipeline::new(
            device.name.clone(),
            Box::new(stream),
            machine,
            sessions,
            Arc::new(SystemClock),
            subscription.pull_timeout(),
        ))
    }
}
