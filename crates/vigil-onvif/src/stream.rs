use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vigil_core::{DetectionEvent, EventSource};

use crate::backoff::Backoff;
use crate::client::{OnvifClient, PullResponse, Subscription};
use crate::error::OnvifError;

/// 人形检测规则的主题标记
const PERSON_TOPIC: &str = "PeopleDetect";

/// 事件流选项
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// 距订阅过期多久触发续订
    pub renew_margin: Duration,

    /// 重连退避基数
    pub reconnect_base: Duration,

    /// 重连退避上限
    pub reconnect_max: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            renew_margin: Duration::from_secs(10),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// ONVIF 事件流
///
/// 维护一台设备的拉取点订阅并输出归一化检测事件。
/// 连接与接收失败在内部以退避重连处理，重试不限次数；
/// 每次 `next_event` 的等待以 `timeout` 为界，保证调用方的
/// 截止时间检查不被饿死。
pub struct OnvifEventStream {
    client: OnvifClient,
    device: String,
    options: StreamOptions,

    subscription: Option<Subscription>,
    renew_before: Option<DateTime<Utc>>,

    backoff: Backoff,
    retry_at: Option<Instant>,

    pending: VecDeque<DetectionEvent>,
    closed: bool,
}

impl OnvifEventStream {
    pub fn new(client: OnvifClient, device: impl Into<String>, options: StreamOptions) -> Self {
        let backoff = Backoff::new(options.reconnect_base, options.reconnect_max);

        Self {
            client,
            device: device.into(),
            options,
            subscription: None,
            renew_before: None,
            backoff,
            retry_at: None,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// 建立订阅
    pub async fn connect(&mut self) -> crate::Result<()> {
        let subscription = self.client.create_pull_point_subscription().await?;
        self.note_termination(subscription.termination_time);
        self.subscription = Some(subscription);
        self.backoff.reset();
        self.retry_at = None;

        info!(device = %self.device, "Event subscription established");
        Ok(())
    }

    fn note_termination(&mut self, termination: DateTime<Utc>) {
        let margin = ChronoDuration::from_std(self.options.renew_margin)
            .unwrap_or_else(|_| ChronoDuration::seconds(10));
        self.renew_before = Some(termination - margin);
    }

    /// 记录失败并安排下一次重连
    fn schedule_reconnect(&mut self) -> Duration {
        self.subscription = None;
        self.renew_before = None;

        let delay = self.backoff.next_delay();
        self.retry_at = Some(Instant::now() + delay);
        delay
    }

    /// 把一次拉取响应转换为检测事件
    ///
    /// 主题不匹配或缺少布尔数据项的通知被丢弃，绝不进入状态机。
    fn collect_events(device: &str, response: &PullResponse) -> Vec<DetectionEvent> {
        let mut events = Vec::new();

        for notification in &response.notifications {
            if !notification.topic.contains(PERSON_TOPIC) {
                debug!(
                    device = %device,
                    topic = %notification.topic,
                    "Discarding notification with unrelated topic"
                );
                continue;
            }

            match notification.is_present {
                Some(is_present) => {
                    debug!(
                        device = %device,
                        is_present,
                        device_time = ?notification.utc_time,
                        "Person detection notification"
                    );
                    events.push(DetectionEvent::new(device, Utc::now(), is_present));
                }
                None => {
                    debug!(device = %device, "Discarding malformed person notification");
                }
            }
        }

        events
    }
}

#[async_trait]
impl EventSource for OnvifEventStream {
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<DetectionEvent>> {
        if self.closed {
            return Err(OnvifError::Closed.into());
        }

        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        // 退避窗口内不发起新连接，等待但不超过一个节拍
        if let Some(retry_at) = self.retry_at {
            let now = Instant::now();
            if now < retry_at {
                let remaining = retry_at - now;
                tokio::time::sleep(remaining.min(timeout)).await;
                if Instant::now() < retry_at {
                    return Ok(None);
                }
            }
        }

        // 无订阅则重建
        if self.subscription.is_none() {
            match self.connect().await {
                Ok(()) => {}
                Err(e) => {
                    let delay = self.schedule_reconnect();
                    error!(
                        device = %self.device,
                        error = %e,
                        attempt = self.backoff.attempt(),
                        retry_in = ?delay,
                        "Subscription connect failed"
                    );
                    return Ok(None);
                }
            }
        }

        let subscription = match self.subscription.clone() {
            Some(s) => s,
            None => return Ok(None),
        };

        // 临近过期先续订；续订失败按整体重连处理
        if let Some(renew_before) = self.renew_before {
            if Utc::now() >= renew_before {
                match self.client.renew(&subscription).await {
                    Ok(termination) => {
                        debug!(device = %self.device, termination = %termination, "Subscription renewed");
                        self.note_termination(termination);
                    }
                    Err(e) => {
                        warn!(
                            device = %self.device,
                            error = %e,
                            "Subscription renew failed, reconnecting"
                        );
                        self.schedule_reconnect();
                        return Ok(None);
                    }
                }
            }
        }

        match self.client.pull_messages(&subscription, timeout).await {
            Ok(response) => {
                if let Some(termination) = response.termination_time {
                    self.note_termination(termination);
                }
                self.backoff.reset();

                self.pending
                    .extend(Self::collect_events(&self.device, &response));
                Ok(self.pending.pop_front())
            }
            Err(e) => {
                let delay = self.schedule_reconnect();
                error!(
                    device = %self.device,
                    error = %e,
                    retry_in = ?delay,
                    "Pull failed, subscription dropped"
                );
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.client.unsubscribe(&subscription).await {
                debug!(device = %self.device, error = %e, "Unsubscribe failed during close");
            }
        }

        info!(device = %self.device, "Event stream closed");
    }
}
