use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use vigil_core::{Clock, DetectionEvent, EventSource};
use vigil_detect::{DetectionMachine, SessionCommand};
use vigil_record::SessionManager;

use crate::signal::ShutdownSignal;

/// 单设备流水线
///
/// 订阅客户端、检测状态机与录像会话管理器的组合，
/// 作为一个独立任务运行，与其他设备不共享任何可变状态。
/// 事件按到达顺序处理，每条会话命令执行完毕后才处理下一条。
pub struct Pipeline {
    device: String,
    source: Box<dyn EventSource>,
    machine: DetectionMachine,
    sessions: SessionManager,
    clock: Arc<dyn Clock>,
    pull_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        device: impl Into<String>,
        source: Box<dyn EventSource>,
        machine: DetectionMachine,
        sessions: SessionManager,
        clock: Arc<dyn Clock>,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            device: device.into(),
            source,
            machine,
            sessions,
            clock,
            pull_timeout,
        }
    }

    /// 运行直到关闭信号或事件源不可恢复
    ///
    /// 事件等待以 `pull_timeout` 为界，因此即使没有任何事件，
    /// 每个节拍都会执行一次进程检查与截止时间检查。
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<ShutdownSignal>) -> Result<()> {
        info!(device = %self.device, "Pipeline started");

        let outcome = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(device = %self.device, "Pipeline received shutdown signal");
                    break Ok(());
                }
                result = self.source.next_event(self.pull_timeout) => {
                    match result {
                        Ok(Some(event)) => self.handle_event(event).await,
                        Ok(None) => {}
                        Err(e) => {
                            error!(device = %self.device, error = %e, "Event source failed");
                            break Err(e);
                        }
                    }

                    self.tick().await;
                }
            }
        };

        self.teardown().await;
        outcome
    }

    async fn handle_event(&mut self, event: DetectionEvent) {
        let now = self.clock.now();
        if let Some(command) = self.machine.on_event(&event, now) {
            self.apply(command).await;
        }
    }

    /// 每节拍维护：采集进程故障检查 + 截止时间检查
    async fn tick(&mut self) {
        if self.sessions.check_process() {
            // 进程死亡即会话结束，状态机回到 IDLE，
            // 下一次阳性检测开启全新会话
            self.machine.reset();
        }

        let now = self.clock.now();
        if let Some(command) = self.machine.on_tick(now) {
            self.apply(command).await;
        }
    }

    async fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { at } => {
                if let Err(e) = self.sessions.start_session(at).await {
                    error!(device = %self.device, error = %e, "Session start failed");
                    self.machine.reset();
                }
            }
            SessionCommand::Extend { deadline } => {
                self.sessions.extend_session(deadline);
            }
            SessionCommand::Stop => {
                if let Err(e) = self.sessions.stop_session().await {
                    error!(device = %self.device, error = %e, "Session stop failed");
                }
            }
        }
    }

    /// 协作式收尾
    ///
    /// 先关订阅，再优雅停掉进行中的录像，最后报告完成；
    /// 关闭不会丢弃或截断进行中的文件。
    async fn teardown(&mut self) {
        self.source.close().await;

        if self.sessions.is_active() {
            warn!(device = %self.device, "Stopping in-flight recording for shutdown");
            if let Err(e) = self.sessions.stop_session().await {
                error!(device = %self.device, error = %e, "Session stop failed during shutdown");
            }
        }

        debug!(device = %self.device, "Pipeline teardown complete");
        info!(device = %self.device, "Pipeline stopped");
    }
}
