use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use vigil_config::{DeviceConfig, VigilConfig};

use crate::factory::PipelineFactory;
use crate::signal::ShutdownController;

/// 摄像头监督器
///
/// 为每台启用的设备派生一条独立流水线任务。设备之间不共享
/// 可变状态，一台设备的故障不影响其余设备；关闭时等待所有
/// 流水线确认退出后才返回。
pub struct Supervisor {
    config: Arc<VigilConfig>,
    factory: Arc<dyn PipelineFactory>,
    shutdown: ShutdownController,
}

impl Supervisor {
    pub fn new(config: VigilConfig, factory: Arc<dyn PipelineFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            shutdown: ShutdownController::new(),
        }
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// 运行所有流水线直到全部退出
    pub async fn run(&self) {
        let devices: Vec<DeviceConfig> = self
            .config
            .enabled_devices()
            .into_iter()
            .cloned()
            .collect();

        info!(count = devices.len(), "Supervisor starting device pipelines");

        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();
        for device in devices {
            let name = device.name.clone();
            let handle = self.spawn_pipeline(device);
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!(device = %name, error = %e, "Pipeline task panicked");
            }
        }

        info!("All pipelines stopped, supervisor exiting");
    }

    /// 派生一条带重启策略的流水线任务
    ///
    /// 不可恢复的流水线失败触发延迟重启，超过预算后该设备
    /// 停用；兄弟流水线不受影响。
    fn spawn_pipeline(&self, device: DeviceConfig) -> JoinHandle<()> {
        let config = self.config.clone();
        let factory = self.factory.clone();
        let shutdown_tx = self.shutdown.sender();

        tokio::spawn(async move {
            let max_restarts = config.supervisor.max_pipeline_restarts;
            let restart_delay = config.supervisor.restart_delay();
            let mut attempts: u32 = 0;

            loop {
                let pipeline = match factory.build(&device, &config).await {
                    Ok(pipeline) => pipeline,
                    Err(e) => {
                        error!(
                            device = %device.name,
                            error = %e,
                            "Pipeline construction failed, device left stopped"
                        );
                        return;
                    }
                };

                match pipeline.run(shutdown_tx.subscribe()).await {
                    Ok(()) => {
                        info!(device = %device.name, "Pipeline shutdown complete");
                        return;
                    }
                    Err(e) => {
                        attempts += 1;
                        if attempts > max_restarts {
                            error!(
                                device = %device.name,
                                error = %e,
                                attempts,
                                "Pipeline restart limit reached, device left stopped"
                            );
                            return;
                        }

                        warn!(
                            device = %device.name,
                            error = %e,
                            attempt = attempts,
                            max = max_restarts,
                            delay = ?restart_delay,
                            "Pipeline failed, restarting"
                        );

                        // 重启等待期间收到关闭信号则直接退出
                        let mut shutdown_rx = shutdown_tx.subscribe();
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                info!(device = %device.name, "Shutdown during restart wait");
                                return;
                            }
                            _ = tokio::time::sleep(restart_delay) => {}
                        }
                    }
                }
            }
        })
    }
}
