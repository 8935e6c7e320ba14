use tokio::sync::broadcast;
use tracing::info;

/// 关闭信号来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Term,

    /// SIGINT / Ctrl+C
    Interrupt,

    /// 程序内触发
    Manual,
}

/// 全局关闭控制器
///
/// 每条流水线订阅一个接收端；触发后所有流水线协作式退出，
/// 进行中的录像先被优雅收尾。
pub struct ShutdownController {
    tx: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.tx.subscribe()
    }

    /// 可克隆的发送端，供流水线任务在重启时重新订阅
    pub fn sender(&self) -> broadcast::Sender<ShutdownSignal> {
        self.tx.clone()
    }

    /// 手动触发关闭
    pub fn trigger(&self) {
        info!("Shutdown triggered");
        let _ = self.tx.send(ShutdownSignal::Manual);
    }

    /// 阻塞等待系统信号并广播
    #[cfg(unix)]
    pub async fn listen_for_system_signal(&self) -> ShutdownSignal {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                return self.wait_for_ctrl_c().await;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGINT handler");
                return self.wait_for_ctrl_c().await;
            }
        };

        let received = tokio::select! {
            _ = sigterm.recv() => ShutdownSignal::Term,
            _ = sigint.recv() => ShutdownSignal::Interrupt,
        };

        info!(signal = ?received, "Received shutdown signal");
        let _ = self.tx.send(received);
        received
    }

    #[cfg(not(unix))]
    pub async fn listen_for_system_signal(&self) -> ShutdownSignal {
        self.wait_for_ctrl_c().await
    }

    async fn wait_for_ctrl_c(&self) -> ShutdownSignal {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
        }
        let _ = self.tx.send(ShutdownSignal::Interrupt);
        ShutdownSignal::Interrupt
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
