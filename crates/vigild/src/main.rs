use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_config::ConfigLoader;
use vigil_supervisor::{OnvifPipelineFactory, Supervisor};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vigil camera event watcher")]
struct Args {
    /// 配置文件路径
    #[arg(long, default_value = "vigil.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 配置无效属于致命错误，在任何流水线启动之前退出
    let config = ConfigLoader::new(&args.config)
        .load()
        .context("Invalid startup configuration")?;

    info!(
        devices = config.enabled_devices().len(),
        output_root = %config.recording.output_root.display(),
        post_detection_secs = config.recording.post_detection_secs,
        "Vigil starting"
    );

    let supervisor = Arc::new(Supervisor::new(config, Arc::new(OnvifPipelineFactory)));

    let run = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    // 等待 SIGTERM/SIGINT 后广播关闭，所有流水线确认退出才结束
    supervisor
        .shutdown_controller()
        .listen_for_system_signal()
        .await;

    run.await?;

    info!("Vigil stopped");
    Ok(())
}
