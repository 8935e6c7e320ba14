use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// 采集结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// 进程在宽限期内自行退出，输出文件已收尾
    Graceful,

    /// 宽限期内未退出，被强制终止
    Killed,

    /// 停止请求到达时进程早已退出
    AlreadyExited,
}

/// 采集进程句柄
///
/// 会话管理器从启动到确认停止独占持有；所有退出路径
/// 都会尝试终止进程。
#[async_trait]
pub trait CaptureProcess: Send + Sync {
    /// 非阻塞检查进程是否退出，返回退出码
    fn try_status(&mut self) -> Result<Option<i32>>;

    /// 请求优雅终止，超过宽限期后强制杀死
    async fn stop(&mut self, grace: Duration) -> Result<CaptureOutcome>;
}

/// 采集启动接口
#[async_trait]
pub trait CaptureLauncher: Send + Sync {
    async fn launch(&self, stream_url: &str, output: &Path) -> Result<Box<dyn CaptureProcess>>;
}

/// ffmpeg 流复制采集
///
/// 视频流不重编码直接复制，音频转 AAC 以兼容 MP4。
pub struct FfmpegLauncher {
    binary: String,
}

impl FfmpegLauncher {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(stream_url: &str, output: &Path) -> Vec<String> {
        vec![
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            "-i".to_string(),
            stream_url.to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureLauncher for FfmpegLauncher {
    async fn launch(&self, stream_url: &str, output: &Path) -> Result<Box<dyn CaptureProcess>> {
        let child = Command::new(&self.binary)
            .args(Self::build_args(stream_url, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        debug!(output = %output.display(), "Capture process spawned");

        Ok(Box::new(FfmpegProcess { child }))
    }
}

/// 运行中的 ffmpeg 进程
pub struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl CaptureProcess for FfmpegProcess {
    fn try_status(&mut self) -> Result<Option<i32>> {
        let status = self.child.try_wait()?;
        Ok(status.map(|s| s.code().unwrap_or(-1)))
    }

    async fn stop(&mut self, grace: Duration) -> Result<CaptureOutcome> {
        if self.child.try_wait()?.is_some() {
            return Ok(CaptureOutcome::AlreadyExited);
        }

        // ffmpeg 对 stdin 的 'q' 会收尾输出文件后退出
        if let Some(stdin) = self.child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(b"q").await {
                debug!(error = %e, "Capture stdin already closed");
            } else {
                let _ = stdin.flush().await;
            }
        }

        match timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(code = ?status.code(), "Capture process exited gracefully");
                Ok(CaptureOutcome::Graceful)
            }
            Err(_) => {
                warn!("Capture process ignored quit request, killing");
                self.child.start_kill()?;
                self.child.wait().await?;
                Ok(CaptureOutcome::Killed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_args_stream_copy() {
        let args = FfmpegLauncher::build_args(
            "rtsp://admin:x@10.0.0.1:554/Preview_01_main",
            &PathBuf::from("/tmp/out.mp4"),
        );

        let copy_pos = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[copy_pos + 1], "copy");
        assert!(args.contains(&"-rtsp_transport".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_build_args_input_before_output() {
        let args = FfmpegLauncher::build_args("rtsp://x", &PathBuf::from("/tmp/out.mp4"));

        let input = args.iter().position(|a| a == "-i").unwrap();
        let output = args.iter().position(|a| a == "/tmp/out.mp4").unwrap();
        assert!(input < output);
    }

    #[tokio::test]
    async fn test_launch_missing_binary_fails() {
        let launcher = FfmpegLauncher::with_binary("vigil-no-such-binary");
        let result = launcher
            .launch("rtsp://x", &PathBuf::from("/tmp/out.mp4"))
            .await;

        assert!(result.is_err());
    }
}
