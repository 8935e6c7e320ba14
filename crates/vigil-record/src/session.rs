use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureLauncher, CaptureProcess};
use crate::error::{RecordError, Result};
use crate::paths::OutputLayout;
use crate::snapshot::SnapshotFetcher;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// 录像会话
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: String,
    pub device: String,
    pub started_at: DateTime<Utc>,

    /// 快照失败时为 None（已记录日志，不影响视频）
    pub snapshot_path: Option<PathBuf>,
    pub clip_path: PathBuf,
    pub status: SessionStatus,
}

struct ActiveSession {
    session: RecordingSession,
    process: Box<dyn CaptureProcess>,
}

/// 录像会话管理器
///
/// 每设备一个实例，同一时刻最多持有一个未结束会话。
/// 从 `start_session` 到确认停止，采集进程与两个输出路径
/// 由本管理器独占。
pub struct SessionManager {
    device: String,
    stream_url: String,
    layout: OutputLayout,
    snapshots: Arc<dyn SnapshotFetcher>,
    launcher: Arc<dyn CaptureLauncher>,
    grace: Duration,
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(
        device: impl Into<String>,
        stream_url: impl Into<String>,
        layout: OutputLayout,
        snapshots: Arc<dyn SnapshotFetcher>,
        launcher: Arc<dyn CaptureLauncher>,
        grace: Duration,
    ) -> Self {
        Self {
            device: device.into(),
            stream_url: stream_url.into(),
            layout,
            snapshots,
            launcher,
            grace,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session(&self) -> Option<&RecordingSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// 开启会话
    ///
    /// 快照恰好拍一次（只在这里）；快照失败记录日志但不阻止
    /// 视频启动。采集进程无法启动时会话保持不存在。
    pub async fn start_session(&mut self, at: DateTime<Utc>) -> Result<String> {
        if let Some(active) = &self.active {
            return Err(RecordError::AlreadyActive(active.session.device.clone()));
        }

        let paths = self.layout.allocate(at).await.map_err(|e| {
            RecordError::SessionStart(format!("Failed to allocate output paths: {}", e))
        })?;

        let snapshot_path = self.take_snapshot(&paths.snapshot).await;

        let process = self
            .launcher
            .launch(&self.stream_url, &paths.clip)
            .await
            .map_err(|e| RecordError::SessionStart(e.to_string()))?;

        let session = RecordingSession {
            id: paths.stem.clone(),
            device: self.device.clone(),
            started_at: at,
            snapshot_path,
            clip_path: paths.clip.clone(),
            status: SessionStatus::Running,
        };

        info!(
            device = %self.device,
            session = %session.id,
            clip = %paths.clip.display(),
            "Recording session started"
        );

        let id = session.id.clone();
        self.active = Some(ActiveSession { session, process });
        Ok(id)
    }

    /// 延长会话
    ///
    /// 采集进程持续运行，无需任何文件或进程操作；
    /// 截止时间由检测状态机持有，这里仅记账。
    pub fn extend_session(&mut self, deadline: DateTime<Utc>) {
        match &self.active {
            Some(active) => {
                debug!(
                    device = %self.device,
                    session = %active.session.id,
                    deadline = %deadline,
                    "Recording session extended"
                );
            }
            None => {
                warn!(device = %self.device, "Extend requested with no active session");
            }
        }
    }

    /// 结束会话，幂等
    ///
    /// 优雅终止采集进程使输出文件收尾；宽限期内未退出则
    /// 强制杀死。无活动会话时为空操作。
    pub async fn stop_session(&mut self) -> Result<Option<PathBuf>> {
        let mut active = match self.active.take() {
            Some(active) => active,
            None => {
                debug!(device = %self.device, "Stop requested with no active session");
                return Ok(None);
            }
        };

        active.session.status = SessionStatus::Stopping;

        if let Err(e) = active.process.stop(self.grace).await {
            error!(
                device = %self.device,
                session = %active.session.id,
                error = %e,
                "Capture process stop failed"
            );
        }

        active.session.status = SessionStatus::Stopped;
        self.finalize_clip(&active.session).await
    }

    /// 检查采集进程是否意外退出
    ///
    /// 进程在会话期间死亡视为不完整视频：记录日志、会话
    /// 强制置为结束，下一次阳性检测开启全新会话。
    pub fn check_process(&mut self) -> bool {
        let faulted = match self.active.as_mut() {
            Some(active) => match active.process.try_status() {
                Ok(Some(code)) => {
                    error!(
                        device = %self.device,
                        session = %active.session.id,
                        exit_code = code,
                        clip = %active.session.clip_path.display(),
                        "Capture process exited unexpectedly, clip is incomplete"
                    );
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    error!(device = %self.device, error = %e, "Capture process status check failed");
                    true
                }
            },
            None => false,
        };

        if faulted {
            if let Some(mut active) = self.active.take() {
                active.session.status = SessionStatus::Stopped;
            }
        }

        faulted
    }

    async fn take_snapshot(&self, path: &PathBuf) -> Option<PathBuf> {
        match self.snapshots.fetch().await {
            Ok(data) => {
                if let Err(e) = tokio::fs::write(path, &data).await {
                    warn!(
                        device = %self.device,
                        error = %e,
                        "Snapshot write failed"
                    );
                    return None;
                }

                info!(
                    device = %self.device,
                    path = %path.display(),
                    size_kb = format!("{:.2}", data.len() as f64 / 1024.0),
                    "Snapshot saved"
                );
                Some(path.clone())
            }
            Err(e) => {
                warn!(
                    device = %self.device,
                    error = %e,
                    "Snapshot fetch failed, recording continues without it"
                );
                None
            }
        }
    }

    /// 检查输出文件收尾结果
    ///
    /// 空文件直接删除并告警；正常文件记录大小与时长。
    async fn finalize_clip(&self, session: &RecordingSession) -> Result<Option<PathBuf>> {
        let metadata = match tokio::fs::metadata(&session.clip_path).await {
            Ok(m) => m,
            Err(_) => {
                warn!(
                    device = %self.device,
                    session = %session.id,
                    clip = %session.clip_path.display(),
                    "Clip file was never created"
                );
                return Ok(None);
            }
        };

        if metadata.len() == 0 {
            warn!(
                device = %self.device,
                session = %session.id,
                "Clip file is empty, removing"
            );
            tokio::fs::remove_file(&session.clip_path).await?;
            return Ok(None);
        }

        let duration = (Utc::now() - session.started_at).num_seconds();
        info!(
            device = %self.device,
            session = %session.id,
            clip = %session.clip_path.display(),
            size_mb = format!("{:.2}", metadata.len() as f64 / 1024.0 / 1024.0),
            duration_secs = duration,
            "Recording session stopped, clip finalized"
        );

        Ok(Some(session.clip_path.clone()))
    }
}
