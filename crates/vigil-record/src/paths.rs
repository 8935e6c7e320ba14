use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// 一次会话的输出工件路径
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    /// 可排序的时间戳主干，快照与视频共用
    pub stem: String,
    pub snapshot: PathBuf,
    pub clip: PathBuf,
}

/// 每设备输出布局
///
/// `<root>/<device>/snapshots/<stem>.jpg` 与
/// `<root>/<device>/clips/<stem>.mp4`。主干编码毫秒时间戳，
/// 同一时间戳重复分配时追加序号消除冲突。
pub struct OutputLayout {
    root: PathBuf,
    device: String,
    channel: u32,
    last_stem: Option<String>,
    seq: u32,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, device: impl Into<String>, channel: u32) -> Self {
        Self {
            root: root.into(),
            device: device.into(),
            channel,
            last_stem: None,
            seq: 0,
        }
    }

    pub fn device_dir(&self) -> PathBuf {
        self.root.join(&self.device)
    }

    /// 分配一组新的工件路径并确保目录存在
    pub async fn allocate(&mut self, at: DateTime<Utc>) -> std::io::Result<ArtifactPaths> {
        let base = format!("{}_ch{}", at.format("%Y%m%d_%H%M%S_%3f"), self.channel);

        let stem = if self.last_stem.as_deref() == Some(base.as_str()) {
            self.seq += 1;
            format!("{}-{}", base, self.seq)
        } else {
            self.last_stem = Some(base.clone());
            self.seq = 0;
            base
        };

        let snapshot_dir = self.device_dir().join("snapshots");
        let clip_dir = self.device_dir().join("clips");
        tokio::fs::create_dir_all(&snapshot_dir).await?;
        tokio::fs::create_dir_all(&clip_dir).await?;

        Ok(ArtifactPaths {
            snapshot: snapshot_dir.join(format!("{}.jpg", stem)),
            clip: clip_dir.join(format!("{}.mp4", stem)),
            stem,
        })
    }
}
