use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

/// 快照抓取接口
///
/// 一次同步请求返回图像数据；失败对录像不致命。
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// HTTP 快照抓取器
///
/// 单次 GET 请求，无重试；重试与否由下一次检测决定。
pub struct HttpSnapshotFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotFetcher {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, url }
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self) -> Result<Vec<u8>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(anyhow!("Snapshot request failed: {}", status));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow!("Snapshot response was empty"));
        }

        Ok(bytes.to_vec())
    }
}
