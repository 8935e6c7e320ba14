use crate::event::DetectionEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 事件源接口
///
/// 订阅客户端实现此接口向流水线提供归一化检测事件；
/// 测试中用脚本化的模拟实现替换。
#[async_trait]
pub trait EventSource: Send {
    /// 等待下一个检测事件
    ///
    /// - `Ok(Some(event))`: 收到一条有效的人形检测通知
    /// - `Ok(None)`: 在 `timeout` 内无事件（调用方借此执行截止时间检查）
    /// - `Err(_)`: 事件源已关闭或被判定为不可恢复
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<DetectionEvent>>;

    /// 关闭事件源，幂等
    async fn close(&mut self);
}
