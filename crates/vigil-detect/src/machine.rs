use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use vigil_core::DetectionEvent;

/// 检测阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPhase {
    /// 无进行中的录像
    Idle,

    /// 录像进行中（含检测后的尾部窗口）
    Active {
        /// 会话截止时间 = 最近一次阳性检测时间 + 检测后时长
        deadline: DateTime<Utc>,
    },
}

/// 会话命令
///
/// 状态机的唯一输出，由流水线同步地交给录像会话管理器执行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// 开启新会话（IDLE -> ACTIVE，伴随一次快照）
    Start { at: DateTime<Utc> },

    /// 延长会话（ACTIVE -> ACTIVE，只更新截止时间）
    Extend { deadline: DateTime<Utc> },

    /// 结束会话（截止时间到达，ACTIVE -> IDLE）
    Stop,
}

/// 每设备检测状态机
///
/// 把原始检测事件流转换为离散的会话命令。无终止状态，
/// 与所属设备的流水线同生命周期。时间完全由调用方注入，
/// 截止时间检查依赖调用方的周期节拍（`on_tick`）。
pub struct DetectionMachine {
    device: String,
    post_detection: Duration,
    phase: DetectionPhase,
}

impl DetectionMachine {
    pub fn new(device: impl Into<String>, post_detection: std::time::Duration) -> Self {
        Self {
            device: device.into(),
            post_detection: Duration::from_std(post_detection)
                .unwrap_or_else(|_| Duration::seconds(15)),
            phase: DetectionPhase::Idle,
        }
    }

    pub fn phase(&self) -> DetectionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, DetectionPhase::Active { .. })
    }

    /// 处理一条检测事件
    ///
    /// 阳性事件在 IDLE 时开启会话，在 ACTIVE 时延长会话；
    /// 阴性事件不缩短窗口（通知节奏因固件而异，重复或稀疏
    /// 的阳性通知都只是延长机会）。
    pub fn on_event(&mut self, event: &DetectionEvent, now: DateTime<Utc>) -> Option<SessionCommand> {
        match (self.phase, event.is_present) {
            (DetectionPhase::Idle, true) => {
                let deadline = now + self.post_detection;
                self.phase = DetectionPhase::Active { deadline };

                info!(
                    device = %self.device,
                    deadline = %deadline,
                    "Person detected, starting session"
                );
                Some(SessionCommand::Start { at: now })
            }
            (DetectionPhase::Active { deadline }, true) => {
                // 截止时间只向前移动
                let extended = deadline.max(now + self.post_detection);
                self.phase = DetectionPhase::Active { deadline: extended };

                debug!(
                    device = %self.device,
                    deadline = %extended,
                    "Person still present, extending session"
                );
                Some(SessionCommand::Extend { deadline: extended })
            }
            (DetectionPhase::Active { .. }, false) => {
                debug!(device = %self.device, "Person no longer present, tail window continues");
                None
            }
            (DetectionPhase::Idle, false) => None,
        }
    }

    /// 截止时间检查
    ///
    /// 必须周期性调用，即使没有任何事件到达，否则最后一次
    /// 检测之后会话将永远不会结束。
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Option<SessionCommand> {
        if let DetectionPhase::Active { deadline } = self.phase {
            if now >= deadline {
                self.phase = DetectionPhase::Idle;

                info!(device = %self.device, "Post-detection window elapsed, stopping session");
                return Some(SessionCommand::Stop);
            }
        }
        None
    }

    /// 回退到 IDLE
    ///
    /// 会话开启失败时调用，使下一次阳性检测重新尝试。
    pub fn reset(&mut self) {
        debug!(device = %self.device, "Detection machine reset to idle");
        self.phase = DetectionPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn present(at: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent::new("cam", at, true)
    }

    fn absent(at: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent::new("cam", at, false)
    }

    fn machine() -> DetectionMachine {
        DetectionMachine::new("cam", StdDuration::from_secs(15))
    }

    #[test]
    fn test_idle_positive_starts_session() {
        let mut m = machine();

        let cmd = m.on_event(&present(t(0)), t(0));
        assert_eq!(cmd, Some(SessionCommand::Start { at: t(0) }));
        assert_eq!(m.phase(), DetectionPhase::Active { deadline: t(15) });
    }

    #[test]
    fn test_idle_negative_is_noop() {
        let mut m = machine();

        assert_eq!(m.on_event(&absent(t(0)), t(0)), None);
        assert_eq!(m.phase(), DetectionPhase::Idle);
    }

    #[test]
    fn test_active_positive_extends_deadline() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));

        let cmd = m.on_event(&present(t(5)), t(5));
        assert_eq!(cmd, Some(SessionCommand::Extend { deadline: t(20) }));
    }

    #[test]
    fn test_active_negative_keeps_deadline() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));

        assert_eq!(m.on_event(&absent(t(3)), t(3)), None);
        assert_eq!(m.phase(), DetectionPhase::Active { deadline: t(15) });
    }

    #[test]
    fn test_deadline_never_moves_backward() {
        let mut m = DetectionMachine::new("cam", StdDuration::from_secs(15));
        m.on_event(&present(t(0)), t(0));
        m.on_event(&present(t(10)), t(10)); // deadline -> t(25)

        // 同一时刻的重复通知不回退截止时间
        let cmd = m.on_event(&present(t(10)), t(10));
        assert_eq!(cmd, Some(SessionCommand::Extend { deadline: t(25) }));
    }

    #[test]
    fn test_tick_before_deadline_is_noop() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));

        assert_eq!(m.on_tick(t(14)), None);
        assert!(m.is_active());
    }

    #[test]
    fn test_tick_at_deadline_stops() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));

        assert_eq!(m.on_tick(t(15)), Some(SessionCommand::Stop));
        assert_eq!(m.phase(), DetectionPhase::Idle);
    }

    #[test]
    fn test_tick_when_idle_is_noop() {
        let mut m = machine();
        assert_eq!(m.on_tick(t(100)), None);
    }

    #[test]
    fn test_scenario_a_extension_timeline() {
        // 事件：t=0 阳性、t=5 阳性，post_detection=15
        // 期望：t=0 开启、截止延至 t=20、t=20 结束
        let mut m = machine();

        assert!(matches!(
            m.on_event(&present(t(0)), t(0)),
            Some(SessionCommand::Start { .. })
        ));
        assert_eq!(
            m.on_event(&present(t(5)), t(5)),
            Some(SessionCommand::Extend { deadline: t(20) })
        );

        assert_eq!(m.on_tick(t(19)), None);
        assert_eq!(m.on_tick(t(20)), Some(SessionCommand::Stop));
    }

    #[test]
    fn test_duplicate_positive_notifications_are_harmless() {
        // 固件可能周期性重发“仍然有人”，每次都只是延长
        let mut m = machine();

        let mut starts = 0;
        for secs in [0, 1, 2, 3, 4] {
            if let Some(SessionCommand::Start { .. }) = m.on_event(&present(t(secs)), t(secs)) {
                starts += 1;
            }
        }

        // 快照次数 = IDLE->ACTIVE 转换次数，而非阳性事件数
        assert_eq!(starts, 1);
        assert_eq!(m.phase(), DetectionPhase::Active { deadline: t(19) });
    }

    #[test]
    fn test_reset_allows_retry() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));

        m.reset();
        assert_eq!(m.phase(), DetectionPhase::Idle);

        // 下一次阳性检测重新开启
        assert!(matches!(
            m.on_event(&present(t(1)), t(1)),
            Some(SessionCommand::Start { .. })
        ));
    }

    #[test]
    fn test_new_session_after_stop() {
        let mut m = machine();
        m.on_event(&present(t(0)), t(0));
        assert_eq!(m.on_tick(t(15)), Some(SessionCommand::Stop));

        // 刚结束后立刻再次检测到人，必须开启全新会话
        assert_eq!(
            m.on_event(&present(t(15)), t(15)),
            Some(SessionCommand::Start { at: t(15) })
        );
    }
}
