//! 控制循环指标
//!
//! 零开销的原子计数器，用于监控各控制循环的运行情况。
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 控制循环实时指标
///
/// # 使用示例
///
/// ```rust
/// use stakebot_driver::LoopMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LoopMetrics::default();
/// metrics.clamp_engagements.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.clamp_engagements, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 机械臂循环 tick 数
    pub arm_ticks: AtomicU64,
    /// 卡死检测循环 tick 数
    pub stall_ticks: AtomicU64,
    /// 颜色仲裁循环 tick 数
    pub intake_ticks: AtomicU64,
    /// 夹子循环 tick 数
    pub clamp_ticks: AtomicU64,

    /// 已应用的机械臂请求数
    pub arm_requests: AtomicU64,
    /// 检测到卡死的次数（每次触发一个解卡脉冲）
    pub stall_detections: AtomicU64,
    /// 异色环剔除次数
    pub reject_pulses: AtomicU64,
    /// 持环锁存次数
    pub ring_holds: AtomicU64,
    pub clamp_engagements: AtomicU64,
    pub clamp_releases: AtomicU64,

    /// 传感器/电机读写失败次数
    pub device_errors: AtomicU64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            arm_ticks: self.arm_ticks.load(Ordering::Relaxed),
            stall_ticks: self.stall_ticks.load(Ordering::Relaxed),
            intake_ticks: self.intake_ticks.load(Ordering::Relaxed),
            clamp_ticks: self.clamp_ticks.load(Ordering::Relaxed),
            arm_requests: self.arm_requests.load(Ordering::Relaxed),
            stall_detections: self.stall_detections.load(Ordering::Relaxed),
            reject_pulses: self.reject_pulses.load(Ordering::Relaxed),
            ring_holds: self.ring_holds.load(Ordering::Relaxed),
            clamp_engagements: self.clamp_engagements.load(Ordering::Relaxed),
            clamp_releases: self.clamp_releases.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.arm_ticks,
            &self.stall_ticks,
            &self.intake_ticks,
            &self.clamp_ticks,
            &self.arm_requests,
            &self.stall_detections,
            &self.reject_pulses,
            &self.ring_holds,
            &self.clamp_engagements,
            &self.clamp_releases,
            &self.device_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub arm_ticks: u64,
    pub stall_ticks: u64,
    pub intake_ticks: u64,
    pub clamp_ticks: u64,
    pub arm_requests: u64,
    pub stall_detections: u64,
    pub reject_pulses: u64,
    pub ring_holds: u64,
    pub clamp_engagements: u64,
    pub clamp_releases: u64,
    pub device_errors: u64,
}

impl MetricsSnapshot {
    /// 所有循环的 tick 总数
    pub fn total_ticks(&self) -> u64 {
        self.arm_ticks + self.stall_ticks + self.intake_ticks + self.clamp_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = LoopMetrics::new();
        metrics.arm_ticks.fetch_add(10, Ordering::Relaxed);
        metrics.clamp_ticks.fetch_add(5, Ordering::Relaxed);
        metrics.reject_pulses.fetch_add(2, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.arm_ticks, 10);
        assert_eq!(snapshot.reject_pulses, 2);
        assert_eq!(snapshot.total_ticks(), 15);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = LoopMetrics::new();
        metrics.ring_holds.fetch_add(3, Ordering::Relaxed);
        metrics.device_errors.fetch_add(1, Ordering::Relaxed);
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
