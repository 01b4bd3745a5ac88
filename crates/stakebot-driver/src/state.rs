//! 共享状态存储
//!
//! [`RobotContext`] 聚合所有控制循环之间共享的状态。每个字段只有一个写入方：
//!
//! | 字段 | 类型 | 写入方 |
//! |------|------|--------|
//! | 机械臂目标/容差/档位/刹车模式 | 请求通道 | 机械臂循环 |
//! | `clamp_engage`, `clamp_policy` | 意图 | 脚本 / 操作手 |
//! | `clamp_actual` | 观测 | 夹子循环 |
//! | `intake_enabled`, `intake_reversed`, `intake_override` | 意图 | 脚本 / 操作手 |
//! | `ring_hold_active`, `staged`, staged 功率 | 意图 | 脚本 |
//! | `ring_held`, `intake_mode` | 观测 | 颜色仲裁循环 |
//! | `stuck_active` | 观测 | 卡死检测循环 |
//! | `team` | 意图 | 脚本 / 自动程序入口 |
//! | `autonomous_running` | 协调 | 序列执行器 |
//!
//! 观测字段发生变化时会通知 [`StateSignal`]，等待方立即被唤醒，无需忙等。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use stakebot_hal::BrakeMode;
use tracing::debug;

use crate::metrics::LoopMetrics;
use crate::mode::{AtomicEnum, AtomicF64, ClampPolicy, IntakeMode, IntakeOverride, TeamColor};

/// 机械臂状态快照（由机械臂循环每个 tick 发布）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmStatus {
    /// 当前角度（度，已折算）
    pub angle_deg: f64,
    /// 目标角度（度，[0, 360)）
    pub target_deg: f64,
    /// 退出容差（度）
    pub tolerance_deg: f64,
    /// 主预设档位（0..3）
    pub step: u8,
    /// 副预设计数器（0..2）
    pub secondary_index: u8,
    /// 计分姿态是否激活
    pub score_active: bool,
    pub brake_mode: BrakeMode,
    /// 误差是否在容差内
    pub settled: bool,
}

impl Default for ArmStatus {
    fn default() -> Self {
        Self {
            angle_deg: 0.0,
            target_deg: 0.0,
            tolerance_deg: 40.0,
            step: 0,
            secondary_index: 0,
            score_active: false,
            brake_mode: BrakeMode::Coast,
            settled: true,
        }
    }
}

/// 状态变化通知
///
/// 代数计数器 + 条件变量。发布方在改变观测状态后调用 [`StateSignal::notify`]；
/// 等待方在持锁状态下检查谓词，然后在条件变量上等待，不会丢失唤醒。
#[derive(Debug, Default)]
pub struct StateSignal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl StateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通知所有等待方
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// 当前代数（每次通知加一）
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// 阻塞直到谓词为真或超时
    ///
    /// 谓词在持锁状态下求值，只能读取原子状态。除了通知唤醒外，
    /// 每隔 `recheck` 也会重新检查一次谓词（用于不发通知的外部状态，如底盘进度）。
    ///
    /// 返回谓词最终是否为真。
    pub fn wait_until(
        &self,
        mut predicate: impl FnMut() -> bool,
        timeout: Duration,
        recheck: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        loop {
            if predicate() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wake_at = deadline.min(now + recheck);
            let _ = self.condvar.wait_until(&mut generation, wake_at);
        }
    }
}

/// 机器人共享上下文（所有状态的聚合）
#[derive(Debug)]
pub struct RobotContext {
    // === 生命周期 ===
    is_running: AtomicBool,

    // === 意图（脚本 / 操作手写入）===
    clamp_engage: AtomicBool,
    clamp_policy: AtomicEnum<ClampPolicy>,
    intake_enabled: AtomicBool,
    intake_reversed: AtomicBool,
    intake_override: AtomicEnum<IntakeOverride>,
    ring_hold_active: AtomicBool,
    staged: AtomicBool,
    staged_primary_power: AtomicF64,
    staged_secondary_power: AtomicF64,
    team: AtomicEnum<TeamColor>,
    autonomous_running: AtomicBool,

    // === 观测（控制循环写入）===
    clamp_actual: AtomicBool,
    ring_held: AtomicBool,
    stuck_active: AtomicBool,
    intake_mode: AtomicEnum<IntakeMode>,
    /// 机械臂状态快照（ArcSwap，无锁读取）
    arm: ArcSwap<ArmStatus>,

    pub signal: StateSignal,
    pub metrics: LoopMetrics,
}

impl RobotContext {
    /// 创建新的上下文（所有字段为中性值）
    pub fn new() -> Self {
        Self {
            is_running: AtomicBool::new(true),
            clamp_engage: AtomicBool::new(false),
            clamp_policy: AtomicEnum::new(ClampPolicy::Auto),
            intake_enabled: AtomicBool::new(false),
            intake_reversed: AtomicBool::new(false),
            intake_override: AtomicEnum::new(IntakeOverride::None),
            ring_hold_active: AtomicBool::new(false),
            staged: AtomicBool::new(false),
            staged_primary_power: AtomicF64::new(0.0),
            staged_secondary_power: AtomicF64::new(0.0),
            team: AtomicEnum::new(TeamColor::Red),
            autonomous_running: AtomicBool::new(false),
            clamp_actual: AtomicBool::new(false),
            ring_held: AtomicBool::new(false),
            stuck_active: AtomicBool::new(false),
            intake_mode: AtomicEnum::new(IntakeMode::Normal),
            arm: ArcSwap::from_pointee(ArmStatus::default()),
            signal: StateSignal::new(),
            metrics: LoopMetrics::new(),
        }
    }

    // ---------------------------------------------------------------
    // 生命周期
    // ---------------------------------------------------------------

    /// Acquire: If we see false, we must see all cleanup writes from other threads
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 设置关闭标志并唤醒所有等待方
    pub fn request_shutdown(&self) {
        if self.is_running.swap(false, Ordering::AcqRel) {
            debug!("shutdown requested");
        }
        self.signal.notify();
    }

    // ---------------------------------------------------------------
    // 意图
    // ---------------------------------------------------------------

    pub fn set_clamp_engage(&self, engage: bool) {
        self.clamp_engage.store(engage, Ordering::Release);
    }

    pub fn clamp_engage(&self) -> bool {
        self.clamp_engage.load(Ordering::Acquire)
    }

    pub fn set_clamp_policy(&self, policy: ClampPolicy) {
        self.clamp_policy.set(policy, Ordering::Release);
    }

    pub fn clamp_policy(&self) -> ClampPolicy {
        self.clamp_policy.get(Ordering::Acquire)
    }

    pub fn set_intake_enabled(&self, enabled: bool) {
        self.intake_enabled.store(enabled, Ordering::Release);
    }

    pub fn intake_enabled(&self) -> bool {
        self.intake_enabled.load(Ordering::Acquire)
    }

    pub fn set_intake_reversed(&self, reversed: bool) {
        self.intake_reversed.store(reversed, Ordering::Release);
    }

    pub fn intake_reversed(&self) -> bool {
        self.intake_reversed.load(Ordering::Acquire)
    }

    pub fn set_intake_override(&self, value: IntakeOverride) {
        self.intake_override.set(value, Ordering::Release);
    }

    pub fn intake_override(&self) -> IntakeOverride {
        self.intake_override.get(Ordering::Acquire)
    }

    pub fn set_ring_hold_active(&self, active: bool) {
        self.ring_hold_active.store(active, Ordering::Release);
    }

    pub fn ring_hold_active(&self) -> bool {
        self.ring_hold_active.load(Ordering::Acquire)
    }

    pub fn set_staged(&self, staged: bool) {
        self.staged.store(staged, Ordering::Release);
    }

    pub fn staged(&self) -> bool {
        self.staged.load(Ordering::Acquire)
    }

    /// 设置脚本接管模式下两级电机的功率
    pub fn set_staged_power(&self, primary: f64, secondary: f64) {
        self.staged_primary_power.store(primary, Ordering::Release);
        self.staged_secondary_power.store(secondary, Ordering::Release);
    }

    /// (primary, secondary)
    pub fn staged_power(&self) -> (f64, f64) {
        (
            self.staged_primary_power.load(Ordering::Acquire),
            self.staged_secondary_power.load(Ordering::Acquire),
        )
    }

    pub fn set_team(&self, team: TeamColor) {
        self.team.set(team, Ordering::Release);
    }

    pub fn team(&self) -> TeamColor {
        self.team.get(Ordering::Acquire)
    }

    pub fn set_autonomous_running(&self, running: bool) {
        self.autonomous_running.store(running, Ordering::Release);
        self.signal.notify();
    }

    pub fn autonomous_running(&self) -> bool {
        self.autonomous_running.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------
    // 观测（只由对应的控制循环发布）
    // ---------------------------------------------------------------

    pub fn clamp_actual(&self) -> bool {
        self.clamp_actual.load(Ordering::Acquire)
    }

    pub fn ring_held(&self) -> bool {
        self.ring_held.load(Ordering::Acquire)
    }

    pub fn stuck_active(&self) -> bool {
        self.stuck_active.load(Ordering::Acquire)
    }

    pub fn intake_mode(&self) -> IntakeMode {
        self.intake_mode.get(Ordering::Acquire)
    }

    /// 机械臂状态快照
    pub fn arm_status(&self) -> ArmStatus {
        **self.arm.load()
    }

    /// 发布夹子实际状态；返回是否发生变化
    pub fn publish_clamp_actual(&self, value: bool) -> bool {
        self.publish_flag(&self.clamp_actual, value, "clamp_actual")
    }

    pub fn publish_ring_held(&self, value: bool) -> bool {
        self.publish_flag(&self.ring_held, value, "ring_held")
    }

    pub fn publish_stuck(&self, value: bool) -> bool {
        self.publish_flag(&self.stuck_active, value, "stuck_active")
    }

    pub fn publish_intake_mode(&self, mode: IntakeMode) -> bool {
        let prev = self.intake_mode.swap(mode, Ordering::AcqRel);
        if prev != mode {
            debug!("intake mode {:?} -> {:?}", prev, mode);
            self.signal.notify();
            true
        } else {
            false
        }
    }

    /// 发布机械臂状态；到位状态变化时通知等待方
    pub fn publish_arm(&self, status: ArmStatus) {
        let prev = self.arm.swap(std::sync::Arc::new(status));
        if prev.settled != status.settled || prev.target_deg != status.target_deg {
            self.signal.notify();
        }
    }

    fn publish_flag(&self, cell: &AtomicBool, value: bool, name: &str) -> bool {
        let prev = cell.swap(value, Ordering::AcqRel);
        if prev != value {
            debug!("{} -> {}", name, value);
            self.signal.notify();
            true
        } else {
            false
        }
    }
}

impl Default for RobotContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_context_starts_neutral() {
        let ctx = RobotContext::new();
        assert!(ctx.is_running());
        assert!(!ctx.clamp_engage());
        assert!(!ctx.clamp_actual());
        assert!(!ctx.intake_enabled());
        assert_eq!(ctx.intake_override(), IntakeOverride::None);
        assert_eq!(ctx.intake_mode(), IntakeMode::Normal);
        assert_eq!(ctx.staged_power(), (0.0, 0.0));
        assert_eq!(ctx.arm_status().step, 0);
    }

    #[test]
    fn test_publish_notifies_only_on_change() {
        let ctx = RobotContext::new();
        let before = ctx.signal.generation();
        assert!(ctx.publish_clamp_actual(true));
        assert!(!ctx.publish_clamp_actual(true));
        assert_eq!(ctx.signal.generation(), before + 1);
    }

    #[test]
    fn test_wait_until_times_out() {
        let signal = StateSignal::new();
        let start = Instant::now();
        let ok = signal.wait_until(|| false, Duration::from_millis(30), Duration::from_millis(5));
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    /// 测试通知能及时唤醒等待方
    #[test]
    fn test_wait_until_wakes_on_notify() {
        let ctx = Arc::new(RobotContext::new());
        let publisher = {
            let ctx = ctx.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ctx.publish_ring_held(true);
            })
        };

        let start = Instant::now();
        let ok = ctx.signal.wait_until(
            || ctx.ring_held(),
            Duration::from_secs(2),
            Duration::from_secs(1),
        );
        assert!(ok);
        // 通知唤醒，远早于 recheck 周期
        assert!(start.elapsed() < Duration::from_millis(900));
        publisher.join().unwrap();
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let ctx = Arc::new(RobotContext::new());
        let waiter = {
            let ctx = ctx.clone();
            thread::spawn(move || {
                ctx.signal.wait_until(
                    || !ctx.is_running(),
                    Duration::from_secs(2),
                    Duration::from_secs(1),
                )
            })
        };
        thread::sleep(Duration::from_millis(10));
        ctx.request_shutdown();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_arm_status_snapshot() {
        let ctx = RobotContext::new();
        ctx.publish_arm(ArmStatus {
            target_deg: 220.0,
            settled: false,
            ..ArmStatus::default()
        });
        let status = ctx.arm_status();
        assert_eq!(status.target_deg, 220.0);
        assert!(!status.settled);
    }
}
