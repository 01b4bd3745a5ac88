//! 挂杆触发
//!
//! 操作手按下挂杆键后在独立线程上执行一次性时序，操作手循环不会被阻塞：
//!
//! - 机械臂在一档：先收回到 0°（Hold），等待 550ms，伸出挂杆气缸，
//!   等待 200ms，机械臂抬到 41°（Hold）
//! - 其他情况：伸出挂杆气缸，等待 200ms，机械臂抬到 41°（Hold）
//!
//! 时序进行中再次触发会被忽略。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use stakebot_driver::arm::{HANG_LIFT_PRESET, HANG_TUCK_PRESET};
use stakebot_driver::{ArmCommander, DriverError, Robot, RobotContext};
use stakebot_hal::Piston;
use tracing::{debug, info, warn};

use crate::config::HangConfig;

/// 运行结束时清除 busy 标志
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 挂杆触发器
pub struct HangTrigger {
    ctx: Arc<RobotContext>,
    arm: ArmCommander,
    piston: Arc<dyn Piston>,
    config: HangConfig,
    busy: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl HangTrigger {
    pub fn new(robot: &Robot, config: HangConfig) -> Self {
        Self {
            ctx: robot.context().clone(),
            arm: robot.arm().clone(),
            piston: robot.hardware().hang_piston.clone(),
            config,
            busy: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// 时序是否正在执行
    pub fn is_active(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 启动挂杆时序
    ///
    /// 返回 `Ok(false)` 表示已有时序在执行，本次触发被忽略。
    pub fn trigger(&mut self) -> Result<bool, DriverError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("hang sequence already running, press ignored");
            return Ok(false);
        }

        // 上一次的线程已经结束（busy 为 false），直接回收
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("previous hang worker panicked");
        }

        let guard = BusyGuard(self.busy.clone());
        let ctx = self.ctx.clone();
        let arm = self.arm.clone();
        let piston = self.piston.clone();
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("stakebot-hang".into())
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = run_sequence(&ctx, &arm, piston.as_ref(), &config) {
                    warn!("hang sequence failed: {}", e);
                }
            })
            .map_err(|source| {
                self.busy.store(false, Ordering::Release);
                DriverError::Spawn {
                    name: "hang",
                    source,
                }
            })?;
        self.worker = Some(handle);
        Ok(true)
    }

    /// 等待当前时序结束
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("hang worker panicked");
        }
    }
}

/// 可被关闭打断的等待，返回 false 表示已关闭
fn pause(ctx: &RobotContext, ms: u64) -> bool {
    let duration = Duration::from_millis(ms);
    !ctx.signal.wait_until(|| !ctx.is_running(), duration, duration)
}

fn run_sequence(
    ctx: &RobotContext,
    arm: &ArmCommander,
    piston: &dyn Piston,
    config: &HangConfig,
) -> Result<(), DriverError> {
    let step = arm.status().step;
    info!("hang sequence started (arm step {})", step);

    if step == 1 {
        arm.set_preset(HANG_TUCK_PRESET)?;
        if !pause(ctx, config.tuck_ms) {
            return Err(DriverError::ShutDown);
        }
    }

    piston.set_extended(true)?;
    if !pause(ctx, config.piston_ms) {
        return Err(DriverError::ShutDown);
    }
    arm.set_preset(HANG_LIFT_PRESET)?;
    info!("hang sequence finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use stakebot_driver::RobotBuilder;
    use stakebot_driver::sim::SimRig;
    use stakebot_hal::BrakeMode;

    fn fast_config() -> HangConfig {
        HangConfig {
            tuck_ms: 60,
            piston_ms: 30,
        }
    }

    fn wait_for(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        f()
    }

    #[test]
    fn test_hang_from_rest() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let mut hang = HangTrigger::new(&robot, fast_config());

        assert!(hang.trigger().unwrap());
        assert!(hang.is_active());
        hang.wait();
        assert!(!hang.is_active());
        assert!(rig.hang_piston.is_extended());

        assert!(wait_for(Duration::from_secs(1), || {
            let status = robot.arm().status();
            status.target_deg == 41.0 && status.brake_mode == BrakeMode::Hold
        }));
    }

    /// 测试一档时先收回再挂杆
    #[test]
    fn test_hang_from_step_one_tucks_first() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        robot.arm().cycle_primary().unwrap();
        assert!(wait_for(Duration::from_secs(1), || robot.arm().status().step == 1));

        let mut hang = HangTrigger::new(&robot, HangConfig {
            tuck_ms: 250,
            piston_ms: 30,
        });
        assert!(hang.trigger().unwrap());
        assert!(wait_for(Duration::from_secs(1), || robot.arm().status().target_deg == 0.0));
        // 收回阶段气缸还没有动作
        assert!(!rig.hang_piston.is_extended());
        hang.wait();
        assert!(rig.hang_piston.is_extended());
        assert!(wait_for(Duration::from_secs(1), || robot.arm().status().target_deg == 41.0));
    }

    #[test]
    fn test_presses_ignored_while_active() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let mut hang = HangTrigger::new(&robot, HangConfig {
            tuck_ms: 0,
            piston_ms: 200,
        });
        assert!(hang.trigger().unwrap());
        assert!(!hang.trigger().unwrap());
        hang.wait();
        assert_eq!(rig.hang_piston.transitions(), 1);
        // 结束后可以再次触发
        assert!(hang.trigger().unwrap());
        hang.wait();
    }
}
