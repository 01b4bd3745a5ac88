//! 机器人句柄
//!
//! [`Robot`] 持有共享上下文、机械臂请求发送端和四个控制循环线程。
//! Drop 时设置关闭标志，并在同一个期限内等待所有线程退出，超时的线程按名字记录后分离。

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use stakebot_hal::{DistanceSensor, Motor, OpticalSensor, Piston, RotationSensor};
use tracing::{debug, error, info, warn};

use crate::DriverError;
use crate::arm::ArmCommander;
use crate::config::DriverConfig;
use crate::metrics::MetricsSnapshot;
use crate::state::RobotContext;

/// 控制循环线程的退出结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Stopped,
    Panicked,
    /// 超过关闭期限仍未退出，线程被分离
    Overran,
}

/// 在同一个期限内等待所有控制循环退出
///
/// 所有循环共用一个期限，关闭总耗时不超过 `timeout`。
fn join_loops(
    threads: Vec<(&'static str, JoinHandle<()>)>,
    timeout: Duration,
) -> Vec<(&'static str, LoopExit)> {
    let deadline = Instant::now() + timeout;
    let mut pending = threads;
    let mut exits = Vec::with_capacity(pending.len());

    loop {
        let (finished, running): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(_, handle)| handle.is_finished());
        for (name, handle) in finished {
            let exit = match handle.join() {
                Ok(()) => LoopExit::Stopped,
                Err(_) => LoopExit::Panicked,
            };
            exits.push((name, exit));
        }
        pending = running;
        if pending.is_empty() {
            break;
        }
        if Instant::now() >= deadline {
            exits.extend(pending.into_iter().map(|(name, _)| (name, LoopExit::Overran)));
            break;
        }
        std::thread::sleep(JOIN_POLL);
    }
    exits
}

const JOIN_POLL: Duration = Duration::from_millis(2);

/// 机器人硬件清单
///
/// 底盘电机由外部运动控制库持有，不在此列。
#[derive(Clone)]
pub struct RobotHardware {
    pub arm_motor: Arc<dyn Motor>,
    pub arm_rotation: Arc<dyn RotationSensor>,
    /// 进球通道第一级
    pub intake_primary: Arc<dyn Motor>,
    /// 进球通道第二级
    pub intake_secondary: Arc<dyn Motor>,
    pub optical: Arc<dyn OpticalSensor>,
    pub clamp_piston: Arc<dyn Piston>,
    pub clamp_distance: Arc<dyn DistanceSensor>,
    pub doinker_piston: Arc<dyn Piston>,
    pub hang_piston: Arc<dyn Piston>,
    /// 场地墙距离传感器（技能赛重定位）
    pub reset_distance: Arc<dyn DistanceSensor>,
}

/// 机器人驱动（对外 API）
pub struct Robot {
    ctx: Arc<RobotContext>,
    arm: ArmCommander,
    hardware: RobotHardware,
    config: DriverConfig,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Robot {
    pub(crate) fn new(
        ctx: Arc<RobotContext>,
        arm: ArmCommander,
        hardware: RobotHardware,
        config: DriverConfig,
    ) -> Self {
        Self {
            ctx,
            arm,
            hardware,
            config,
            threads: Vec::new(),
        }
    }

    pub(crate) fn attach_thread(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.threads.push((name, handle));
    }

    /// 共享上下文
    pub fn context(&self) -> &Arc<RobotContext> {
        &self.ctx
    }

    /// 机械臂请求发送端
    pub fn arm(&self) -> &ArmCommander {
        &self.arm
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn hardware(&self) -> &RobotHardware {
        &self.hardware
    }

    /// 控制循环是否仍在运行
    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 拨杆气缸
    pub fn set_doinker(&self, extended: bool) -> Result<(), DriverError> {
        self.hardware.doinker_piston.set_extended(extended)?;
        Ok(())
    }

    pub fn doinker_extended(&self) -> bool {
        self.hardware.doinker_piston.is_extended()
    }

    /// 挂杆气缸
    pub fn set_hang(&self, extended: bool) -> Result<(), DriverError> {
        self.hardware.hang_piston.set_extended(extended)?;
        Ok(())
    }

    pub fn hang_extended(&self) -> bool {
        self.hardware.hang_piston.is_extended()
    }

    /// 场地墙距离（毫米）
    pub fn reset_distance_mm(&self) -> Result<u32, DriverError> {
        Ok(self.hardware.reset_distance.distance_mm()?)
    }

    /// 光学传感器补光灯
    pub fn set_optical_led(&self, percent: u8) -> Result<(), DriverError> {
        self.hardware.optical.set_led_pwm(percent)?;
        Ok(())
    }

    /// 停止所有控制循环并等待线程退出（可重复调用）
    pub fn shutdown(&mut self) {
        self.ctx.request_shutdown();

        let join_timeout = self.config.join_timeout();
        let threads = std::mem::take(&mut self.threads);
        if threads.is_empty() {
            return;
        }
        let mut clean = true;
        for (name, exit) in join_loops(threads, join_timeout) {
            match exit {
                LoopExit::Stopped => debug!("{} loop stopped", name),
                LoopExit::Panicked => {
                    clean = false;
                    error!("{} loop panicked", name);
                },
                LoopExit::Overran => {
                    clean = false;
                    error!("{} loop still running after {:?}, detached", name, join_timeout);
                },
            }
        }
        if clean {
            info!("robot shut down");
        } else {
            warn!("robot shut down with loop failures");
        }
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if !self.threads.is_empty() && self.ctx.autonomous_running() {
            warn!("robot dropped while a routine is running");
        }
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn named(name: &'static str, f: impl FnOnce() + Send + 'static) -> (&'static str, JoinHandle<()>) {
        (name, thread::spawn(f))
    }

    /// 测试所有循环正常退出
    #[test]
    fn test_join_loops_stopped() {
        let threads = vec![
            named("arm", || thread::sleep(Duration::from_millis(10))),
            named("clamp", || {}),
        ];
        let exits = join_loops(threads, Duration::from_secs(1));
        assert_eq!(exits.len(), 2);
        assert!(exits.iter().all(|(_, exit)| *exit == LoopExit::Stopped));
    }

    /// 测试按名字区分 panic 和超时的循环，总耗时受同一期限约束
    #[test]
    fn test_join_loops_reports_failures() {
        let threads = vec![
            named("arm", || {}),
            named("intake", || panic!("intake loop failure")),
            named("stall", || thread::sleep(Duration::from_millis(500))),
            named("clamp", || thread::sleep(Duration::from_millis(500))),
        ];
        let start = Instant::now();
        let mut exits = join_loops(threads, Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(300));

        exits.sort_by_key(|(name, _)| *name);
        assert_eq!(
            exits,
            vec![
                ("arm", LoopExit::Stopped),
                ("clamp", LoopExit::Overran),
                ("intake", LoopExit::Panicked),
                ("stall", LoopExit::Overran),
            ]
        );
    }
}
