//! 自动程序执行器
//!
//! 逐条解释 [`Step`]。等待步骤（包括等待底盘运动）阻塞在 [`StateSignal`](stakebot_driver::StateSignal) 上，
//! 由控制循环发布观测状态或请求关闭时唤醒；底盘进度不发通知，按 `poll_fallback_ms` 轮询。
//! 关闭标志在每一步前后和每次等待中检查。
//!
//! 运动步骤按顺序排队：如果上一条运动仍在进行，新运动先等它结束再下发，
//! 需要提前切换时在中间显式插入 `CancelMotion`。

use std::sync::Arc;
use std::time::{Duration, Instant};

use stakebot_driver::arm::normalize_target;
use stakebot_driver::{
    ArmCommander, ArmRequest, ArmTarget, DriverError, Robot, RobotContext, RobotHardware,
};
use tracing::{debug, info, warn};

use super::Routine;
use super::step::{Condition, OnTimeout, Step};
use crate::config::SequenceConfig;
use crate::error::SequenceError;
use crate::motion::{MotionController, Pose};

const CHASSIS_WAIT_SLICE: Duration = Duration::from_secs(1);

/// 执行报告
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub routine: String,
    pub steps_executed: usize,
    pub total_steps: usize,
    pub elapsed: Duration,
    /// 超时后继续执行的等待（步骤下标, 条件）
    pub wait_timeouts: Vec<(usize, Condition)>,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.steps_executed == self.total_steps
    }
}

/// 运行期间保持 `autonomous_running` 为真
struct AutonomousGuard<'a> {
    ctx: &'a RobotContext,
}

impl<'a> AutonomousGuard<'a> {
    fn new(ctx: &'a RobotContext) -> Self {
        ctx.set_autonomous_running(true);
        Self { ctx }
    }
}

impl Drop for AutonomousGuard<'_> {
    fn drop(&mut self) {
        self.ctx.set_autonomous_running(false);
    }
}

#[derive(Default)]
struct RunState {
    /// 最近一次 `SetArm` 的目标（已折算到 [0, 360)）
    arm_target: Option<f64>,
    wait_timeouts: Vec<(usize, Condition)>,
}

/// 自动程序执行器
pub struct Sequencer {
    ctx: Arc<RobotContext>,
    arm: ArmCommander,
    hardware: RobotHardware,
    chassis: Arc<dyn MotionController>,
    config: SequenceConfig,
}

impl Sequencer {
    pub fn new(robot: &Robot, chassis: Arc<dyn MotionController>, config: SequenceConfig) -> Self {
        Self {
            ctx: robot.context().clone(),
            arm: robot.arm().clone(),
            hardware: robot.hardware().clone(),
            chassis,
            config,
        }
    }

    pub fn chassis(&self) -> &Arc<dyn MotionController> {
        &self.chassis
    }

    /// 执行整个程序
    ///
    /// 出错或中止时取消底盘运动并停车，`autonomous_running` 总会被清除。
    pub fn run(&self, routine: &Routine) -> Result<RunReport, SequenceError> {
        routine
            .validate()
            .map_err(|(step, reason)| SequenceError::InvalidStep { step, reason })?;

        let _guard = AutonomousGuard::new(&self.ctx);
        let start = Instant::now();
        let mut state = RunState::default();
        info!("routine '{}' started ({} steps)", routine.name, routine.steps.len());

        for (index, step) in routine.steps.iter().enumerate() {
            let result = if self.ctx.is_running() {
                self.execute(index, step, &mut state).and_then(|()| {
                    if self.ctx.is_running() {
                        Ok(())
                    } else {
                        Err(SequenceError::Aborted { step: index })
                    }
                })
            } else {
                Err(SequenceError::Aborted { step: index })
            };
            if let Err(e) = result {
                warn!("routine '{}' stopped at step {}: {}", routine.name, index, e);
                self.chassis.cancel_motion();
                self.chassis.tank(0.0, 0.0);
                return Err(e);
            }
        }

        let report = RunReport {
            routine: routine.name.clone(),
            steps_executed: routine.steps.len(),
            total_steps: routine.steps.len(),
            elapsed: start.elapsed(),
            wait_timeouts: state.wait_timeouts,
        };
        info!(
            "routine '{}' finished in {:?} ({} wait timeouts)",
            report.routine,
            report.elapsed,
            report.wait_timeouts.len()
        );
        Ok(report)
    }

    fn execute(&self, index: usize, step: &Step, state: &mut RunState) -> Result<(), SequenceError> {
        debug!("step {}: {:?}", index, step);

        if step.is_motion() {
            self.wait_motion_done(index)?;
        }

        let ctx = &self.ctx;
        match step {
            Step::SetPose { x, y, theta } => self.chassis.set_pose(Pose::new(*x, *y, *theta)),
            Step::MoveToPoint {
                x,
                y,
                timeout_ms,
                options,
            } => self.chassis.move_to_point(*x, *y, *timeout_ms, *options),
            Step::MoveToPose {
                x,
                y,
                theta,
                timeout_ms,
                options,
            } => self.chassis.move_to_pose(*x, *y, *theta, *timeout_ms, *options),
            Step::TurnToHeading {
                theta,
                timeout_ms,
                options,
            } => self.chassis.turn_to_heading(*theta, *timeout_ms, *options),
            Step::TurnToPoint {
                x,
                y,
                timeout_ms,
                options,
            } => self.chassis.turn_to_point(*x, *y, *timeout_ms, *options),
            Step::SwingToHeading {
                theta,
                side,
                timeout_ms,
                options,
            } => self.chassis.swing_to_heading(*theta, *side, *timeout_ms, *options),
            Step::SwingToPoint {
                x,
                y,
                side,
                timeout_ms,
                options,
            } => self.chassis.swing_to_point(*x, *y, *side, *timeout_ms, *options),
            Step::WaitUntil { progress } => self.wait_chassis(index, || {
                self.chassis
                    .motion_progress()
                    .is_none_or(|travelled| travelled + 1e-9 >= *progress)
            })?,
            Step::WaitUntilDone => self.wait_motion_done(index)?,
            Step::CancelMotion => self.chassis.cancel_motion(),

            Step::SetTeam { team } => ctx.set_team(*team),
            Step::SetClamp { engage } => ctx.set_clamp_engage(*engage),
            Step::SetIntake { enabled } => ctx.set_intake_enabled(*enabled),
            Step::SetRingHold { active } => ctx.set_ring_hold_active(*active),
            Step::SetStaged { active } => ctx.set_staged(*active),
            Step::SetIntakeRaw { primary, secondary } => ctx.set_staged_power(*primary, *secondary),
            Step::SetDoinker { extended } => self
                .hardware
                .doinker_piston
                .set_extended(*extended)
                .map_err(DriverError::from)?,
            Step::SetHang { extended } => self
                .hardware
                .hang_piston
                .set_extended(*extended)
                .map_err(DriverError::from)?,
            Step::SetArm {
                target_deg,
                tolerance_deg,
                brake,
                step,
            } => {
                self.arm.send(ArmRequest::Set(ArmTarget {
                    target_deg: *target_deg,
                    tolerance_deg: *tolerance_deg,
                    brake: *brake,
                    step: *step,
                }))?;
                state.arm_target = Some(normalize_target(*target_deg));
            },

            Step::WaitFor {
                condition,
                timeout_ms,
                on_timeout,
            } => {
                let timeout = Duration::from_millis(
                    timeout_ms.unwrap_or(self.config.default_wait_timeout_ms),
                );
                self.wait_for(index, *condition, timeout, *on_timeout, state)?;
            },
            Step::Delay { ms } => self.sleep(index, Duration::from_millis(*ms))?,
            Step::DrivePulse { left, right, ms } => {
                self.chassis.tank(*left, *right);
                let result = self.sleep(index, Duration::from_millis(*ms));
                self.chassis.tank(0.0, 0.0);
                result?;
            },
            Step::DrivePower { left, right } => self.chassis.tank(*left, *right),
            Step::SetPoseFromDistance { divisor } => {
                let mm = self
                    .hardware
                    .reset_distance
                    .distance_mm()
                    .map_err(DriverError::from)?;
                let x = f64::from(mm) / divisor;
                debug!("pose reset from wall distance {} mm -> x = {:.2}", mm, x);
                self.chassis.set_pose(Pose::new(x, 0.0, 0.0));
            },
        }
        Ok(())
    }

    fn condition_met(&self, condition: Condition, arm_target: Option<f64>) -> bool {
        let ctx = &self.ctx;
        match condition {
            Condition::ClampEngaged => ctx.clamp_actual(),
            Condition::ClampReleased => !ctx.clamp_actual(),
            Condition::RingHeld => ctx.ring_held(),
            Condition::IntakeStalled => ctx.stuck_active(),
            Condition::ArmSettled => {
                let status = ctx.arm_status();
                // 请求尚未被机械臂循环应用时，快照里还是旧目标
                status.settled
                    && arm_target.is_none_or(|target| (status.target_deg - target).abs() < 1e-6)
            },
        }
    }

    fn wait_for(
        &self,
        index: usize,
        condition: Condition,
        timeout: Duration,
        on_timeout: OnTimeout,
        state: &mut RunState,
    ) -> Result<(), SequenceError> {
        let arm_target = state.arm_target;
        let met = self.ctx.signal.wait_until(
            || !self.ctx.is_running() || self.condition_met(condition, arm_target),
            timeout,
            self.config.poll_fallback(),
        );

        if !self.ctx.is_running() {
            return Err(SequenceError::Aborted { step: index });
        }
        if met {
            return Ok(());
        }
        match on_timeout {
            OnTimeout::Abort => Err(SequenceError::WaitTimeout {
                step: index,
                condition,
                timeout,
            }),
            OnTimeout::Continue => {
                warn!(
                    "step {}: {:?} not reached within {:?}, continuing",
                    index, condition, timeout
                );
                state.wait_timeouts.push((index, condition));
                Ok(())
            },
        }
    }

    fn wait_motion_done(&self, index: usize) -> Result<(), SequenceError> {
        self.wait_chassis(index, || !self.chassis.is_in_motion())
    }

    /// 等待底盘状态，可被关闭打断
    ///
    /// 运动自身有超时，这里不再设上限。
    fn wait_chassis(
        &self,
        index: usize,
        mut reached: impl FnMut() -> bool,
    ) -> Result<(), SequenceError> {
        loop {
            let done = self.ctx.signal.wait_until(
                || !self.ctx.is_running() || reached(),
                CHASSIS_WAIT_SLICE,
                self.config.poll_fallback(),
            );
            if !self.ctx.is_running() {
                return Err(SequenceError::Aborted { step: index });
            }
            if done {
                return Ok(());
            }
        }
    }

    /// 可被关闭打断的延时
    fn sleep(&self, index: usize, duration: Duration) -> Result<(), SequenceError> {
        let interrupted = self
            .ctx
            .signal
            .wait_until(|| !self.ctx.is_running(), duration, duration);
        if interrupted {
            Err(SequenceError::Aborted { step: index })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MoveOptions;
    use crate::sequence::RoutineBuilder;
    use crate::sim_chassis::{MotionRecord, SimChassis, SimChassisConfig};
    use stakebot_driver::sim::SimRig;
    use stakebot_driver::{RobotBuilder, TeamColor};
    use stakebot_hal::{BrakeMode, Piston};

    fn setup() -> (SimRig, Robot, Arc<SimChassis>, Sequencer) {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let chassis = Arc::new(SimChassis::with_config(SimChassisConfig {
            linear_speed_ips: 2000.0,
            turn_speed_dps: 20_000.0,
        }));
        let sequencer = Sequencer::new(
            &robot,
            chassis.clone(),
            SequenceConfig {
                default_wait_timeout_ms: 300,
                poll_fallback_ms: 20,
            },
        );
        (rig, robot, chassis, sequencer)
    }

    #[test]
    fn test_intents_applied() {
        let (rig, robot, _chassis, seq) = setup();
        let routine = RoutineBuilder::new("intents")
            .team(TeamColor::Blue)
            .intake(true)
            .ring_hold(true)
            .staged(true)
            .intake_raw(0.0, 0.5)
            .doinker(true)
            .hang(true)
            .build();
        let report = seq.run(&routine).unwrap();
        assert!(report.completed());

        let ctx = robot.context();
        assert_eq!(ctx.team(), TeamColor::Blue);
        assert!(ctx.intake_enabled());
        assert!(ctx.ring_hold_active());
        assert!(ctx.staged());
        assert_eq!(ctx.staged_power(), (0.0, 0.5));
        assert!(rig.doinker_piston.is_extended());
        assert!(rig.hang_piston.is_extended());
        assert!(!ctx.autonomous_running());
    }

    /// 测试超时中止：返回步骤下标和条件
    #[test]
    fn test_wait_timeout_aborts() {
        let (_rig, robot, chassis, seq) = setup();
        let routine = RoutineBuilder::new("timeout")
            .move_to_point(0.0, 10.0, 1000, MoveOptions::default())
            .clamp(true)
            .wait_for(Condition::ClampEngaged)
            .intake(true)
            .build();
        let start = Instant::now();
        let err = seq.run(&routine).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(300));
        match err {
            SequenceError::WaitTimeout { step, condition, .. } => {
                assert_eq!(step, 2);
                assert_eq!(condition, Condition::ClampEngaged);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!robot.context().intake_enabled());
        assert!(!robot.context().autonomous_running());
        assert_eq!(chassis.drive_power(), (0.0, 0.0));
    }

    #[test]
    fn test_wait_timeout_continue() {
        let (_rig, robot, _chassis, seq) = setup();
        let routine = RoutineBuilder::new("continue")
            .wait_for_or_continue(Condition::RingHeld, 50)
            .intake(true)
            .build();
        let report = seq.run(&routine).unwrap();
        assert_eq!(report.wait_timeouts, vec![(0, Condition::RingHeld)]);
        assert!(robot.context().intake_enabled());
    }

    /// 测试等待被状态通知唤醒（夹子到位后立即返回）
    #[test]
    fn test_wait_for_clamp() {
        let (rig, robot, _chassis, seq) = setup();
        rig.clamp_distance.set_mm(10);
        let routine = RoutineBuilder::new("clamp")
            .clamp(true)
            .step(Step::WaitFor {
                condition: Condition::ClampEngaged,
                timeout_ms: Some(2000),
                on_timeout: OnTimeout::Abort,
            })
            .build();
        let start = Instant::now();
        seq.run(&routine).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
        assert!(robot.context().clamp_actual());
    }

    /// 测试 ArmSettled 等待的是新目标而不是旧快照
    #[test]
    fn test_arm_settled_waits_for_new_target() {
        let (rig, robot, _chassis, seq) = setup();
        let routine = RoutineBuilder::new("arm")
            .arm_brake(90.0, 2.0, BrakeMode::Hold)
            .step(Step::WaitFor {
                condition: Condition::ArmSettled,
                timeout_ms: Some(150),
                on_timeout: OnTimeout::Continue,
            })
            .build();
        let report = seq.run(&routine).unwrap();
        assert_eq!(report.wait_timeouts, vec![(1, Condition::ArmSettled)]);

        rig.arm_rotation.set_degrees(90.0);
        let routine = RoutineBuilder::new("arm")
            .arm_brake(90.0, 2.0, BrakeMode::Hold)
            .step(Step::WaitFor {
                condition: Condition::ArmSettled,
                timeout_ms: Some(1000),
                on_timeout: OnTimeout::Abort,
            })
            .build();
        seq.run(&routine).unwrap();
        assert_eq!(robot.arm().status().target_deg, 90.0);
    }

    #[test]
    fn test_drive_pulse_stops_afterwards() {
        let (_rig, _robot, chassis, seq) = setup();
        let routine = RoutineBuilder::new("pulse")
            .drive_pulse(-0.5, -0.5, 30)
            .drive_power(0.2, 0.3)
            .build();
        seq.run(&routine).unwrap();
        let tanks: Vec<_> = chassis
            .log()
            .into_iter()
            .filter_map(|r| match r {
                MotionRecord::Tank { left, right } => Some((left, right)),
                _ => None,
            })
            .collect();
        assert_eq!(tanks, vec![(-0.5, -0.5), (0.0, 0.0), (0.2, 0.3)]);
    }

    /// 测试运动步骤排队执行，取消后立刻下发下一条
    #[test]
    fn test_motions_queue_in_order() {
        let (_rig, _robot, chassis, seq) = setup();
        let routine = RoutineBuilder::new("queue")
            .set_pose(0.0, 0.0, 0.0)
            .move_to_point(0.0, 20.0, 1000, MoveOptions::default())
            .move_to_point(10.0, 20.0, 1000, MoveOptions::default())
            .wait_done()
            .build();
        seq.run(&routine).unwrap();
        let pose = chassis.pose();
        assert!((pose.x - 10.0).abs() < 1e-6);
        assert!((pose.y - 20.0).abs() < 1e-6);
        assert_eq!(chassis.motion_count(), 2);
    }

    #[test]
    fn test_pose_from_distance() {
        let (rig, _robot, chassis, seq) = setup();
        rig.reset_distance.set_mm(1270);
        let routine = RoutineBuilder::new("reset").pose_from_distance(25.4).build();
        seq.run(&routine).unwrap();
        let pose = chassis.pose();
        assert!((pose.x - 50.0).abs() < 1e-9);
        assert_eq!(pose.y, 0.0);
    }

    #[test]
    fn test_invalid_routine_rejected() {
        let (_rig, robot, _chassis, seq) = setup();
        let routine = RoutineBuilder::new("bad").intake(true).intake_raw(2.0, 0.0).build();
        let err = seq.run(&routine).unwrap_err();
        assert!(matches!(err, SequenceError::InvalidStep { step: 1, .. }));
        assert!(!robot.context().intake_enabled());
    }

    /// 测试关闭标志打断延时
    #[test]
    fn test_shutdown_aborts_delay() {
        let (_rig, robot, _chassis, seq) = setup();
        let ctx = robot.context().clone();
        let routine = RoutineBuilder::new("long").delay(5000).intake(true).build();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            ctx.request_shutdown();
        });
        let start = Instant::now();
        let err = seq.run(&routine).unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, SequenceError::Aborted { step: 0 }));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!robot.context().intake_enabled());
    }

    fn slow_sequencer(robot: &Robot) -> (Arc<SimChassis>, Sequencer) {
        let chassis = Arc::new(SimChassis::with_config(SimChassisConfig {
            linear_speed_ips: 1.0,
            turn_speed_dps: 10.0,
        }));
        let sequencer = Sequencer::new(robot, chassis.clone(), SequenceConfig::default());
        (chassis, sequencer)
    }

    fn shutdown_after(robot: &Robot, delay: Duration) -> std::thread::JoinHandle<()> {
        let ctx = robot.context().clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            ctx.request_shutdown();
        })
    }

    /// 测试等待运动结束时关闭立即中止，底盘停住
    #[test]
    fn test_shutdown_aborts_wait_done() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let (chassis, seq) = slow_sequencer(&robot);
        let routine = RoutineBuilder::new("long move")
            .set_pose(0.0, 0.0, 0.0)
            .move_to_point(0.0, 100.0, 3000, MoveOptions::default())
            .wait_done()
            .intake(true)
            .build();

        let stopper = shutdown_after(&robot, Duration::from_millis(100));
        let start = Instant::now();
        let err = seq.run(&routine).unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, SequenceError::Aborted { step: 2 }), "{:?}", err);
        assert!(start.elapsed() < Duration::from_millis(600), "took {:?}", start.elapsed());
        assert!(!chassis.is_in_motion());
        assert!(!robot.context().intake_enabled());
        assert!(!robot.context().autonomous_running());
    }

    /// 测试等待行进距离时关闭立即中止
    #[test]
    fn test_shutdown_aborts_wait_progress() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let (chassis, seq) = slow_sequencer(&robot);
        let routine = RoutineBuilder::new("checkpoint")
            .move_to_point(0.0, 100.0, 3000, MoveOptions::default())
            .wait_until(50.0)
            .cancel()
            .build();

        let stopper = shutdown_after(&robot, Duration::from_millis(100));
        let start = Instant::now();
        let err = seq.run(&routine).unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, SequenceError::Aborted { step: 1 }), "{:?}", err);
        assert!(start.elapsed() < Duration::from_millis(600));
        assert!(!chassis.is_in_motion());
    }

    /// 测试排队等待上一条运动时关闭立即中止，不再下发下一条
    #[test]
    fn test_shutdown_aborts_queued_motion() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let (chassis, seq) = slow_sequencer(&robot);
        let routine = RoutineBuilder::new("queue")
            .turn_to_heading(90.0, 3000, MoveOptions::default())
            .move_to_point(0.0, 10.0, 3000, MoveOptions::default())
            .build();

        let stopper = shutdown_after(&robot, Duration::from_millis(100));
        let start = Instant::now();
        let err = seq.run(&routine).unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, SequenceError::Aborted { step: 1 }), "{:?}", err);
        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(chassis.motion_count(), 1);
    }

    /// 测试 wait_until 在到达行进距离后继续，不等运动结束
    #[test]
    fn test_wait_until_progress_continues_early() {
        let rig = SimRig::new();
        let robot = RobotBuilder::new(rig.hardware()).build().unwrap();
        let chassis = Arc::new(SimChassis::with_config(SimChassisConfig {
            linear_speed_ips: 100.0,
            turn_speed_dps: 360.0,
        }));
        let seq = Sequencer::new(&robot, chassis.clone(), SequenceConfig::default());
        let routine = RoutineBuilder::new("checkpoint")
            .set_pose(0.0, 0.0, 0.0)
            .move_to_point(0.0, 100.0, 5000, MoveOptions::default())
            .wait_until(10.0)
            .cancel()
            .build();
        let start = Instant::now();
        seq.run(&routine).unwrap();
        assert!(start.elapsed() < Duration::from_millis(600));
        let y = chassis.pose().y;
        assert!(y >= 10.0 - 1e-6 && y < 60.0, "y = {}", y);
    }
}
