//! Builder 模式实现
//!
//! 提供链式构造 `Robot` 实例的便捷方式。

use std::fmt::Display;
use std::sync::Arc;

use crossbeam_channel::unbounded;
use tracing::info;

use crate::arm::{ArmCommander, ArmController};
use crate::clamp::ClampController;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::intake::IntakeArbiter;
use crate::pipeline::spawn_loop;
use crate::robot::{Robot, RobotHardware};
use crate::stall::StallDetector;
use crate::state::RobotContext;

/// Robot Builder（链式构造）
///
/// # Example
///
/// ```
/// use stakebot_driver::{DriverConfig, RobotBuilder, sim::SimRig};
///
/// let rig = SimRig::new();
/// let robot = RobotBuilder::new(rig.hardware())
///     .config(DriverConfig::default())
///     .build()
///     .unwrap();
/// assert!(robot.is_running());
/// ```
pub struct RobotBuilder {
    hardware: RobotHardware,
    config: DriverConfig,
    context: Option<Arc<RobotContext>>,
}

impl RobotBuilder {
    pub fn new(hardware: RobotHardware) -> Self {
        Self {
            hardware,
            config: DriverConfig::default(),
            context: None,
        }
    }

    /// 设置驱动配置（可选，默认 [`DriverConfig::default`]）
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用外部创建的上下文（例如需要在 Ctrl-C 处理器中提前持有它）
    pub fn context(mut self, context: Arc<RobotContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// 不做标定，直接启动控制循环
    pub fn build(self) -> Result<Robot, DriverError> {
        self.build_with_calibration(|| Ok::<(), DriverError>(()))
    }

    /// 先执行一次标定（如底盘 IMU 标定），成功后再启动控制循环
    pub fn build_with_calibration<F, E>(self, calibrate: F) -> Result<Robot, DriverError>
    where
        F: FnOnce() -> Result<(), E>,
        E: Display,
    {
        self.config.validate()?;

        calibrate().map_err(|e| DriverError::Calibration(e.to_string()))?;

        let ctx = self.context.unwrap_or_else(|| Arc::new(RobotContext::new()));
        let hw = self.hardware;
        let config = self.config;

        let (arm_tx, arm_rx) = unbounded();
        let arm = ArmCommander::new(arm_tx, ctx.clone());
        let mut robot = Robot::new(ctx.clone(), arm, hw.clone(), config.clone());

        // 任一线程启动失败时，已启动的线程由 Robot 的 Drop 负责回收
        let handle = spawn_loop(
            StallDetector::new(ctx.clone(), hw.intake_primary.clone(), config.stall.clone()),
            ctx.clone(),
        )?;
        robot.attach_thread("stall", handle);

        let handle = spawn_loop(
            ClampController::new(
                ctx.clone(),
                hw.clamp_piston.clone(),
                hw.clamp_distance.clone(),
                config.clamp.clone(),
            ),
            ctx.clone(),
        )?;
        robot.attach_thread("clamp", handle);

        let handle = spawn_loop(
            IntakeArbiter::new(
                ctx.clone(),
                hw.intake_primary.clone(),
                hw.intake_secondary.clone(),
                hw.optical.clone(),
                config.intake.clone(),
            ),
            ctx.clone(),
        )?;
        robot.attach_thread("intake", handle);

        let handle = spawn_loop(
            ArmController::new(
                ctx.clone(),
                hw.arm_motor.clone(),
                hw.arm_rotation.clone(),
                arm_rx,
                config.arm.clone(),
            ),
            ctx,
        )?;
        robot.attach_thread("arm", handle);

        info!("robot started (4 control loops)");
        Ok(robot)
    }
}
