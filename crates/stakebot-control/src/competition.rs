//! 比赛阶段编排
//!
//! 初始化（底盘标定 + 启动控制循环）、自动阶段、操作手阶段。
//! 控制循环在两个阶段之间持续运行，阶段切换只改写意图。
//!
//! 卡死检测、进球通道和夹子循环是各自执行器的唯一写入方，操作手阶段不能另起线程
//! 直接驱动这些电机和气缸。操作手阶段通过 [`ClampPolicy::Manual`] 和
//! [`IntakeOverride`] 接管输出：夹子只跟随按键意图，进球通道只跟随 R1/R2，
//! 颜色排异和持环不再生效。卡死检测保持运行，第一级卡住时仍由它接管。

use std::sync::Arc;
use std::thread::JoinHandle;

use stakebot_driver::{
    ClampPolicy, DriverError, IntakeOverride, Robot, RobotBuilder, RobotContext, RobotHardware,
    run_loop, spawn_loop,
};
use stakebot_hal::Gamepad;
use tracing::{info, warn};

use crate::config::RobotConfig;
use crate::error::SequenceError;
use crate::motion::MotionController;
use crate::operator::OperatorControl;
use crate::routines::AutonSelector;
use crate::sequence::{Routine, RunReport, Sequencer};

/// 比赛编排
pub struct Competition {
    robot: Robot,
    chassis: Arc<dyn MotionController>,
    config: RobotConfig,
    selector: AutonSelector,
}

impl Competition {
    /// 标定底盘并启动控制循环
    pub fn initialize(
        hardware: RobotHardware,
        chassis: Arc<dyn MotionController>,
        config: RobotConfig,
    ) -> Result<Self, DriverError> {
        Self::initialize_with_context(hardware, chassis, config, Arc::new(RobotContext::new()))
    }

    /// 使用外部创建的上下文（如 Ctrl-C 处理器需要提前持有）
    pub fn initialize_with_context(
        hardware: RobotHardware,
        chassis: Arc<dyn MotionController>,
        config: RobotConfig,
        context: Arc<RobotContext>,
    ) -> Result<Self, DriverError> {
        config
            .validate()
            .map_err(|e| DriverError::InvalidConfig(e.to_string()))?;

        let calibrating = chassis.clone();
        let robot = RobotBuilder::new(hardware)
            .config(config.driver.clone())
            .context(context)
            .build_with_calibration(|| calibrating.calibrate())?;
        info!("competition initialized");

        Ok(Self {
            robot,
            chassis,
            config,
            selector: AutonSelector::new(),
        })
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn chassis(&self) -> &Arc<dyn MotionController> {
        &self.chassis
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn selector(&self) -> &AutonSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut AutonSelector {
        &mut self.selector
    }

    /// 自动阶段：执行选择器当前选中的程序
    pub fn autonomous(&self) -> Result<RunReport, SequenceError> {
        let routine = self.selector.routine();
        self.run_routine(&routine)
    }

    /// 以自动阶段的初始状态执行任意程序（脚本回放）
    pub fn run_routine(&self, routine: &Routine) -> Result<RunReport, SequenceError> {
        info!("autonomous: running '{}'", routine.name);
        self.robot
            .set_optical_led(self.config.driver.intake.autonomous_led_pwm)?;

        let ctx = self.robot.context();
        ctx.set_intake_override(IntakeOverride::None);
        ctx.set_clamp_policy(ClampPolicy::Auto);

        Sequencer::new(&self.robot, self.chassis.clone(), self.config.sequence.clone()).run(routine)
    }

    /// 操作手阶段：在当前线程上运行操作手循环，直到关闭
    pub fn operator_control(&self, gamepad: Arc<dyn Gamepad>) -> Result<(), DriverError> {
        let control = self.prepare_operator(gamepad)?;
        run_loop(control, self.robot.context().clone());
        Ok(())
    }

    /// 在独立线程上运行操作手循环
    pub fn spawn_operator_control(
        &self,
        gamepad: Arc<dyn Gamepad>,
    ) -> Result<JoinHandle<()>, DriverError> {
        let control = self.prepare_operator(gamepad)?;
        spawn_loop(control, self.robot.context().clone())
    }

    fn prepare_operator(&self, gamepad: Arc<dyn Gamepad>) -> Result<OperatorControl, DriverError> {
        info!("operator control started");
        if let Err(e) = self.robot.set_optical_led(0) {
            warn!("optical LED write failed: {}", e);
        }

        // 循环不停止，只切换到操作手的输出来源
        let ctx = self.robot.context();
        ctx.set_ring_hold_active(false);
        ctx.set_staged(false);
        ctx.set_clamp_policy(ClampPolicy::Manual);
        ctx.set_intake_override(IntakeOverride::Stop);

        let op = &self.config.operator;
        self.robot
            .arm()
            .set_target(op.arm_rest_deg, op.arm_rest_tolerance_deg, None)?;

        Ok(OperatorControl::new(
            &self.robot,
            self.chassis.clone(),
            gamepad,
            op.clone(),
        ))
    }

    /// 停止所有控制循环
    pub fn shutdown(&mut self) {
        self.chassis.cancel_motion();
        self.chassis.tank(0.0, 0.0);
        self.robot.shutdown();
    }
}
