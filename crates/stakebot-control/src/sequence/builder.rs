//! 自动程序 Builder
//!
//! 链式追加步骤，每个方法对应一条 [`Step`]。

use stakebot_driver::TeamColor;
use stakebot_hal::BrakeMode;

use super::Routine;
use super::step::{Condition, OnTimeout, Step};
use crate::motion::{DriveSide, MoveOptions};

/// 自动程序 Builder
#[derive(Debug, Clone)]
pub struct RoutineBuilder {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl RoutineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 追加任意步骤
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn team(self, team: TeamColor) -> Self {
        self.step(Step::SetTeam { team })
    }

    pub fn set_pose(self, x: f64, y: f64, theta: f64) -> Self {
        self.step(Step::SetPose { x, y, theta })
    }

    pub fn move_to_point(self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions) -> Self {
        self.step(Step::MoveToPoint {
            x,
            y,
            timeout_ms,
            options,
        })
    }

    pub fn move_to_pose(
        self,
        x: f64,
        y: f64,
        theta: f64,
        timeout_ms: u64,
        options: MoveOptions,
    ) -> Self {
        self.step(Step::MoveToPose {
            x,
            y,
            theta,
            timeout_ms,
            options,
        })
    }

    pub fn turn_to_heading(self, theta: f64, timeout_ms: u64, options: MoveOptions) -> Self {
        self.step(Step::TurnToHeading {
            theta,
            timeout_ms,
            options,
        })
    }

    pub fn turn_to_point(self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions) -> Self {
        self.step(Step::TurnToPoint {
            x,
            y,
            timeout_ms,
            options,
        })
    }

    pub fn swing_to_heading(
        self,
        theta: f64,
        side: DriveSide,
        timeout_ms: u64,
        options: MoveOptions,
    ) -> Self {
        self.step(Step::SwingToHeading {
            theta,
            side,
            timeout_ms,
            options,
        })
    }

    pub fn swing_to_point(
        self,
        x: f64,
        y: f64,
        side: DriveSide,
        timeout_ms: u64,
        options: MoveOptions,
    ) -> Self {
        self.step(Step::SwingToPoint {
            x,
            y,
            side,
            timeout_ms,
            options,
        })
    }

    pub fn wait_until(self, progress: f64) -> Self {
        self.step(Step::WaitUntil { progress })
    }

    pub fn wait_done(self) -> Self {
        self.step(Step::WaitUntilDone)
    }

    pub fn cancel(self) -> Self {
        self.step(Step::CancelMotion)
    }

    pub fn clamp(self, engage: bool) -> Self {
        self.step(Step::SetClamp { engage })
    }

    pub fn intake(self, enabled: bool) -> Self {
        self.step(Step::SetIntake { enabled })
    }

    pub fn ring_hold(self, active: bool) -> Self {
        self.step(Step::SetRingHold { active })
    }

    pub fn staged(self, active: bool) -> Self {
        self.step(Step::SetStaged { active })
    }

    pub fn intake_raw(self, primary: f64, secondary: f64) -> Self {
        self.step(Step::SetIntakeRaw { primary, secondary })
    }

    pub fn doinker(self, extended: bool) -> Self {
        self.step(Step::SetDoinker { extended })
    }

    pub fn hang(self, extended: bool) -> Self {
        self.step(Step::SetHang { extended })
    }

    /// 只改目标和容差，保留当前刹车模式
    pub fn arm(self, target_deg: f64, tolerance_deg: f64) -> Self {
        self.step(Step::SetArm {
            target_deg,
            tolerance_deg,
            brake: None,
            step: None,
        })
    }

    /// 目标、容差和刹车模式一起设置
    pub fn arm_brake(self, target_deg: f64, tolerance_deg: f64, brake: BrakeMode) -> Self {
        self.step(Step::SetArm {
            target_deg,
            tolerance_deg,
            brake: Some(brake),
            step: None,
        })
    }

    /// 同时设置主预设档位（如计分后自动复位需要的 step 2）
    pub fn arm_step(
        self,
        target_deg: f64,
        tolerance_deg: f64,
        brake: Option<BrakeMode>,
        step: u8,
    ) -> Self {
        self.step(Step::SetArm {
            target_deg,
            tolerance_deg,
            brake,
            step: Some(step),
        })
    }

    /// 使用默认超时等待，超时则中止
    pub fn wait_for(self, condition: Condition) -> Self {
        self.step(Step::WaitFor {
            condition,
            timeout_ms: None,
            on_timeout: OnTimeout::Abort,
        })
    }

    /// 有界等待，超时后记录警告并继续
    pub fn wait_for_or_continue(self, condition: Condition, timeout_ms: u64) -> Self {
        self.step(Step::WaitFor {
            condition,
            timeout_ms: Some(timeout_ms),
            on_timeout: OnTimeout::Continue,
        })
    }

    pub fn delay(self, ms: u64) -> Self {
        self.step(Step::Delay { ms })
    }

    pub fn drive_pulse(self, left: f64, right: f64, ms: u64) -> Self {
        self.step(Step::DrivePulse { left, right, ms })
    }

    pub fn drive_power(self, left: f64, right: f64) -> Self {
        self.step(Step::DrivePower { left, right })
    }

    pub fn pose_from_distance(self, divisor: f64) -> Self {
        self.step(Step::SetPoseFromDistance { divisor })
    }

    pub fn build(self) -> Routine {
        Routine {
            name: self.name,
            description: self.description,
            steps: self.steps,
        }
    }
}
