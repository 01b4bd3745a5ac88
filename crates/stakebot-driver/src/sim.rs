//! 仿真硬件套件
//!
//! 一整套 [`stakebot_hal::sim`] 设备，保留具体类型的句柄以便测试注入读数和检查命令。

use std::sync::Arc;

use stakebot_hal::sim::{SimDistance, SimMotor, SimOptical, SimPiston, SimRotation};

use crate::robot::RobotHardware;

/// 仿真硬件套件
#[derive(Clone)]
pub struct SimRig {
    pub arm_motor: Arc<SimMotor>,
    pub arm_rotation: Arc<SimRotation>,
    pub intake_primary: Arc<SimMotor>,
    pub intake_secondary: Arc<SimMotor>,
    pub optical: Arc<SimOptical>,
    pub clamp_piston: Arc<SimPiston>,
    pub clamp_distance: Arc<SimDistance>,
    pub doinker_piston: Arc<SimPiston>,
    pub hang_piston: Arc<SimPiston>,
    pub reset_distance: Arc<SimDistance>,
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            arm_motor: Arc::new(SimMotor::new(21)),
            arm_rotation: Arc::new(SimRotation::new()),
            intake_primary: Arc::new(SimMotor::new(11)),
            intake_secondary: Arc::new(SimMotor::new(20)),
            optical: Arc::new(SimOptical::new()),
            clamp_piston: Arc::new(SimPiston::new("clamp")),
            clamp_distance: Arc::new(SimDistance::new()),
            doinker_piston: Arc::new(SimPiston::new("doinker")),
            hang_piston: Arc::new(SimPiston::new("hang")),
            reset_distance: Arc::new(SimDistance::new()),
        }
    }

    /// 以 trait 对象形式交给驱动
    pub fn hardware(&self) -> RobotHardware {
        RobotHardware {
            arm_motor: self.arm_motor.clone(),
            arm_rotation: self.arm_rotation.clone(),
            intake_primary: self.intake_primary.clone(),
            intake_secondary: self.intake_secondary.clone(),
            optical: self.optical.clone(),
            clamp_piston: self.clamp_piston.clone(),
            clamp_distance: self.clamp_distance.clone(),
            doinker_piston: self.doinker_piston.clone(),
            hang_piston: self.hang_piston.clone(),
            reset_distance: self.reset_distance.clone(),
        }
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}
