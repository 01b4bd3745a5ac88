//! 机械臂位置环
//!
//! 单个电机 + 旋转传感器的 PD 位置控制。目标、容差、档位和刹车模式只由
//! 机械臂循环持有；其他参与方（脚本、操作手、挂杆触发器）通过
//! [`ArmCommander`] 发送 [`ArmRequest`]，请求在每个 tick 开始时按顺序应用
//! （后到的请求覆盖先到的）。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use stakebot_hal::{BrakeMode, MAX_VOLTAGE_MV, Motor, RotationSensor};
use tracing::{debug, trace, warn};

use crate::config::ArmConfig;
use crate::pipeline::ControlLoop;
use crate::state::{ArmStatus, RobotContext};
use crate::DriverError;

/// 预设姿态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmPreset {
    pub target_deg: f64,
    pub brake: BrakeMode,
    pub tolerance_deg: f64,
}

impl ArmPreset {
    pub const fn new(target_deg: f64, brake: BrakeMode, tolerance_deg: f64) -> Self {
        Self {
            target_deg,
            brake,
            tolerance_deg,
        }
    }
}

/// 主预设循环（按档位索引）：0 收回，1 接环，2 出分
pub const PRIMARY_PRESETS: [ArmPreset; 3] = [
    ArmPreset::new(0.0, BrakeMode::Coast, 40.0),
    ArmPreset::new(26.0, BrakeMode::Hold, 0.2),
    ArmPreset::new(210.0, BrakeMode::Coast, 40.0),
];

/// 副预设循环：0 联盟桩，1 收回
pub const SECONDARY_PRESETS: [ArmPreset; 2] = [
    ArmPreset::new(250.0, BrakeMode::Hold, 10.0),
    ArmPreset::new(0.0, BrakeMode::Coast, 10.0),
];

/// 计分姿态（开）
pub const SCORE_PRESET: ArmPreset = ArmPreset::new(180.0, BrakeMode::Hold, 2.0);
/// 计分姿态（关），同时档位归零
pub const SCORE_EXIT_PRESET: ArmPreset = ArmPreset::new(0.0, BrakeMode::Coast, 10.0);

/// 挂杆：先收臂
pub const HANG_TUCK_PRESET: ArmPreset = ArmPreset::new(0.0, BrakeMode::Hold, 1.0);
/// 挂杆：气缸伸出后抬臂
pub const HANG_LIFT_PRESET: ArmPreset = ArmPreset::new(41.0, BrakeMode::Hold, 1.0);

/// 目标设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmTarget {
    pub target_deg: f64,
    pub tolerance_deg: f64,
    /// 同时修改刹车模式
    pub brake: Option<BrakeMode>,
    /// 同时修改主预设档位
    pub step: Option<u8>,
}

impl From<ArmPreset> for ArmTarget {
    fn from(preset: ArmPreset) -> Self {
        Self {
            target_deg: preset.target_deg,
            tolerance_deg: preset.tolerance_deg,
            brake: Some(preset.brake),
            step: None,
        }
    }
}

/// 机械臂请求
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArmRequest {
    /// 直接设置目标（绕过预设循环）
    Set(ArmTarget),
    /// 主预设循环前进一档（周期 3）
    CyclePrimary,
    /// 副预设循环前进一档（周期 2）
    CycleSecondary,
    /// 切换计分姿态
    ToggleScore,
}

/// 把角度折算到 [0, 360)
pub fn normalize_target(deg: f64) -> f64 {
    let v = deg.rem_euclid(360.0);
    // rem_euclid 对极小负数可能返回 360.0
    if v >= 360.0 { 0.0 } else { v }
}

/// 传感器读数折算：超过 `fold_above` 的读数视为零点下方
pub fn fold_angle(raw_deg: f64, fold_above: f64) -> f64 {
    if raw_deg > fold_above {
        raw_deg - 360.0
    } else {
        raw_deg
    }
}

/// PD 控制器（无积分项）
///
/// 微分项按 tick 计算（误差差分），与控制周期无关。
#[derive(Debug, Clone)]
pub struct PdController {
    kp: f64,
    kd: f64,
    prev_error: Option<f64>,
}

impl PdController {
    pub fn new(kp: f64, kd: f64) -> Self {
        Self {
            kp,
            kd,
            prev_error: None,
        }
    }

    pub fn update(&mut self, error: f64) -> f64 {
        let derivative = self.prev_error.map_or(0.0, |prev| error - prev);
        self.prev_error = Some(error);
        self.kp * error + self.kd * derivative
    }

    pub fn reset(&mut self) {
        self.prev_error = None;
    }
}

/// 机械臂控制循环
pub struct ArmController {
    ctx: Arc<RobotContext>,
    motor: Arc<dyn Motor>,
    sensor: Arc<dyn RotationSensor>,
    requests: Receiver<ArmRequest>,
    config: ArmConfig,
    pd: PdController,

    target_deg: f64,
    tolerance_deg: f64,
    step: u8,
    secondary_index: u8,
    score_active: bool,
    brake_mode: BrakeMode,
    last_angle: f64,
}

impl ArmController {
    pub fn new(
        ctx: Arc<RobotContext>,
        motor: Arc<dyn Motor>,
        sensor: Arc<dyn RotationSensor>,
        requests: Receiver<ArmRequest>,
        config: ArmConfig,
    ) -> Self {
        let pd = PdController::new(config.kp, config.kd);
        let tolerance_deg = config.rest_tolerance_deg;
        Self {
            ctx,
            motor,
            sensor,
            requests,
            config,
            pd,
            target_deg: 0.0,
            tolerance_deg,
            step: 0,
            secondary_index: 0,
            score_active: false,
            brake_mode: BrakeMode::Coast,
            last_angle: 0.0,
        }
    }

    fn apply(&mut self, request: ArmRequest) {
        match request {
            ArmRequest::Set(target) => {
                if let Some(step) = target.step {
                    self.step = step % 3;
                }
                self.set_target(target.target_deg, target.tolerance_deg, target.brake);
            },
            ArmRequest::CyclePrimary => {
                self.step = (self.step + 1) % 3;
                let preset = PRIMARY_PRESETS[self.step as usize];
                self.set_preset(preset);
            },
            ArmRequest::CycleSecondary => {
                let preset = SECONDARY_PRESETS[self.secondary_index as usize];
                self.secondary_index = (self.secondary_index + 1) % 2;
                self.set_preset(preset);
            },
            ArmRequest::ToggleScore => {
                if self.score_active {
                    self.step = 0;
                    self.set_preset(SCORE_EXIT_PRESET);
                } else {
                    self.set_preset(SCORE_PRESET);
                }
                self.score_active = !self.score_active;
            },
        }
        debug!(
            "arm request {:?} -> target {:.1}° tol {} step {}",
            request, self.target_deg, self.tolerance_deg, self.step
        );
    }

    fn set_preset(&mut self, preset: ArmPreset) {
        self.set_target(preset.target_deg, preset.tolerance_deg, Some(preset.brake));
    }

    fn set_target(&mut self, target_deg: f64, tolerance_deg: f64, brake: Option<BrakeMode>) {
        let target = normalize_target(target_deg);
        if target != self.target_deg {
            self.pd.reset();
        }
        self.target_deg = target;
        self.tolerance_deg = tolerance_deg.max(0.0);
        if let Some(mode) = brake {
            self.brake_mode = mode;
            if let Err(e) = self.motor.set_brake_mode(mode) {
                warn!("arm: failed to set brake mode {:?}: {}", mode, e);
            }
        }
    }

    fn status(&self, settled: bool) -> ArmStatus {
        ArmStatus {
            angle_deg: self.last_angle,
            target_deg: self.target_deg,
            tolerance_deg: self.tolerance_deg,
            step: self.step,
            secondary_index: self.secondary_index,
            score_active: self.score_active,
            brake_mode: self.brake_mode,
            settled,
        }
    }
}

impl ControlLoop for ArmController {
    fn name(&self) -> &'static str {
        "arm"
    }

    fn tick(&mut self, _now: Instant) -> Duration {
        let period = self.config.period();
        let ctx = Arc::clone(&self.ctx);
        let metrics = &ctx.metrics;
        metrics.arm_ticks.fetch_add(1, Ordering::Relaxed);

        let pending: Vec<ArmRequest> = self.requests.try_iter().collect();
        for request in pending {
            self.apply(request);
            metrics.arm_requests.fetch_add(1, Ordering::Relaxed);
        }

        let raw = match self.sensor.angle_centidegrees() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("arm: rotation sensor read failed, skipping tick: {}", e);
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                self.ctx.publish_arm(self.status(false));
                return period;
            },
        };
        let angle = fold_angle(raw as f64 / 100.0, self.config.fold_above_deg);
        self.last_angle = angle;

        let error = self.target_deg - angle;
        let settled = if error.abs() > self.tolerance_deg {
            let output = self.pd.update(error);
            let millivolts = (output * self.config.output_to_millivolts)
                .round()
                .clamp(-(MAX_VOLTAGE_MV as f64), MAX_VOLTAGE_MV as f64)
                as i32;
            trace!("arm: angle {:.2} error {:.2} -> {} mV", angle, error, millivolts);
            if let Err(e) = self.motor.set_voltage(millivolts) {
                warn!("arm: set_voltage failed: {}", e);
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
            }
            false
        } else if self.step == 2 && error.abs() < self.config.auto_reset_window_deg {
            debug!("arm: step 2 reached at {:.1}°, returning to rest", angle);
            self.step = 0;
            self.target_deg = 0.0;
            self.tolerance_deg = self.config.rest_tolerance_deg;
            self.pd.reset();
            (self.target_deg - angle).abs() <= self.tolerance_deg
        } else {
            if let Err(e) = self.motor.brake() {
                warn!("arm: brake failed: {}", e);
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
            }
            true
        };

        self.ctx.publish_arm(self.status(settled));
        period
    }

    fn on_exit(&mut self) {
        let _ = self.motor.brake();
    }
}

/// 机械臂请求发送端（可克隆）
#[derive(Clone)]
pub struct ArmCommander {
    tx: Sender<ArmRequest>,
    ctx: Arc<RobotContext>,
}

impl ArmCommander {
    pub fn new(tx: Sender<ArmRequest>, ctx: Arc<RobotContext>) -> Self {
        Self { tx, ctx }
    }

    /// 发送请求（下一个 tick 生效）
    pub fn send(&self, request: ArmRequest) -> Result<(), DriverError> {
        if let ArmRequest::Set(target) = request {
            if !target.target_deg.is_finite() || !target.tolerance_deg.is_finite() {
                return Err(DriverError::InvalidInput(format!(
                    "non-finite arm target {:?}",
                    target
                )));
            }
            if target.tolerance_deg < 0.0 {
                return Err(DriverError::InvalidInput(format!(
                    "negative arm tolerance {}",
                    target.tolerance_deg
                )));
            }
            if matches!(target.step, Some(s) if s > 2) {
                return Err(DriverError::InvalidInput(format!(
                    "arm step must be 0..=2, got {:?}",
                    target.step
                )));
            }
        }
        self.tx.send(request).map_err(|_| DriverError::ChannelClosed)
    }

    /// 设置目标与容差，可选同时设置刹车模式
    pub fn set_target(
        &self,
        target_deg: f64,
        tolerance_deg: f64,
        brake: Option<BrakeMode>,
    ) -> Result<(), DriverError> {
        self.send(ArmRequest::Set(ArmTarget {
            target_deg,
            tolerance_deg,
            brake,
            step: None,
        }))
    }

    pub fn set_preset(&self, preset: ArmPreset) -> Result<(), DriverError> {
        self.send(ArmRequest::Set(preset.into()))
    }

    pub fn cycle_primary(&self) -> Result<(), DriverError> {
        self.send(ArmRequest::CyclePrimary)
    }

    pub fn cycle_secondary(&self) -> Result<(), DriverError> {
        self.send(ArmRequest::CycleSecondary)
    }

    pub fn toggle_score(&self) -> Result<(), DriverError> {
        self.send(ArmRequest::ToggleScore)
    }

    /// 最近一次发布的状态
    pub fn status(&self) -> ArmStatus {
        self.ctx.arm_status()
    }
}
