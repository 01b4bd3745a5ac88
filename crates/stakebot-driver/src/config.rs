//! 控制循环配置
//!
//! 所有时间常数和阈值都可以配置，默认值为比赛中调好的参数。
//! 所有结构体都带 `#[serde(default)]`，部分配置文件也能加载。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DriverError;

/// 遥控器/电机使用的原始功率刻度（±127）
pub const RAW_POWER_SCALE: f64 = 127.0;

/// 把 ±127 刻度的原始功率转换为归一化功率
pub const fn raw_power(raw: i32) -> f64 {
    raw as f64 / RAW_POWER_SCALE
}

/// 机械臂位置环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    /// 控制周期（毫秒）
    pub period_ms: u64,
    pub kp: f64,
    pub kd: f64,
    /// 控制器输出到电机电压（毫伏）的比例
    pub output_to_millivolts: f64,
    /// 传感器读数超过该角度时减去 360°（处理零点附近的回绕）
    pub fold_above_deg: f64,
    /// 第 2 档到位后自动归零的误差窗口（度）
    pub auto_reset_window_deg: f64,
    /// 自动归零后的容差（度）
    pub rest_tolerance_deg: f64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            kp: 1.6,
            kd: 0.0,
            output_to_millivolts: 100.0,
            fold_above_deg: 350.0,
            auto_reset_window_deg: 30.0,
            rest_tolerance_deg: 40.0,
        }
    }
}

impl ArmConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// 卡死检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallConfig {
    /// 扭矩阈值（N·m），超过视为受阻
    pub torque_threshold: f64,
    /// 转速阈值（rpm），绝对值低于视为停转
    pub velocity_threshold: f64,
    /// 解卡脉冲功率（归一化）
    pub pulse_power: f64,
    pub pulse_ms: u64,
    /// 进球通道开启时的轮询周期
    pub poll_enabled_ms: u64,
    /// 进球通道关闭时的轮询周期
    pub poll_disabled_ms: u64,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            torque_threshold: 0.34,
            velocity_threshold: 1.0,
            pulse_power: raw_power(90),
            pulse_ms: 100,
            poll_enabled_ms: 100,
            poll_disabled_ms: 150,
        }
    }
}

/// 进球通道颜色仲裁配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// 普通模式下判定"有物体"的接近度阈值
    pub proximity_threshold: f64,
    /// 持环模式下的接近度阈值
    pub ring_hold_proximity_threshold: f64,
    pub brightness_threshold: f64,
    /// 检测到异色环后、开始反转前的延时
    pub reject_delay_ms: u64,
    /// 反转持续时间
    pub reject_ms: u64,
    /// 反转功率（归一化，负值为反转）
    pub reject_power: f64,
    /// 持环等待期间第一级电机的功率
    pub ring_hold_primary_power: f64,
    /// 持环模式下，超过该 tick 数仍未检测到己方环则直接停止
    pub ring_hold_fallback_ticks: u32,
    pub poll_enabled_ms: u64,
    pub poll_disabled_ms: u64,
    /// 已持环时的轮询周期
    pub ring_held_poll_ms: u64,
    /// 自动阶段光学传感器补光灯亮度（百分比）
    pub autonomous_led_pwm: u8,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: 100.0,
            ring_hold_proximity_threshold: 60.0,
            brightness_threshold: 0.05,
            reject_delay_ms: 150,
            reject_ms: 200,
            reject_power: -raw_power(120),
            ring_hold_primary_power: -raw_power(100),
            ring_hold_fallback_ticks: 300,
            poll_enabled_ms: 10,
            poll_disabled_ms: 50,
            ring_held_poll_ms: 200,
            autonomous_led_pwm: 95,
        }
    }
}

/// 夹子控制配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClampConfig {
    /// 距离小于该值（毫米）视为目标到位
    pub engage_distance_mm: u32,
    /// 目标需要持续到位的时间
    pub settle_ms: u64,
    /// 松开后的去抖时间
    pub release_debounce_ms: u64,
    /// 请求夹紧时的轮询周期
    pub poll_engaged_ms: u64,
    pub poll_idle_ms: u64,
}

impl Default for ClampConfig {
    fn default() -> Self {
        Self {
            engage_distance_mm: 25,
            settle_ms: 250,
            release_debounce_ms: 100,
            poll_engaged_ms: 10,
            poll_idle_ms: 100,
        }
    }
}

/// 驱动配置（全部控制循环）
///
/// # Example
///
/// ```
/// use stakebot_driver::DriverConfig;
///
/// let mut config = DriverConfig::default();
/// config.clamp.settle_ms = 300;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub arm: ArmConfig,
    pub stall: StallConfig,
    pub intake: IntakeConfig,
    pub clamp: ClampConfig,
    /// 关闭时等待每个线程退出的最长时间
    pub join_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            arm: ArmConfig::default(),
            stall: StallConfig::default(),
            intake: IntakeConfig::default(),
            clamp: ClampConfig::default(),
            join_timeout_ms: 2000,
        }
    }
}

impl DriverConfig {
    /// 校验配置：周期必须非零，阈值必须为正且有限
    pub fn validate(&self) -> Result<(), DriverError> {
        let periods = [
            ("arm.period_ms", self.arm.period_ms),
            ("stall.pulse_ms", self.stall.pulse_ms),
            ("stall.poll_enabled_ms", self.stall.poll_enabled_ms),
            ("stall.poll_disabled_ms", self.stall.poll_disabled_ms),
            ("intake.reject_ms", self.intake.reject_ms),
            ("intake.poll_enabled_ms", self.intake.poll_enabled_ms),
            ("intake.poll_disabled_ms", self.intake.poll_disabled_ms),
            ("intake.ring_held_poll_ms", self.intake.ring_held_poll_ms),
            ("clamp.poll_engaged_ms", self.clamp.poll_engaged_ms),
            ("clamp.poll_idle_ms", self.clamp.poll_idle_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(DriverError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        let thresholds = [
            ("arm.kp", self.arm.kp),
            ("arm.output_to_millivolts", self.arm.output_to_millivolts),
            ("arm.rest_tolerance_deg", self.arm.rest_tolerance_deg),
            ("stall.torque_threshold", self.stall.torque_threshold),
            ("stall.velocity_threshold", self.stall.velocity_threshold),
            ("intake.proximity_threshold", self.intake.proximity_threshold),
            (
                "intake.ring_hold_proximity_threshold",
                self.intake.ring_hold_proximity_threshold,
            ),
            ("intake.brightness_threshold", self.intake.brightness_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(DriverError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if !self.arm.kd.is_finite() || self.arm.kd < 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "arm.kd must be >= 0, got {}",
                self.arm.kd
            )));
        }

        let powers = [
            ("stall.pulse_power", self.stall.pulse_power),
            ("intake.reject_power", self.intake.reject_power),
            ("intake.ring_hold_primary_power", self.intake.ring_hold_primary_power),
        ];
        for (name, value) in powers {
            if !(-1.0..=1.0).contains(&value) {
                return Err(DriverError::InvalidConfig(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }

        if self.clamp.engage_distance_mm == 0 {
            return Err(DriverError::InvalidConfig(
                "clamp.engage_distance_mm must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
