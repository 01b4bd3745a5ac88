//! # Stakebot 设备抽象层
//!
//! 统一的设备接口抽象：电机、气缸、旋转/距离/光学传感器、手柄。
//!
//! 所有接口都以 `&self` 调用（设备句柄内部可变），以便通过
//! `Arc<dyn Motor>` 等形式在多个控制循环之间共享同一个物理设备。
//! 谁可以写哪个执行器由上层（`stakebot-driver`）的所有权约定决定，
//! 本层不做仲裁。
//!
//! [`sim`] 模块提供纯内存实现，用于单元测试和无硬件的 dry-run。

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod sim;

/// 电机最大电压（毫伏）
pub const MAX_VOLTAGE_MV: i32 = 12_000;

/// 设备层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    Disconnected,
    WrongDeviceType,
    NotCalibrated,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?} on port {port}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub port: u8,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, port: u8, message: impl Into<String>) -> Self {
        Self {
            kind,
            port,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::Disconnected | DeviceErrorKind::WrongDeviceType
        )
    }
}

/// 电机刹车模式
///
/// 由设置目标的一方一并指定；控制循环在到位后用当前模式刹车。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrakeMode {
    /// 断电滑行
    #[default]
    Coast,
    /// 短路制动
    Brake,
    /// 位置保持
    Hold,
}

/// 光学传感器读数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OpticalReading {
    /// 接近度（0-255，越大越近）
    pub proximity: f64,
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    /// 亮度（0.0-1.0）
    pub brightness: f64,
}

/// 手柄按钮（按下为 true）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    pub l1: bool,
    pub l2: bool,
    pub r1: bool,
    pub r2: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
}

/// 手柄完整状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    /// 左摇杆纵轴（-1.0 ~ 1.0，向前为正）
    pub left_y: f64,
    /// 右摇杆横轴（-1.0 ~ 1.0，向右为正）
    pub right_x: f64,
    pub buttons: Buttons,
}

/// 电机
///
/// 功率为归一化值（-1.0 ~ 1.0），正方向为机构的"前进"方向
/// （端口反向由实现处理）。
pub trait Motor: Send + Sync {
    fn set_power(&self, power: f64) -> Result<(), HalError>;
    fn set_voltage(&self, millivolts: i32) -> Result<(), HalError>;
    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), HalError>;
    /// 以当前刹车模式停止
    fn brake(&self) -> Result<(), HalError>;
    /// 输出扭矩（N·m）
    fn torque(&self) -> Result<f64, HalError>;
    /// 实际转速（rpm）
    fn velocity(&self) -> Result<f64, HalError>;
}

/// 单作用气缸（电磁阀）
pub trait Piston: Send + Sync {
    fn set_extended(&self, extended: bool) -> Result<(), HalError>;
    /// 最近一次下发的状态
    fn is_extended(&self) -> bool;
}

/// 旋转传感器
pub trait RotationSensor: Send + Sync {
    /// 绝对角度（0.01 度，0 ~ 35999）
    fn angle_centidegrees(&self) -> Result<i32, HalError>;
}

/// 距离传感器
pub trait DistanceSensor: Send + Sync {
    fn distance_mm(&self) -> Result<u32, HalError>;
}

/// 光学（颜色 + 接近度）传感器
pub trait OpticalSensor: Send + Sync {
    fn reading(&self) -> Result<OpticalReading, HalError>;

    /// 补光灯亮度（百分比）
    fn set_led_pwm(&self, percent: u8) -> Result<(), HalError> {
        let _ = percent;
        Ok(())
    }
}

/// 操作手柄
pub trait Gamepad: Send + Sync {
    fn state(&self) -> Result<ControllerState, HalError>;
}
