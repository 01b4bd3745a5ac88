//! 仿真设备
//!
//! 纯内存实现的设备，用于单元测试、集成测试和 CLI dry-run。
//! 每个设备都可以从外部注入读数（模拟传感器）或检查下发的命令（模拟执行器），
//! 也可以注入故障以测试降级路径。

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    BrakeMode, ControllerState, DeviceError, DeviceErrorKind, DistanceSensor, Gamepad, HalError,
    Motor, OpticalReading, OpticalSensor, Piston, RotationSensor,
};

/// 电机命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    Power(f64),
    Voltage(i32),
    Brake(BrakeMode),
}

/// 带时间戳的电机命令记录
#[derive(Debug, Clone, Copy)]
pub struct MotorEvent {
    pub at: Instant,
    pub command: MotorCommand,
}

#[derive(Debug, Default)]
struct SimMotorState {
    brake_mode: BrakeMode,
    last: Option<MotorCommand>,
    torque: f64,
    velocity: f64,
    fault: Option<DeviceErrorKind>,
    log: Vec<MotorEvent>,
}

/// 仿真电机
///
/// 记录所有下发的命令；扭矩和转速由测试通过 [`SimMotor::set_feedback`] 注入。
#[derive(Debug)]
pub struct SimMotor {
    port: u8,
    state: Mutex<SimMotorState>,
}

impl SimMotor {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            state: Mutex::new(SimMotorState::default()),
        }
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    /// 注入扭矩（N·m）和转速（rpm）反馈
    pub fn set_feedback(&self, torque: f64, velocity: f64) {
        let mut state = self.state.lock();
        state.torque = torque;
        state.velocity = velocity;
    }

    /// 注入故障：之后所有调用都返回该错误，直到 [`SimMotor::clear_fault`]
    pub fn inject_fault(&self, kind: DeviceErrorKind) {
        self.state.lock().fault = Some(kind);
    }

    pub fn clear_fault(&self) {
        self.state.lock().fault = None;
    }

    /// 最近一次命令
    pub fn last_command(&self) -> Option<MotorCommand> {
        self.state.lock().last
    }

    /// 最近一次功率命令；若最近一次命令不是功率，返回 `None`
    pub fn last_power(&self) -> Option<f64> {
        match self.state.lock().last {
            Some(MotorCommand::Power(p)) => Some(p),
            _ => None,
        }
    }

    pub fn brake_mode(&self) -> BrakeMode {
        self.state.lock().brake_mode
    }

    /// 命令历史
    pub fn history(&self) -> Vec<MotorEvent> {
        self.state.lock().log.clone()
    }

    pub fn clear_history(&self) {
        self.state.lock().log.clear();
    }

    fn record(&self, command: MotorCommand) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fault {
            return Err(DeviceError::new(kind, self.port, "injected fault").into());
        }
        if let MotorCommand::Brake(mode) = command {
            state.brake_mode = mode;
        }
        state.last = Some(command);
        state.log.push(MotorEvent {
            at: Instant::now(),
            command,
        });
        Ok(())
    }

    fn check(&self) -> Result<(), HalError> {
        match self.state.lock().fault {
            Some(kind) => Err(DeviceError::new(kind, self.port, "injected fault").into()),
            None => Ok(()),
        }
    }
}

impl Motor for SimMotor {
    fn set_power(&self, power: f64) -> Result<(), HalError> {
        if !power.is_finite() {
            return Err(HalError::OutOfRange(format!("power {}", power)));
        }
        self.record(MotorCommand::Power(power.clamp(-1.0, 1.0)))
    }

    fn set_voltage(&self, millivolts: i32) -> Result<(), HalError> {
        self.record(MotorCommand::Voltage(
            millivolts.clamp(-crate::MAX_VOLTAGE_MV, crate::MAX_VOLTAGE_MV),
        ))
    }

    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), HalError> {
        self.check()?;
        self.state.lock().brake_mode = mode;
        Ok(())
    }

    fn brake(&self) -> Result<(), HalError> {
        let mode = self.state.lock().brake_mode;
        self.record(MotorCommand::Brake(mode))
    }

    fn torque(&self) -> Result<f64, HalError> {
        self.check()?;
        Ok(self.state.lock().torque)
    }

    fn velocity(&self) -> Result<f64, HalError> {
        self.check()?;
        Ok(self.state.lock().velocity)
    }
}

/// 仿真气缸
#[derive(Debug)]
pub struct SimPiston {
    name: &'static str,
    extended: AtomicBool,
    transitions: AtomicU32,
}

impl SimPiston {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            extended: AtomicBool::new(false),
            transitions: AtomicU32::new(0),
        }
    }

    /// 状态实际发生变化的次数
    pub fn transitions(&self) -> u32 {
        self.transitions.load(Ordering::Acquire)
    }
}

impl Piston for SimPiston {
    fn set_extended(&self, extended: bool) -> Result<(), HalError> {
        let prev = self.extended.swap(extended, Ordering::AcqRel);
        if prev != extended {
            self.transitions.fetch_add(1, Ordering::AcqRel);
            trace!("piston {} -> {}", self.name, extended);
        }
        Ok(())
    }

    fn is_extended(&self) -> bool {
        self.extended.load(Ordering::Acquire)
    }
}

/// 仿真旋转传感器
#[derive(Debug, Default)]
pub struct SimRotation {
    centidegrees: AtomicI32,
    failing: AtomicBool,
}

impl SimRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置角度（度），自动折算到 [0, 360)
    pub fn set_degrees(&self, degrees: f64) {
        let cd = (degrees.rem_euclid(360.0) * 100.0).round() as i32;
        self.centidegrees.store(cd % 36_000, Ordering::Release);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

impl RotationSensor for SimRotation {
    fn angle_centidegrees(&self) -> Result<i32, HalError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(HalError::Timeout);
        }
        Ok(self.centidegrees.load(Ordering::Acquire))
    }
}

/// 仿真距离传感器（初始为 9999 mm，即"无物体"）
#[derive(Debug)]
pub struct SimDistance {
    mm: AtomicU32,
    failing: AtomicBool,
}

impl Default for SimDistance {
    fn default() -> Self {
        Self {
            mm: AtomicU32::new(9999),
            failing: AtomicBool::new(false),
        }
    }
}

impl SimDistance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mm(&self, mm: u32) {
        self.mm.store(mm, Ordering::Release);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

impl DistanceSensor for SimDistance {
    fn distance_mm(&self) -> Result<u32, HalError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(HalError::Timeout);
        }
        Ok(self.mm.load(Ordering::Acquire))
    }
}

/// 仿真光学传感器
#[derive(Debug, Default)]
pub struct SimOptical {
    reading: Mutex<OpticalReading>,
    failing: AtomicBool,
    led_pwm: AtomicU32,
}

impl SimOptical {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reading(&self, reading: OpticalReading) {
        *self.reading.lock() = reading;
    }

    /// 放置一个物体（接近度 + 红蓝分量，亮度固定为 0.5）
    pub fn place(&self, proximity: f64, red: f64, blue: f64) {
        self.set_reading(OpticalReading {
            proximity,
            red,
            green: 0.0,
            blue,
            brightness: 0.5,
        });
    }

    /// 移走物体
    pub fn clear(&self) {
        self.set_reading(OpticalReading::default());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn led_pwm(&self) -> u8 {
        self.led_pwm.load(Ordering::Acquire) as u8
    }
}

impl OpticalSensor for SimOptical {
    fn reading(&self) -> Result<OpticalReading, HalError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(HalError::Timeout);
        }
        Ok(*self.reading.lock())
    }

    fn set_led_pwm(&self, percent: u8) -> Result<(), HalError> {
        self.led_pwm.store(percent.min(100) as u32, Ordering::Release);
        Ok(())
    }
}

/// 仿真手柄
#[derive(Debug, Default)]
pub struct SimGamepad {
    state: Mutex<ControllerState>,
    disconnected: AtomicBool,
}

impl SimGamepad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: ControllerState) {
        *self.state.lock() = state;
    }

    /// 就地修改当前状态
    pub fn update(&self, f: impl FnOnce(&mut ControllerState)) {
        f(&mut *self.state.lock());
    }

    /// 模拟无线连接断开
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::Release);
    }
}

impl Gamepad for SimGamepad {
    fn state(&self) -> Result<ControllerState, HalError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::Disconnected,
                0,
                "controller link lost",
            )));
        }
        Ok(*self.state.lock())
    }
}
