//! 机器人配置
//!
//! 从 TOML 文件加载，所有字段都有默认值，部分配置文件也能正常解析：
//!
//! ```toml
//! [driver.clamp]
//! settle_ms = 300
//!
//! [operator]
//! loaded_drive_scale = 0.2
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stakebot_driver::DriverConfig;

use crate::error::ConfigError;

/// 挂杆时序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HangConfig {
    /// 机械臂在一档时，先收回再挂杆的等待（毫秒）
    pub tuck_ms: u64,
    /// 气缸伸出到机械臂抬起的等待（毫秒）
    pub piston_ms: u64,
}

impl Default for HangConfig {
    fn default() -> Self {
        Self {
            tuck_ms: 550,
            piston_ms: 200,
        }
    }
}

/// 操作手控制配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// 控制周期（毫秒）
    pub tick_ms: u64,
    /// 空载时的底盘缩放
    pub drive_scale: f64,
    /// 夹着桩时的底盘缩放
    pub loaded_drive_scale: f64,
    /// 进入操作手阶段时机械臂的目标与容差
    pub arm_rest_deg: f64,
    pub arm_rest_tolerance_deg: f64,
    pub hang: HangConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            drive_scale: 0.45,
            loaded_drive_scale: 0.22,
            arm_rest_deg: 0.0,
            arm_rest_tolerance_deg: 30.0,
            hang: HangConfig::default(),
        }
    }
}

impl OperatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// 自动程序执行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// `WaitFor` 未指定超时时使用
    pub default_wait_timeout_ms: u64,
    /// 等待中没有通知时的重新检查间隔
    pub poll_fallback_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout_ms: 3000,
            poll_fallback_ms: 20,
        }
    }
}

impl SequenceConfig {
    pub fn poll_fallback(&self) -> Duration {
        Duration::from_millis(self.poll_fallback_ms)
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub driver: DriverConfig,
    pub operator: OperatorConfig,
    pub sequence: SequenceConfig,
}

impl RobotConfig {
    /// 读取并校验配置文件
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver.validate()?;

        let op = &self.operator;
        if op.tick_ms == 0 {
            return Err(ConfigError::Validation("operator.tick_ms must be > 0".into()));
        }
        for (name, value) in [
            ("operator.drive_scale", op.drive_scale),
            ("operator.loaded_drive_scale", op.loaded_drive_scale),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if op.loaded_drive_scale > op.drive_scale {
            return Err(ConfigError::Validation(format!(
                "operator.loaded_drive_scale ({}) must not exceed drive_scale ({})",
                op.loaded_drive_scale, op.drive_scale
            )));
        }
        if !op.arm_rest_deg.is_finite() || !op.arm_rest_tolerance_deg.is_finite() || op.arm_rest_tolerance_deg < 0.0 {
            return Err(ConfigError::Validation("operator arm rest target is invalid".into()));
        }

        if self.sequence.default_wait_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "sequence.default_wait_timeout_ms must be > 0".into(),
            ));
        }
        if self.sequence.poll_fallback_ms == 0 {
            return Err(ConfigError::Validation("sequence.poll_fallback_ms must be > 0".into()));
        }
        Ok(())
    }
}
