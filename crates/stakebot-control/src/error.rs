//! 控制层错误类型

use std::path::PathBuf;
use std::time::Duration;

use stakebot_driver::DriverError;
use thiserror::Error;

use crate::sequence::Condition;

/// 底盘运动控制错误
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Chassis calibration failed: {0}")]
    Calibration(String),
}

/// 自动程序执行错误
#[derive(Error, Debug)]
pub enum SequenceError {
    /// 等待条件超时（`OnTimeout::Abort`）
    #[error("Step {step}: timed out after {timeout:?} waiting for {condition:?}")]
    WaitTimeout {
        step: usize,
        condition: Condition,
        timeout: Duration,
    },

    /// 执行过程中观察到关闭标志
    #[error("Routine aborted at step {step}: robot is shutting down")]
    Aborted { step: usize },

    #[error("Step {step}: {reason}")]
    InvalidStep { step: usize, reason: String },

    #[error("Unknown routine: {0}")]
    UnknownRoutine(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl From<DriverError> for ConfigError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::InvalidConfig(msg) => ConfigError::Validation(msg),
            other => ConfigError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_error_display() {
        let err = SequenceError::WaitTimeout {
            step: 4,
            condition: Condition::ClampEngaged,
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Step 4: timed out after 1.5s waiting for ClampEngaged"
        );

        let err = SequenceError::Aborted { step: 2 };
        assert!(err.to_string().contains("step 2"));
    }

    #[test]
    fn test_driver_invalid_config_maps_to_validation() {
        let err: ConfigError = DriverError::InvalidConfig("arm.period_ms must be > 0".into()).into();
        match err {
            ConfigError::Validation(msg) => assert_eq!(msg, "arm.period_ms must be > 0"),
            other => panic!("unexpected: {}", other),
        }
    }
}
