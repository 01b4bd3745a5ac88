//! 驱动层错误类型定义

use stakebot_hal::HalError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 设备错误
    #[error("Device error: {0}")]
    Hal(#[from] HalError),

    /// 请求通道已关闭（机械臂线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 控制循环线程启动失败
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// 底盘标定失败
    #[error("Calibration failed: {0}")]
    Calibration(String),

    /// 配置非法
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 无效输入（如非有限的目标角度）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 驱动已关闭
    #[error("Robot is shut down")]
    ShutDown,
}
