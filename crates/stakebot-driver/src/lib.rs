//! 驱动层模块
//!
//! 本模块提供机器人的后台控制循环和共享状态，包括：
//! - 机械臂 PD 位置环（请求通道，后到的请求生效）
//! - 卡死检测（扭矩 + 转速，解卡脉冲）
//! - 进球通道颜色仲裁（显式优先级的模式枚举）
//! - 夹子控制（距离门控 + 稳定延时 + 松开去抖）
//! - 共享状态（原子单写者字段 + ArcSwap 快照 + 条件变量通知）
//!
//! # 使用场景
//!
//! 自动程序和操作手控制都通过 [`Robot`] 读写意图、读取观测状态。
//! 大多数用户应该使用 `stakebot-control` 提供的更高级接口。

pub mod arm;
mod builder;
pub mod clamp;
pub mod config;
mod error;
pub mod intake;
pub mod metrics;
pub mod mode;
pub mod pipeline;
mod robot;
pub mod sim;
pub mod stall;
pub mod state;

pub use arm::{ArmCommander, ArmPreset, ArmRequest, ArmTarget};
pub use builder::RobotBuilder;
pub use config::{ArmConfig, ClampConfig, DriverConfig, IntakeConfig, StallConfig, raw_power};
pub use error::DriverError;
pub use metrics::{LoopMetrics, MetricsSnapshot};
pub use mode::{ClampPolicy, IntakeMode, IntakeOverride, TeamColor};
pub use pipeline::{ControlLoop, run_loop, spawn_loop};
pub use robot::{Robot, RobotHardware};
pub use state::{ArmStatus, RobotContext, StateSignal};
