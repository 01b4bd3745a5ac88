//! 控制层模块
//!
//! 本模块在驱动层之上提供比赛逻辑，包括：
//! - 底盘运动控制接口（[`MotionController`]）及仿真底盘
//! - 自动程序 DSL（类型化步骤、Builder、执行器）
//! - 自动程序目录与选择器
//! - 操作手控制循环与挂杆触发
//! - TOML 配置
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。[`Competition`] 串起初始化、自动阶段和操作手阶段：
//!
//! ```no_run
//! use std::sync::Arc;
//! use stakebot_control::{Competition, RobotConfig, SimChassis};
//! use stakebot_driver::sim::SimRig;
//!
//! let rig = SimRig::new();
//! let mut competition =
//!     Competition::initialize(rig.hardware(), Arc::new(SimChassis::new()), RobotConfig::default())
//!         .unwrap();
//! competition.selector_mut().select("Red SAWP").unwrap();
//! let report = competition.autonomous().unwrap();
//! println!("{} steps in {:?}", report.steps_executed, report.elapsed);
//! ```

pub mod competition;
pub mod config;
mod error;
pub mod hang;
pub mod motion;
pub mod operator;
pub mod routines;
pub mod sequence;
pub mod sim_chassis;

// 重新导出常用类型
pub use competition::Competition;
pub use config::{HangConfig, OperatorConfig, RobotConfig, SequenceConfig};
pub use error::{ConfigError, MotionError, SequenceError};
pub use hang::HangTrigger;
pub use motion::{AngularDirection, DriveSide, MotionController, MoveOptions, Pose};
pub use operator::{ButtonEdges, OperatorControl};
pub use routines::{AutonSelector, RoutineEntry};
pub use sequence::{Condition, OnTimeout, Routine, RoutineBuilder, RunReport, Sequencer, Step};
pub use sim_chassis::{MotionRecord, SimChassis, SimChassisConfig};
