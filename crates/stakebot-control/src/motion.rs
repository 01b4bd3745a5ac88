//! 底盘运动控制接口
//!
//! 路径跟踪和里程计由外部运动库负责，这里只定义自动程序和操作手循环依赖的最小接口。
//!
//! # 语义
//!
//! - 每个底盘同一时刻最多一条活动运动命令，新命令会替换（取消）旧命令
//! - 运动命令立即返回，用 [`MotionController::wait_until_done`] 或
//!   [`MotionController::wait_until`] 阻塞
//! - 所有超时都以毫秒为单位，超时后运动结束（不是错误）
//!
//! 坐标单位为英寸，航向为度（0° 朝 +y，顺时针为正）。

use serde::{Deserialize, Serialize};

use crate::error::MotionError;

/// 底盘位姿
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// 航向（度）
    pub theta: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((x - self.x).powi(2) + (y - self.y).powi(2)).sqrt()
    }

    /// 朝向某点所需的航向（度）
    pub fn heading_to(&self, x: f64, y: f64) -> f64 {
        (x - self.x).atan2(y - self.y).to_degrees()
    }
}

/// 摆动转弯时锁定的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveSide {
    Left,
    Right,
}

impl DriveSide {
    pub fn opposite(self) -> Self {
        match self {
            DriveSide::Left => DriveSide::Right,
            DriveSide::Right => DriveSide::Left,
        }
    }
}

/// 转向方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngularDirection {
    /// 走最短角度
    #[default]
    Auto,
    Clockwise,
    CounterClockwise,
}

impl AngularDirection {
    pub fn mirrored(self) -> Self {
        match self {
            AngularDirection::Auto => AngularDirection::Auto,
            AngularDirection::Clockwise => AngularDirection::CounterClockwise,
            AngularDirection::CounterClockwise => AngularDirection::Clockwise,
        }
    }
}

/// 运动参数
///
/// 速度单位与电机原始功率一致（0..=127）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveOptions {
    /// 车头朝前行驶（false 为倒车）
    pub forwards: bool,
    pub min_speed: f64,
    pub max_speed: f64,
    /// 进入该范围后提前结束（英寸或度，0 为不提前）
    pub early_exit_range: f64,
    /// 位姿运动的引导点比例
    pub lead: f64,
    pub direction: AngularDirection,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            forwards: true,
            min_speed: 0.0,
            max_speed: 127.0,
            early_exit_range: 0.0,
            lead: 0.6,
            direction: AngularDirection::Auto,
        }
    }
}

impl MoveOptions {
    /// 倒车
    pub fn backwards() -> Self {
        Self {
            forwards: false,
            ..Self::default()
        }
    }

    pub fn max_speed(mut self, speed: f64) -> Self {
        self.max_speed = speed;
        self
    }

    pub fn min_speed(mut self, speed: f64) -> Self {
        self.min_speed = speed;
        self
    }

    pub fn early_exit(mut self, range: f64) -> Self {
        self.early_exit_range = range;
        self
    }

    pub fn lead(mut self, lead: f64) -> Self {
        self.lead = lead;
        self
    }

    pub fn direction(mut self, direction: AngularDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// 运动控制器（外部路径跟踪库的抽象）
pub trait MotionController: Send + Sync {
    /// 标定（IMU 等），在控制循环启动前调用一次
    fn calibrate(&self) -> Result<(), MotionError>;

    fn set_pose(&self, pose: Pose);

    fn pose(&self) -> Pose;

    fn move_to_point(&self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions);

    fn move_to_pose(&self, x: f64, y: f64, theta: f64, timeout_ms: u64, options: MoveOptions);

    fn turn_to_heading(&self, theta: f64, timeout_ms: u64, options: MoveOptions);

    fn turn_to_point(&self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions);

    fn swing_to_heading(&self, theta: f64, side: DriveSide, timeout_ms: u64, options: MoveOptions);

    fn swing_to_point(
        &self,
        x: f64,
        y: f64,
        side: DriveSide,
        timeout_ms: u64,
        options: MoveOptions,
    );

    /// 阻塞到当前运动结束（没有运动时立即返回）
    fn wait_until_done(&self);

    /// 阻塞到当前运动行进了 `progress`（直线运动为英寸，转向为度）或运动结束
    fn wait_until(&self, progress: f64);

    /// 取消当前运动，底盘停在当前位置
    fn cancel_motion(&self);

    fn is_in_motion(&self) -> bool;

    /// 当前运动已行进的距离（英寸或度），没有运动时为 `None`
    fn motion_progress(&self) -> Option<f64>;

    /// 开环驱动：左右两侧功率（-1.0 ~ 1.0），不经过运动命令
    fn tank(&self, left: f64, right: f64);

    /// 操作手街机模式：油门 + 转向，乘以缩放系数后分配到左右两侧
    fn arcade(&self, throttle: f64, turn: f64, scale: f64) {
        let left = ((throttle + turn) * scale).clamp(-1.0, 1.0);
        let right = ((throttle - turn) * scale).clamp(-1.0, 1.0);
        self.tank(left, right);
    }
}

/// 把航向差折算到 (-180, 180]
pub fn wrap_degrees(deg: f64) -> f64 {
    let v = deg.rem_euclid(360.0);
    if v > 180.0 { v - 360.0 } else { v }
}
