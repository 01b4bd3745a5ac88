//! 仿真底盘
//!
//! 按恒定线速度/角速度随时间推进位姿，用于自动程序的离线演练和测试。
//! 运动进度在查询时按墙钟时间计算，不需要后台线程。
//!
//! 开环驱动（[`MotionController::tank`]）只记录功率，不改变仿真位姿。

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::MotionError;
use crate::motion::{AngularDirection, DriveSide, MotionController, MoveOptions, Pose, wrap_degrees};

/// 单条运动的最长仿真时间
const MAX_MOTION_TIME: Duration = Duration::from_secs(3600);

/// 运动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    MoveToPoint,
    MoveToPose,
    TurnToHeading,
    TurnToPoint,
    SwingToHeading,
    SwingToPoint,
}

impl MotionKind {
    fn is_turn(self) -> bool {
        !matches!(self, MotionKind::MoveToPoint | MotionKind::MoveToPose)
    }
}

/// 底盘命令记录
#[derive(Debug, Clone, PartialEq)]
pub enum MotionRecord {
    SetPose(Pose),
    Motion {
        kind: MotionKind,
        target: Pose,
        timeout_ms: u64,
        forwards: bool,
    },
    Cancel,
    Tank { left: f64, right: f64 },
}

/// 仿真底盘参数
#[derive(Debug, Clone, Copy)]
pub struct SimChassisConfig {
    /// 满速直线速度（英寸/秒）
    pub linear_speed_ips: f64,
    /// 满速原地转向角速度（度/秒）
    pub turn_speed_dps: f64,
}

impl Default for SimChassisConfig {
    fn default() -> Self {
        Self {
            linear_speed_ips: 60.0,
            turn_speed_dps: 360.0,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveMotion {
    kind: MotionKind,
    start: Pose,
    end: Pose,
    /// 完成时的进度（英寸或度）
    total: f64,
    travel: Duration,
    timeout: Duration,
    started: Instant,
}

impl ActiveMotion {
    fn ends_at(&self) -> Instant {
        self.started + self.travel.min(self.timeout)
    }

    fn fraction_at(&self, now: Instant) -> f64 {
        if self.travel.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started).min(self.timeout);
        (elapsed.as_secs_f64() / self.travel.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn pose_at(&self, now: Instant) -> Pose {
        let f = self.fraction_at(now);
        Pose {
            x: self.start.x + (self.end.x - self.start.x) * f,
            y: self.start.y + (self.end.y - self.start.y) * f,
            theta: self.start.theta + (self.end.theta - self.start.theta) * f,
        }
    }

    fn progress_at(&self, now: Instant) -> f64 {
        self.total * self.fraction_at(now)
    }

    fn reached_at(&self, progress: f64) -> Instant {
        if self.total <= 0.0 {
            return self.started;
        }
        let f = (progress / self.total).clamp(0.0, 1.0);
        self.started + self.travel.mul_f64(f)
    }
}

#[derive(Debug, Default)]
struct ChassisState {
    pose: Pose,
    motion: Option<ActiveMotion>,
    drive: (f64, f64),
    log: Vec<MotionRecord>,
    calibrated: bool,
    fail_calibration: bool,
}

/// 仿真底盘
#[derive(Debug)]
pub struct SimChassis {
    config: SimChassisConfig,
    state: Mutex<ChassisState>,
    condvar: Condvar,
}

impl SimChassis {
    pub fn new() -> Self {
        Self::with_config(SimChassisConfig::default())
    }

    pub fn with_config(config: SimChassisConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ChassisState::default()),
            condvar: Condvar::new(),
        }
    }

    /// 下一次标定返回错误
    pub fn fail_calibration(&self) {
        self.state.lock().fail_calibration = true;
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.lock().calibrated
    }

    /// 最近一次开环功率（左, 右）
    pub fn drive_power(&self) -> (f64, f64) {
        self.state.lock().drive
    }

    /// 命令记录
    pub fn log(&self) -> Vec<MotionRecord> {
        self.state.lock().log.clone()
    }

    /// 已发出的运动命令数
    pub fn motion_count(&self) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| matches!(r, MotionRecord::Motion { .. }))
            .count()
    }

    /// 结束已到期的运动
    fn settle(&self, state: &mut ChassisState, now: Instant) {
        if let Some(motion) = &state.motion
            && now >= motion.ends_at()
        {
            state.pose = motion.pose_at(now);
            trace!("sim chassis {:?} finished at {:?}", motion.kind, state.pose);
            state.motion = None;
            self.condvar.notify_all();
        }
    }

    fn current_pose(state: &ChassisState, now: Instant) -> Pose {
        match &state.motion {
            Some(motion) => motion.pose_at(now),
            None => state.pose,
        }
    }

    fn scaled(&self, base: f64, options: &MoveOptions) -> f64 {
        let speed = options.max_speed.clamp(1.0, 127.0).max(options.min_speed.min(127.0));
        base * speed / 127.0
    }

    fn start(&self, kind: MotionKind, target: Pose, timeout_ms: u64, options: MoveOptions) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.settle(&mut state, now);

        let start = Self::current_pose(&state, now);
        if state.motion.take().is_some() {
            debug!("sim chassis: new {:?} supersedes active motion", kind);
            state.pose = start;
            self.condvar.notify_all();
        }

        let (end, total, rate) = if kind.is_turn() {
            let delta = match options.direction {
                AngularDirection::Auto => wrap_degrees(target.theta - start.theta),
                AngularDirection::Clockwise => (target.theta - start.theta).rem_euclid(360.0),
                AngularDirection::CounterClockwise => -(start.theta - target.theta).rem_euclid(360.0),
            };
            let total = (delta.abs() - options.early_exit_range.max(0.0)).max(0.0);
            let f = if delta.abs() > 0.0 { total / delta.abs() } else { 0.0 };
            let base = if matches!(kind, MotionKind::SwingToHeading | MotionKind::SwingToPoint) {
                self.config.turn_speed_dps / 2.0
            } else {
                self.config.turn_speed_dps
            };
            let end = Pose::new(start.x, start.y, start.theta + delta * f);
            (end, total, self.scaled(base, &options))
        } else {
            let distance = start.distance_to(target.x, target.y);
            let total = (distance - options.early_exit_range.max(0.0)).max(0.0);
            let f = if distance > 0.0 { total / distance } else { 0.0 };
            let theta = match kind {
                MotionKind::MoveToPose => target.theta,
                _ if distance > 0.0 => {
                    let heading = start.heading_to(target.x, target.y);
                    let heading = if options.forwards { heading } else { heading + 180.0 };
                    start.theta + wrap_degrees(heading - start.theta)
                },
                _ => start.theta,
            };
            let end = Pose::new(
                start.x + (target.x - start.x) * f,
                start.y + (target.y - start.y) * f,
                start.theta + (theta - start.theta) * f,
            );
            (end, total, self.scaled(self.config.linear_speed_ips, &options))
        };

        let timeout = Duration::from_millis(timeout_ms).min(MAX_MOTION_TIME);
        // 行程或速度异常（过大、NaN、零速）时按超时结束
        let travel = Duration::try_from_secs_f64(total / rate)
            .unwrap_or(timeout)
            .min(MAX_MOTION_TIME);
        state.log.push(MotionRecord::Motion {
            kind,
            target,
            timeout_ms,
            forwards: options.forwards,
        });
        state.motion = Some(ActiveMotion {
            kind,
            start,
            end,
            total,
            travel,
            timeout,
            started: now,
        });
    }

    fn turn_target(&self, x: f64, y: f64, forwards: bool) -> Pose {
        let pose = self.pose();
        let heading = pose.heading_to(x, y);
        Pose::new(x, y, if forwards { heading } else { heading + 180.0 })
    }
}

impl Default for SimChassis {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionController for SimChassis {
    fn calibrate(&self) -> Result<(), MotionError> {
        let mut state = self.state.lock();
        if state.fail_calibration {
            return Err(MotionError::Calibration("simulated IMU failure".into()));
        }
        state.calibrated = true;
        Ok(())
    }

    fn set_pose(&self, pose: Pose) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.settle(&mut state, now);
        // 运动中重置位姿：剩余行程相对新原点继续
        if let Some(motion) = state.motion.as_mut() {
            let current = motion.pose_at(now);
            let (dx, dy, dt) = (pose.x - current.x, pose.y - current.y, pose.theta - current.theta);
            for p in [&mut motion.start, &mut motion.end] {
                p.x += dx;
                p.y += dy;
                p.theta += dt;
            }
        }
        state.pose = pose;
        state.log.push(MotionRecord::SetPose(pose));
    }

    fn pose(&self) -> Pose {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.settle(&mut state, now);
        Self::current_pose(&state, now)
    }

    fn move_to_point(&self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions) {
        self.start(MotionKind::MoveToPoint, Pose::new(x, y, 0.0), timeout_ms, options);
    }

    fn move_to_pose(&self, x: f64, y: f64, theta: f64, timeout_ms: u64, options: MoveOptions) {
        self.start(MotionKind::MoveToPose, Pose::new(x, y, theta), timeout_ms, options);
    }

    fn turn_to_heading(&self, theta: f64, timeout_ms: u64, options: MoveOptions) {
        let pose = self.pose();
        self.start(
            MotionKind::TurnToHeading,
            Pose::new(pose.x, pose.y, theta),
            timeout_ms,
            options,
        );
    }

    fn turn_to_point(&self, x: f64, y: f64, timeout_ms: u64, options: MoveOptions) {
        let target = self.turn_target(x, y, options.forwards);
        self.start(MotionKind::TurnToPoint, target, timeout_ms, options);
    }

    fn swing_to_heading(&self, theta: f64, side: DriveSide, timeout_ms: u64, options: MoveOptions) {
        trace!("sim chassis swing on {:?}", side);
        let pose = self.pose();
        self.start(
            MotionKind::SwingToHeading,
            Pose::new(pose.x, pose.y, theta),
            timeout_ms,
            options,
        );
    }

    fn swing_to_point(
        &self,
        x: f64,
        y: f64,
        side: DriveSide,
        timeout_ms: u64,
        options: MoveOptions,
    ) {
        trace!("sim chassis swing on {:?}", side);
        let target = self.turn_target(x, y, options.forwards);
        self.start(MotionKind::SwingToPoint, target, timeout_ms, options);
    }

    fn wait_until_done(&self) {
        let mut state = self.state.lock();
        loop {
            self.settle(&mut state, Instant::now());
            let Some(motion) = &state.motion else {
                return;
            };
            let deadline = motion.ends_at();
            let _ = self.condvar.wait_until(&mut state, deadline);
        }
    }

    fn wait_until(&self, progress: f64) {
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            self.settle(&mut state, now);
            let Some(motion) = &state.motion else {
                return;
            };
            if motion.progress_at(now) + 1e-9 >= progress {
                return;
            }
            let wake_at = motion.reached_at(progress).min(motion.ends_at()).max(now)
                + Duration::from_millis(1);
            let _ = self.condvar.wait_until(&mut state, wake_at);
        }
    }

    fn cancel_motion(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.settle(&mut state, now);
        if let Some(motion) = state.motion.take() {
            state.pose = motion.pose_at(now);
            debug!("sim chassis: {:?} cancelled at {:?}", motion.kind, state.pose);
            self.condvar.notify_all();
        }
        state.log.push(MotionRecord::Cancel);
    }

    fn is_in_motion(&self) -> bool {
        let mut state = self.state.lock();
        self.settle(&mut state, Instant::now());
        state.motion.is_some()
    }

    fn motion_progress(&self) -> Option<f64> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.settle(&mut state, now);
        state.motion.as_ref().map(|motion| motion.progress_at(now))
    }

    fn tank(&self, left: f64, right: f64) {
        let mut state = self.state.lock();
        let power = (left.clamp(-1.0, 1.0), right.clamp(-1.0, 1.0));
        if state.drive != power {
            state.drive = power;
            state.log.push(MotionRecord::Tank {
                left: power.0,
                right: power.1,
            });
        }
    }
}
