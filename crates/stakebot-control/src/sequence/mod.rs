//! 自动程序序列
//!
//! 自动程序是一串类型化的 [`Step`]，由 [`Sequencer`] 逐条解释执行：
//! 底盘命令交给 [`MotionController`](crate::motion::MotionController)，
//! 意图写入共享上下文，等待步骤阻塞在状态通知上。
//!
//! # 示例
//!
//! ```
//! use stakebot_control::motion::MoveOptions;
//! use stakebot_control::sequence::{Condition, RoutineBuilder};
//! use stakebot_driver::TeamColor;
//!
//! let routine = RoutineBuilder::new("grab goal")
//!     .team(TeamColor::Red)
//!     .set_pose(0.0, 0.0, 0.0)
//!     .move_to_point(0.0, -20.0, 1000, MoveOptions::backwards())
//!     .clamp(true)
//!     .wait_for(Condition::ClampEngaged)
//!     .intake(true)
//!     .build();
//! assert_eq!(routine.steps.len(), 6);
//! ```

mod builder;
mod executor;
mod step;

pub use builder::RoutineBuilder;
pub use executor::{RunReport, Sequencer};
pub use step::{Condition, OnTimeout, Step};

use serde::{Deserialize, Serialize};

use crate::motion::MoveOptions;

/// 坐标上限（英寸）：原点可以设在场地任意位置，取两倍场地边长
pub const MAX_COORDINATE_IN: f64 = 288.0;
/// 航向上限（度）
pub const MAX_HEADING_DEG: f64 = 720.0;
/// 单条运动的超时上限（毫秒）
pub const MAX_MOTION_TIMEOUT_MS: u64 = 60_000;

/// 命名的自动程序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
}

impl Routine {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps,
        }
    }

    /// 场地另一侧的镜像程序
    pub fn mirrored(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: self.description.clone(),
            steps: self.steps.iter().map(Step::mirrored).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 底盘运动命令数
    pub fn motion_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_motion()).count()
    }

    /// 检查参数范围，返回第一个非法步骤的下标和原因
    pub fn validate(&self) -> Result<(), (usize, String)> {
        let power = |v: f64| v.is_finite() && (-1.0..=1.0).contains(&v);
        for (index, step) in self.steps.iter().enumerate() {
            let reason = match step {
                Step::SetIntakeRaw { primary, secondary } if !power(*primary) || !power(*secondary) => {
                    Some(format!("intake power out of range: ({}, {})", primary, secondary))
                },
                Step::DrivePulse { left, right, .. } | Step::DrivePower { left, right }
                    if !power(*left) || !power(*right) =>
                {
                    Some(format!("drive power out of range: ({}, {})", left, right))
                },
                Step::SetArm {
                    target_deg,
                    tolerance_deg,
                    step,
                    ..
                } => {
                    if !target_deg.is_finite() || !tolerance_deg.is_finite() || *tolerance_deg < 0.0 {
                        Some(format!("invalid arm target {} / {}", target_deg, tolerance_deg))
                    } else if matches!(step, Some(s) if *s > 2) {
                        Some(format!("arm step must be 0..=2, got {:?}", step))
                    } else {
                        None
                    }
                },
                Step::SetPoseFromDistance { divisor } if *divisor == 0.0 || !divisor.is_finite() => {
                    Some(format!("invalid distance divisor {}", divisor))
                },
                Step::WaitUntil { progress } if !progress.is_finite() => {
                    Some(format!("invalid progress {}", progress))
                },
                Step::SetPose { x, y, theta } => check_point(*x, *y).or_else(|| check_heading(*theta)),
                Step::MoveToPoint {
                    x,
                    y,
                    timeout_ms,
                    options,
                }
                | Step::TurnToPoint {
                    x,
                    y,
                    timeout_ms,
                    options,
                }
                | Step::SwingToPoint {
                    x,
                    y,
                    timeout_ms,
                    options,
                    ..
                } => check_point(*x, *y).or_else(|| check_motion(*timeout_ms, options)),
                Step::MoveToPose {
                    x,
                    y,
                    theta,
                    timeout_ms,
                    options,
                } => check_point(*x, *y)
                    .or_else(|| check_heading(*theta))
                    .or_else(|| check_motion(*timeout_ms, options)),
                Step::TurnToHeading {
                    theta,
                    timeout_ms,
                    options,
                }
                | Step::SwingToHeading {
                    theta,
                    timeout_ms,
                    options,
                    ..
                } => check_heading(*theta).or_else(|| check_motion(*timeout_ms, options)),
                _ => None,
            };
            if let Some(reason) = reason {
                return Err((index, reason));
            }
        }
        Ok(())
    }
}

fn check_point(x: f64, y: f64) -> Option<String> {
    let ok = |v: f64| v.is_finite() && v.abs() <= MAX_COORDINATE_IN;
    if ok(x) && ok(y) {
        None
    } else {
        Some(format!("point ({}, {}) outside the field", x, y))
    }
}

fn check_heading(theta: f64) -> Option<String> {
    if theta.is_finite() && theta.abs() <= MAX_HEADING_DEG {
        None
    } else {
        Some(format!("invalid heading {}", theta))
    }
}

fn check_motion(timeout_ms: u64, options: &MoveOptions) -> Option<String> {
    let speed = |v: f64| v.is_finite() && (0.0..=127.0).contains(&v);
    if timeout_ms > MAX_MOTION_TIMEOUT_MS {
        Some(format!("motion timeout {} ms exceeds {} ms", timeout_ms, MAX_MOTION_TIMEOUT_MS))
    } else if !speed(options.min_speed) || !speed(options.max_speed) {
        Some(format!(
            "motion speed out of range: min {} / max {}",
            options.min_speed, options.max_speed
        ))
    } else if !options.early_exit_range.is_finite() || options.early_exit_range < 0.0 {
        Some(format!("invalid early exit range {}", options.early_exit_range))
    } else if !options.lead.is_finite() {
        Some(format!("invalid lead {}", options.lead))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{DriveSide, MoveOptions};
    use stakebot_driver::TeamColor;

    #[test]
    fn test_mirror_routine() {
        let routine = RoutineBuilder::new("Red")
            .team(TeamColor::Red)
            .set_pose(0.0, 0.0, 0.0)
            .move_to_pose(-21.3, -49.33, 145.0, 900, MoveOptions::default())
            .swing_to_heading(135.0, DriveSide::Left, 1000, MoveOptions::default())
            .clamp(true)
            .build();
        let blue = routine.mirrored("Blue");
        assert_eq!(blue.name, "Blue");
        assert_eq!(blue.steps[0], Step::SetTeam { team: TeamColor::Blue });
        assert_eq!(
            blue.steps[2],
            Step::MoveToPose {
                x: 21.3,
                y: -49.33,
                theta: -145.0,
                timeout_ms: 900,
                options: MoveOptions::default(),
            }
        );
        assert!(matches!(
            blue.steps[3],
            Step::SwingToHeading { theta, side: DriveSide::Right, .. } if theta == -135.0
        ));
        assert_eq!(blue.steps[4], Step::SetClamp { engage: true });
        // 镜像两次回到原程序
        assert_eq!(blue.mirrored("Red"), routine);
    }

    #[test]
    fn test_json_script() {
        let json = r#"{
            "name": "smoke",
            "steps": [
                {"type": "set_team", "team": "blue"},
                {"type": "set_clamp", "engage": true},
                {"type": "wait_for", "condition": "clamp_engaged", "timeout_ms": 500, "on_timeout": "continue"},
                {"type": "set_intake", "enabled": true},
                {"type": "delay", "ms": 100}
            ]
        }"#;
        let routine = Routine::from_json(json).unwrap();
        assert_eq!(routine.name, "smoke");
        assert_eq!(routine.description, "");
        assert_eq!(routine.steps.len(), 5);
        assert_eq!(
            routine.steps[2],
            Step::WaitFor {
                condition: Condition::ClampEngaged,
                timeout_ms: Some(500),
                on_timeout: OnTimeout::Continue,
            }
        );

        let again = Routine::from_json(&routine.to_json_pretty().unwrap()).unwrap();
        assert_eq!(again, routine);
    }

    #[test]
    fn test_validate() {
        let ok = RoutineBuilder::new("ok").drive_pulse(0.5, -0.5, 100).build();
        assert!(ok.validate().is_ok());

        let bad = RoutineBuilder::new("bad")
            .delay(10)
            .intake_raw(0.0, 1.5)
            .build();
        let (index, reason) = bad.validate().unwrap_err();
        assert_eq!(index, 1);
        assert!(reason.contains("intake power"));

        let bad = RoutineBuilder::new("bad").pose_from_distance(0.0).build();
        assert_eq!(bad.validate().unwrap_err().0, 0);

        let bad = RoutineBuilder::new("bad")
            .step(Step::SetArm {
                target_deg: 10.0,
                tolerance_deg: 1.0,
                brake: None,
                step: Some(3),
            })
            .build();
        assert!(bad.validate().is_err());
    }

    /// 测试脚本里的运动坐标、航向、超时和速度越界被拒绝
    #[test]
    fn test_validate_motion_bounds() {
        let json = r#"{"name": "far", "steps": [
            {"type": "set_pose", "x": 0, "y": 0, "theta": 0},
            {"type": "move_to_point", "x": 1e30, "y": 0, "timeout_ms": 100}
        ]}"#;
        let (index, reason) = Routine::from_json(json).unwrap().validate().unwrap_err();
        assert_eq!(index, 1);
        assert!(reason.contains("outside the field"), "{}", reason);

        let bad = RoutineBuilder::new("bad")
            .turn_to_heading(f64::NAN, 500, MoveOptions::default())
            .build();
        assert!(bad.validate().unwrap_err().1.contains("heading"));

        let bad = RoutineBuilder::new("bad")
            .move_to_pose(10.0, 10.0, 90.0, MAX_MOTION_TIMEOUT_MS + 1, MoveOptions::default())
            .build();
        assert!(bad.validate().unwrap_err().1.contains("timeout"));

        let bad = RoutineBuilder::new("bad")
            .swing_to_point(10.0, 10.0, DriveSide::Left, 500, MoveOptions::default().max_speed(f64::INFINITY))
            .build();
        assert!(bad.validate().unwrap_err().1.contains("speed"));

        let bad = RoutineBuilder::new("bad").set_pose(-300.0, 0.0, 0.0).build();
        assert!(bad.validate().is_err());

        let ok = RoutineBuilder::new("ok")
            .set_pose(-MAX_COORDINATE_IN, MAX_COORDINATE_IN, -MAX_HEADING_DEG)
            .turn_to_heading(630.0, 1000, MoveOptions::default())
            .build();
        assert!(ok.validate().is_ok());
    }
}
