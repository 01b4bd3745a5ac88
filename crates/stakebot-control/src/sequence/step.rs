//! 自动程序步骤
//!
//! 每个步骤都是一条类型化指令，JSON 表示使用 `type` 标签：
//!
//! ```json
//! {"type": "move_to_point", "x": 0.0, "y": 5.0, "timeout_ms": 1000}
//! {"type": "wait_for", "condition": "clamp_engaged", "timeout_ms": 1500}
//! ```

use serde::{Deserialize, Serialize};
use stakebot_driver::TeamColor;
use stakebot_hal::BrakeMode;

use crate::motion::{DriveSide, MoveOptions};

/// 等待条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// 夹子已夹紧（观测值）
    ClampEngaged,
    /// 夹子已松开（观测值）
    ClampReleased,
    /// 环已停在机构上
    RingHeld,
    /// 进球通道卡死
    IntakeStalled,
    /// 机械臂到达最近一次 `SetArm` 的目标
    ArmSettled,
}

/// 等待超时后的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// 中止程序并返回错误
    #[default]
    Abort,
    /// 记录警告后继续
    Continue,
}

/// 自动程序步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    // ---- 底盘 ----
    SetPose {
        x: f64,
        y: f64,
        theta: f64,
    },
    MoveToPoint {
        x: f64,
        y: f64,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    MoveToPose {
        x: f64,
        y: f64,
        theta: f64,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    TurnToHeading {
        theta: f64,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    TurnToPoint {
        x: f64,
        y: f64,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    SwingToHeading {
        theta: f64,
        side: DriveSide,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    SwingToPoint {
        x: f64,
        y: f64,
        side: DriveSide,
        timeout_ms: u64,
        #[serde(default)]
        options: MoveOptions,
    },
    /// 阻塞到当前运动行进了 `progress`
    WaitUntil {
        progress: f64,
    },
    WaitUntilDone,
    CancelMotion,

    // ---- 意图 ----
    SetTeam {
        team: TeamColor,
    },
    SetClamp {
        engage: bool,
    },
    SetIntake {
        enabled: bool,
    },
    SetRingHold {
        active: bool,
    },
    /// 进入/退出分级模式（第一级交给脚本）
    SetStaged {
        active: bool,
    },
    /// 分级模式下两级电机的功率（-1.0 ~ 1.0）
    SetIntakeRaw {
        primary: f64,
        secondary: f64,
    },
    SetDoinker {
        extended: bool,
    },
    SetHang {
        extended: bool,
    },
    /// 直接设置机械臂目标（绕过预设循环）
    SetArm {
        target_deg: f64,
        tolerance_deg: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        brake: Option<BrakeMode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<u8>,
    },

    // ---- 同步与计时 ----
    WaitFor {
        condition: Condition,
        /// 缺省使用配置的默认超时
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default)]
        on_timeout: OnTimeout,
    },
    Delay {
        ms: u64,
    },
    /// 开环定时推车，结束后停车
    DrivePulse {
        left: f64,
        right: f64,
        ms: u64,
    },
    /// 开环功率（不自动停止）
    DrivePower {
        left: f64,
        right: f64,
    },
    /// 用场地墙距离重置位姿：`x = 距离(mm) / divisor`，y 和航向归零
    SetPoseFromDistance {
        divisor: f64,
    },
}

impl Step {
    /// 是否是底盘运动命令
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Step::MoveToPoint { .. }
                | Step::MoveToPose { .. }
                | Step::TurnToHeading { .. }
                | Step::TurnToPoint { .. }
                | Step::SwingToHeading { .. }
                | Step::SwingToPoint { .. }
        )
    }

    /// 镜像到场地另一侧：x 取反、航向取反、摆动侧互换、队伍颜色互换
    ///
    /// `SetPoseFromDistance` 通过取反除数让重置后的 x 也取反。
    pub fn mirrored(&self) -> Step {
        let flip = |options: &MoveOptions| MoveOptions {
            direction: options.direction.mirrored(),
            ..*options
        };
        match self {
            Step::SetPose { x, y, theta } => Step::SetPose {
                x: -x,
                y: *y,
                theta: -theta,
            },
            Step::MoveToPoint {
                x,
                y,
                timeout_ms,
                options,
            } => Step::MoveToPoint {
                x: -x,
                y: *y,
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::MoveToPose {
                x,
                y,
                theta,
                timeout_ms,
                options,
            } => Step::MoveToPose {
                x: -x,
                y: *y,
                theta: -theta,
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::TurnToHeading {
                theta,
                timeout_ms,
                options,
            } => Step::TurnToHeading {
                theta: -theta,
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::TurnToPoint {
                x,
                y,
                timeout_ms,
                options,
            } => Step::TurnToPoint {
                x: -x,
                y: *y,
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::SwingToHeading {
                theta,
                side,
                timeout_ms,
                options,
            } => Step::SwingToHeading {
                theta: -theta,
                side: side.opposite(),
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::SwingToPoint {
                x,
                y,
                side,
                timeout_ms,
                options,
            } => Step::SwingToPoint {
                x: -x,
                y: *y,
                side: side.opposite(),
                timeout_ms: *timeout_ms,
                options: flip(options),
            },
            Step::SetTeam { team } => Step::SetTeam {
                team: team.opposite(),
            },
            Step::DrivePulse { left, right, ms } => Step::DrivePulse {
                left: *right,
                right: *left,
                ms: *ms,
            },
            Step::DrivePower { left, right } => Step::DrivePower {
                left: *right,
                right: *left,
            },
            Step::SetPoseFromDistance { divisor } => Step::SetPoseFromDistance { divisor: -divisor },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::AngularDirection;
    use proptest::prelude::*;

    #[test]
    fn test_json_tagging() {
        let step = Step::MoveToPoint {
            x: 1.0,
            y: 2.0,
            timeout_ms: 1000,
            options: MoveOptions::backwards(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "move_to_point");
        assert_eq!(json["options"]["forwards"], false);

        let parsed: Step = serde_json::from_str(
            r#"{"type": "wait_for", "condition": "clamp_engaged"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            Step::WaitFor {
                condition: Condition::ClampEngaged,
                timeout_ms: None,
                on_timeout: OnTimeout::Abort,
            }
        );
    }

    /// 测试省略 options 时使用默认运动参数
    #[test]
    fn test_motion_options_default() {
        let parsed: Step =
            serde_json::from_str(r#"{"type": "turn_to_heading", "theta": 90, "timeout_ms": 500}"#)
                .unwrap();
        match parsed {
            Step::TurnToHeading { options, .. } => assert_eq!(options, MoveOptions::default()),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_set_arm_json() {
        let parsed: Step = serde_json::from_str(
            r#"{"type": "set_arm", "target_deg": 26, "tolerance_deg": 0.2, "brake": "hold"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            Step::SetArm {
                target_deg: 26.0,
                tolerance_deg: 0.2,
                brake: Some(BrakeMode::Hold),
                step: None,
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Step, _> = serde_json::from_str(r#"{"type": "teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_mirror_swing() {
        let step = Step::SwingToPoint {
            x: -47.77,
            y: 6.67,
            side: DriveSide::Left,
            timeout_ms: 1000,
            options: MoveOptions::default().direction(AngularDirection::Clockwise),
        };
        match step.mirrored() {
            Step::SwingToPoint { x, y, side, options, .. } => {
                assert_eq!(x, 47.77);
                assert_eq!(y, 6.67);
                assert_eq!(side, DriveSide::Right);
                assert_eq!(options.direction, AngularDirection::CounterClockwise);
            },
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_mirror_keeps_intents() {
        let step = Step::SetClamp { engage: true };
        assert_eq!(step.mirrored(), step);
        assert_eq!(
            Step::SetTeam { team: TeamColor::Red }.mirrored(),
            Step::SetTeam { team: TeamColor::Blue }
        );
    }

    #[test]
    fn test_is_motion() {
        assert!(Step::TurnToHeading {
            theta: 0.0,
            timeout_ms: 100,
            options: MoveOptions::default()
        }
        .is_motion());
        assert!(!Step::WaitUntilDone.is_motion());
        assert!(!Step::Delay { ms: 10 }.is_motion());
    }

    proptest! {
        /// 镜像两次回到原步骤，镜像一次只翻转 x 和航向
        #[test]
        fn prop_mirror_involution(
            x in -144.0f64..144.0,
            y in -144.0f64..144.0,
            theta in -720.0f64..720.0,
            left in -1.0f64..1.0,
            right in -1.0f64..1.0,
        ) {
            let pose = Step::MoveToPose { x, y, theta, timeout_ms: 1000, options: MoveOptions::default() };
            prop_assert_eq!(pose.mirrored().mirrored(), pose.clone());
            match pose.mirrored() {
                Step::MoveToPose { x: mx, y: my, theta: mt, .. } => {
                    prop_assert_eq!(mx, -x);
                    prop_assert_eq!(my, y);
                    prop_assert_eq!(mt, -theta);
                },
                other => prop_assert!(false, "unexpected step {:?}", other),
            }

            let pulse = Step::DrivePulse { left, right, ms: 100 };
            prop_assert_eq!(pulse.mirrored(), Step::DrivePulse { left: right, right: left, ms: 100 });
        }
    }
}
