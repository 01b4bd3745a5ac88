//! 自动程序目录
//!
//! 比赛中可选的自动程序。每个条目都能无参数构建出一个 [`Routine`]。
//!
//! 路点单位为英寸、航向为度，速度为电机原始功率（0..=127）。
//! 所有等待都是有界的：夹桩、卡死、持环等待超时后记录警告并继续，
//! 避免一次漏检让整段自动程序卡住。

use stakebot_driver::{TeamColor, raw_power};
use stakebot_hal::BrakeMode;

use crate::error::SequenceError;
use crate::motion::{AngularDirection, DriveSide, MoveOptions};
use crate::sequence::{Condition, Routine, RoutineBuilder};

const CLAMP_WAIT_MS: u64 = 2000;
const STALL_WAIT_MS: u64 = 3000;
const RING_WAIT_MS: u64 = 2000;

fn fwd() -> MoveOptions {
    MoveOptions::default()
}

fn back() -> MoveOptions {
    MoveOptions::backwards()
}

/// 开环推车功率（原始值 -127..=127）
fn raw(value: i32) -> f64 {
    raw_power(value)
}

trait RoutineBuilderExt {
    fn wait_clamp(self) -> Self;
    fn wait_stall(self) -> Self;
    fn wait_ring(self) -> Self;
}

impl RoutineBuilderExt for RoutineBuilder {
    fn wait_clamp(self) -> Self {
        self.wait_for_or_continue(Condition::ClampEngaged, CLAMP_WAIT_MS)
    }

    fn wait_stall(self) -> Self {
        self.wait_for_or_continue(Condition::IntakeStalled, STALL_WAIT_MS)
    }

    fn wait_ring(self) -> Self {
        self.wait_for_or_continue(Condition::RingHeld, RING_WAIT_MS)
    }
}

/// 目录条目
pub struct RoutineEntry {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Routine,
}

impl RoutineEntry {
    pub fn build(&self) -> Routine {
        let mut routine = (self.build)();
        routine.name = self.name.to_string();
        routine.description = self.description.to_string();
        routine
    }
}

static CATALOG: [RoutineEntry; 8] = [
    RoutineEntry {
        name: "Red SAWP",
        description: "Solo win point from the red side: alliance stake, two goals, ladder touch",
        build: red_sawp,
    },
    RoutineEntry {
        name: "Blue SAWP",
        description: "Solo win point from the blue side",
        build: blue_sawp,
    },
    RoutineEntry {
        name: "Red Goal",
        description: "Red goal-side rush with doinker sweep",
        build: red_goal,
    },
    RoutineEntry {
        name: "Blue Goal",
        description: "Blue goal-side rush with doinker sweep",
        build: blue_goal,
    },
    RoutineEntry {
        name: "Red Ring",
        description: "Red ring-side: alliance stake, ring stack, corner",
        build: red_ring,
    },
    RoutineEntry {
        name: "Blue Ring",
        description: "Blue ring-side, mirrored from Red Ring",
        build: blue_ring,
    },
    RoutineEntry {
        name: "Skills Auto",
        description: "One-minute skills run: four goals, wall stakes, hang",
        build: skills,
    },
    RoutineEntry {
        name: "Test",
        description: "Clamp-and-intake smoke routine",
        build: test,
    },
];

/// 全部条目（按选择器顺序）
pub fn catalog() -> &'static [RoutineEntry] {
    &CATALOG
}

/// 按名称查找（不区分大小写）
pub fn find(name: &str) -> Option<&'static RoutineEntry> {
    CATALOG.iter().find(|entry| entry.name.eq_ignore_ascii_case(name))
}

/// 按名称构建
pub fn build(name: &str) -> Result<Routine, SequenceError> {
    find(name)
        .map(RoutineEntry::build)
        .ok_or_else(|| SequenceError::UnknownRoutine(name.to_string()))
}

/// 自动程序选择器
#[derive(Debug, Clone, Default)]
pub struct AutonSelector {
    selected: usize,
}

impl AutonSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, name: &str) -> Result<(), SequenceError> {
        let index = CATALOG
            .iter()
            .position(|entry| entry.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SequenceError::UnknownRoutine(name.to_string()))?;
        self.selected = index;
        Ok(())
    }

    pub fn next(&mut self) {
        self.selected = (self.selected + 1) % CATALOG.len();
    }

    pub fn previous(&mut self) {
        self.selected = (self.selected + CATALOG.len() - 1) % CATALOG.len();
    }

    pub fn selected(&self) -> &'static RoutineEntry {
        &CATALOG[self.selected]
    }

    pub fn routine(&self) -> Routine {
        self.selected().build()
    }
}

/// 开场：机械臂放上联盟桩，退回
fn alliance_stake_opening(builder: RoutineBuilder, back_min_speed: f64) -> RoutineBuilder {
    builder
        .set_pose(0.0, 0.0, 0.0)
        .move_to_point(0.0, 5.0, 1000, fwd())
        .arm(220.0, 5.0)
        .delay(350)
        .move_to_point(0.0, -3.0, 1000, back().min_speed(back_min_speed).early_exit(3.0))
}

fn red_sawp() -> Routine {
    let b = RoutineBuilder::new("Red SAWP").team(TeamColor::Red);
    alliance_stake_opening(b, 30.0)
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(110.0))
        .wait_until(9.0)
        .cancel()
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(60.0).min_speed(30.0))
        .clamp(true)
        .arm(0.0, 30.0)
        .wait_clamp()
        .delay(50)
        .cancel()
        .turn_to_point(-4.26, -42.55, 690, fwd().min_speed(50.0).early_exit(3.0))
        .wait_done()
        .intake(true)
        .move_to_point(-4.26, -42.55, 1000, fwd().min_speed(40.0).early_exit(3.0))
        .move_to_point(-5.0, -41.0, 1000, back().min_speed(40.0).early_exit(3.0))
        .swing_to_heading(30.0, DriveSide::Left, 1000, fwd().min_speed(70.0).early_exit(8.0))
        .move_to_pose(2.15, -13.0, -30.0, 1000, fwd().min_speed(50.0).early_exit(5.0))
        .move_to_point(-30.0, 18.27, 2000, fwd().max_speed(80.0))
        .wait_until(13.0)
        .clamp(false)
        .ring_hold(true)
        .swing_to_point(-47.77, 6.67, DriveSide::Left, 1000, back().min_speed(30.0).early_exit(8.0))
        .wait_done()
        .clamp(true)
        .staged(true)
        .intake_raw(0.0, 1.0)
        .move_to_point(-57.76, 6.5, 1000, back().max_speed(40.0))
        .wait_clamp()
        .cancel()
        .delay(90)
        .staged(false)
        .ring_hold(false)
        .swing_to_point(-67.13, 20.95, DriveSide::Left, 1000, fwd().min_speed(50.0).early_exit(9.0))
        .wait_done()
        .intake(true)
        .move_to_point(-67.75, 24.2, 1000, fwd())
        .wait_done()
        .delay(200)
        .swing_to_point(
            -60.3,
            5.37,
            DriveSide::Right,
            1000,
            fwd()
                .direction(AngularDirection::CounterClockwise)
                .min_speed(40.0)
                .early_exit(9.0),
        )
        .move_to_point(-60.3, 5.37, 1000, fwd().early_exit(4.0))
        .wait_until(5.0)
        .arm(210.0, 90.0)
        .build()
}

fn blue_sawp() -> Routine {
    let b = RoutineBuilder::new("Blue SAWP").team(TeamColor::Blue);
    alliance_stake_opening(b, 30.0)
        .move_to_point(16.7, -32.9, 2000, back().max_speed(100.0))
        .wait_until(9.0)
        .cancel()
        .move_to_point(16.7, -32.9, 2000, back().max_speed(40.0).min_speed(5.0))
        .clamp(true)
        .wait_clamp()
        .arm(0.0, 30.0)
        .delay(120)
        .cancel()
        .turn_to_point(4.26, -42.55, 690, fwd().min_speed(50.0).early_exit(3.0))
        .wait_done()
        .intake(true)
        .move_to_point(4.26, -42.55, 1000, fwd().min_speed(40.0).early_exit(3.0))
        .swing_to_heading(-32.0, DriveSide::Right, 1000, fwd().min_speed(70.0).early_exit(8.0))
        .move_to_pose(-0.4, -11.84, 45.24, 1000, fwd().min_speed(70.0).early_exit(8.0))
        .move_to_point(29.6, 18.0, 2000, fwd().max_speed(80.0))
        .wait_until(8.0)
        .clamp(false)
        .ring_hold(true)
        .wait_ring()
        .staged(true)
        .intake_raw(0.0, 1.0)
        .swing_to_point(56.355, 7.8, DriveSide::Right, 1000, back().min_speed(30.0).early_exit(8.0))
        .wait_done()
        .clamp(true)
        .move_to_point(56.355, 7.8, 1000, back().max_speed(40.0))
        .wait_clamp()
        .cancel()
        .delay(100)
        .staged(false)
        .ring_hold(false)
        .swing_to_point(72.1, 20.35, DriveSide::Right, 1000, fwd().min_speed(50.0).early_exit(9.0))
        .wait_done()
        .intake(true)
        .move_to_point(72.1, 20.35, 1000, fwd())
        .wait_done()
        .delay(500)
        .swing_to_point(
            60.3,
            5.37,
            DriveSide::Left,
            1000,
            fwd()
                .direction(AngularDirection::Clockwise)
                .min_speed(40.0)
                .early_exit(9.0),
        )
        .move_to_point(60.3, 5.37, 1000, fwd().early_exit(4.0))
        .wait_until(6.0)
        .arm(210.0, 90.0)
        .build()
}

fn red_ring() -> Routine {
    let b = RoutineBuilder::new("Red Ring").team(TeamColor::Red);
    alliance_stake_opening(b, 30.0)
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(110.0))
        .wait_until(9.0)
        .cancel()
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(50.0).min_speed(30.0))
        .clamp(true)
        .wait_clamp()
        .delay(50)
        .arm(0.0, 30.0)
        .cancel()
        .turn_to_heading(195.0, 1000, fwd())
        .move_to_pose(
            -21.3,
            -49.33,
            145.0,
            900,
            fwd().lead(0.2).max_speed(50.0).min_speed(32.0).early_exit(9.0),
        )
        .swing_to_heading(135.0, DriveSide::Left, 1000, fwd().min_speed(48.0).early_exit(6.0))
        .wait_done()
        .intake(true)
        .move_to_point(-10.5, -61.55, 1000, fwd())
        .wait_done()
        .delay(700)
        .move_to_pose(-18.66, -28.0, 200.0, 1000, back().lead(0.3))
        .turn_to_point(-3.1, -45.6, 800, fwd().min_speed(20.0).early_exit(8.0))
        .move_to_point(-3.1, -45.6, 1400, fwd().min_speed(28.0).early_exit(6.0))
        .turn_to_point(29.76, -33.23, 1000, fwd())
        .wait_done()
        .doinker(true)
        .move_to_point(29.76, -33.23, 1000, fwd())
        .turn_to_heading(-24.0, 600, fwd().min_speed(100.0).early_exit(5.0))
        .swing_to_heading(-40.0, DriveSide::Left, 500, fwd())
        .wait_done()
        .intake(false)
        .staged(true)
        .intake_raw(0.0, 1.0)
        .move_to_pose(9.1, 0.26, -45.0, 2000, fwd().lead(0.15).max_speed(50.0))
        .wait_done()
        .drive_power(raw(60), raw(70))
        .delay(350)
        .intake_raw(1.0, raw(27))
        .build()
}

fn blue_ring() -> Routine {
    red_ring().mirrored("Blue Ring")
}

fn red_goal() -> Routine {
    let b = RoutineBuilder::new("Red Goal").team(TeamColor::Red);
    alliance_stake_opening(b, 60.0)
        .move_to_point(16.7, -32.9, 2000, back().max_speed(70.0))
        .wait_until(9.0)
        .cancel()
        .move_to_point(16.7, -32.9, 2000, back().max_speed(60.0).min_speed(30.0))
        .clamp(true)
        .wait_clamp()
        .arm(0.0, 30.0)
        .delay(120)
        .cancel()
        .move_to_pose(-26.85, -20.7, -117.0, 1000, fwd().lead(0.4).min_speed(30.0))
        .wait_done()
        .doinker(true)
        .move_to_point(-35.26, -24.64, 2000, fwd().max_speed(60.0))
        .turn_to_heading(-210.0, 2000, fwd().min_speed(120.0))
        .wait_done()
        .intake(true)
        .move_to_point(-26.5, -36.5, 1000, fwd())
        .move_to_point(-30.5, -30.79, 1000, back())
        .wait_until(2.0)
        .doinker(false)
        .turn_to_point(-5.28, -45.34, 1000, fwd())
        .wait_done()
        .arm_brake(26.0, 0.2, BrakeMode::Hold)
        .move_to_point(-5.28, -45.34, 1000, fwd())
        .wait_until(4.0)
        .clamp(false)
        .wait_stall()
        .intake(false)
        .wait_done()
        .doinker(true)
        .turn_to_heading(-171.0, 1000, fwd().min_speed(40.0).early_exit(10.0))
        .wait_done()
        .doinker(false)
        .turn_to_point(-3.41, -64.1, 1000, fwd())
        .move_to_point(-3.41, -64.1, 1000, fwd().max_speed(50.0))
        .wait_done()
        .arm_brake(140.0, 20.0, BrakeMode::Coast)
        .build()
}

fn blue_goal() -> Routine {
    let b = RoutineBuilder::new("Blue Goal").team(TeamColor::Blue).delay(1000);
    alliance_stake_opening(b, 60.0)
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(70.0))
        .wait_until(9.0)
        .arm(0.0, 20.0)
        .cancel()
        .move_to_point(-16.7, -32.9, 2000, back().max_speed(60.0).min_speed(30.0))
        .clamp(true)
        .wait_clamp()
        .delay(50)
        .cancel()
        .swing_to_point(1.0, -23.3, DriveSide::Right, 1000, fwd().min_speed(40.0).early_exit(4.0))
        .wait_done()
        .doinker(true)
        .move_to_point(1.0, -23.3, 1000, fwd().min_speed(50.0).early_exit(4.0))
        .move_to_point(31.1, -26.6, 1000, fwd().max_speed(80.0).min_speed(30.0).early_exit(9.0))
        .swing_to_heading(50.5, DriveSide::Left, 500, fwd().min_speed(80.0).early_exit(8.0))
        .swing_to_heading(12.5, DriveSide::Right, 1000, fwd().min_speed(50.0).early_exit(8.0))
        .swing_to_heading(-45.0, DriveSide::Left, 1000, fwd().min_speed(50.0).early_exit(8.0))
        .wait_done()
        .intake(true)
        .move_to_point(19.6, -20.7, 4000, fwd().max_speed(70.0))
        .wait_until(1.0)
        .doinker(false)
        .wait_done()
        .delay(1250)
        .move_to_point(27.7, -27.1, 1000, back().min_speed(40.0).early_exit(1.0))
        .move_to_pose(-2.76, -44.25, -185.0, 3000, fwd().lead(0.2).min_speed(50.0).early_exit(8.0))
        .wait_until(10.0)
        .clamp(false)
        .arm_brake(26.0, 0.2, BrakeMode::Hold)
        .move_to_point(-2.2, -66.12, 1000, fwd())
        .wait_stall()
        .intake(false)
        .staged(true)
        .intake_raw(0.0, raw(120))
        .turn_to_heading(-180.0, 1000, fwd())
        .wait_until(2.0)
        .arm_brake(150.0, 20.0, BrakeMode::Coast)
        .build()
}

fn skills() -> Routine {
    RoutineBuilder::new("Skills Auto")
        .team(TeamColor::Red)
        .set_pose(0.0, 0.0, 0.0)
        .arm(220.0, 5.0)
        .delay(400)
        // 第一个桩
        .move_to_point(0.0, -9.0, 700, back())
        .turn_to_point(18.8, -6.7, 500, back())
        .wait_done()
        .delay(50)
        .clamp(true)
        .move_to_point(18.8, -6.7, 1000, back().max_speed(70.0).min_speed(30.0))
        .wait_clamp()
        .cancel()
        .arm(0.0, 40.0)
        .turn_to_point(21.5, -25.37, 700, fwd())
        .wait_done()
        .intake(true)
        .move_to_pose(21.5, -25.37, -218.0, 1000, fwd().lead(0.25))
        .move_to_point(31.4, -39.14, 1000, fwd().min_speed(40.0).early_exit(5.0))
        .swing_to_point(45.17, -73.9, DriveSide::Right, 600, fwd().min_speed(40.0))
        .wait_done()
        .arm_brake(26.0, 0.2, BrakeMode::Hold)
        .move_to_point(45.17, -73.9, 1400, fwd())
        .wait_stall()
        .intake(false)
        .arm(60.0, 0.2)
        .move_to_pose(42.6, -53.5, -194.0, 1000, back().lead(0.2))
        .turn_to_heading(-271.0, 700, fwd())
        .wait_done()
        .intake(true)
        .move_to_point(59.83, -53.65, 1000, fwd().min_speed(50.0))
        .wait_done()
        // 墙桩计分，计分后自动复位
        .arm_step(220.0, 30.0, Some(BrakeMode::Coast), 2)
        .delay(350)
        .drive_pulse(raw(-40), raw(-40), 500)
        .turn_to_point(47.0, 5.86, 1000, fwd())
        .move_to_point(47.0, 5.86, 1000, fwd().max_speed(60.0).min_speed(20.0).early_exit(9.0))
        .move_to_point(46.74, 7.38, 1000, fwd().min_speed(30.0))
        .wait_done()
        .delay(100)
        .pose_from_distance(100.0)
        .move_to_pose(-7.73, -13.5, 92.5, 1200, back().lead(0.2))
        .move_to_point(10.73, -13.54, 1000, fwd())
        .swing_to_heading(242.0, DriveSide::Left, 1000, fwd().min_speed(20.0))
        .wait_done()
        .intake(false)
        .drive_pulse(raw(-70), raw(-70), 400)
        .clamp(false)
        .delay(80)
        // 第二个桩
        .move_to_pose(-31.1, -11.877, 272.5, 1300, fwd().lead(0.25).max_speed(60.0))
        .wait_done()
        .delay(300)
        .turn_to_point(-60.55, -17.2, 1000, back())
        .wait_done()
        .clamp(true)
        .move_to_point(-68.3, -14.2, 1000, back().max_speed(60.0))
        .wait_clamp()
        .cancel()
        .turn_to_point(-64.63, -37.1, 700, fwd())
        .wait_done()
        .intake(true)
        .move_to_point(-64.63, -37.1, 1000, fwd())
        .turn_to_heading(577.0, 700, fwd())
        .move_to_pose(-84.67, -90.6, 190.0, 2000, fwd().lead(0.2))
        .wait_until(13.0)
        .arm_brake(26.0, 0.2, BrakeMode::Hold)
        .delay(1000)
        .wait_stall()
        .intake(false)
        .arm(60.0, 0.2)
        .move_to_pose(-83.0, -62.6, 210.0, 1200, back().lead(0.25))
        .turn_to_point(-99.0, -64.8, 700, fwd())
        .wait_done()
        .intake(true)
        .move_to_point(-99.0, -64.8, 1000, fwd().min_speed(20.0))
        .wait_done()
        .arm_step(210.0, 40.0, Some(BrakeMode::Coast), 2)
        .delay(350)
        .drive_pulse(raw(-40), raw(-40), 600)
        .turn_to_point(-87.0, -0.88, 700, fwd())
        .move_to_point(-87.0, -0.88, 2000, fwd().max_speed(50.0))
        .move_to_point(-87.0, -19.0, 1000, back().min_speed(20.0))
        .turn_to_heading(630.0, 1000, fwd())
        .wait_done()
        .clamp(true)
        .wait_clamp()
        .delay(100)
        .drive_pulse(raw(80), raw(80), 1000)
        .pose_from_distance(25.4)
        .delay(50)
        .swing_to_heading(-135.0, DriveSide::Right, 1000, fwd().min_speed(20.0))
        .wait_done()
        // 桩放进角落
        .drive_power(raw(-50), raw(-50))
        .delay(300)
        .clamp(false)
        .drive_pulse(raw(50), raw(50), 300)
        .turn_to_heading(-137.0, 1000, fwd().min_speed(40.0))
        .wait_done()
        .intake(false)
        .move_to_point(-52.5, -96.7, 5000, fwd().max_speed(100.0))
        .turn_to_point(-77.6, -90.1, 1000, back())
        .wait_done()
        // 第三个桩，持环
        .ring_hold(true)
        .intake(true)
        .clamp(true)
        .move_to_point(-77.6, -90.1, 1200, back().max_speed(60.0).min_speed(9.0))
        .wait_clamp()
        .cancel()
        .turn_to_point(-80.25, -109.67, 1000, fwd())
        .wait_done()
        .staged(true)
        .intake_raw(0.0, 1.0)
        .doinker(true)
        .move_to_point(-80.25, -109.67, 1000, fwd())
        .wait_done()
        .move_to_pose(-83.46, -119.3, -180.0, 1000, fwd().lead(0.2))
        .turn_to_heading(-260.0, 1400, fwd().min_speed(100.0).early_exit(10.0))
        .turn_to_heading(-320.0, 1000, fwd())
        .wait_done()
        .clamp(false)
        .drive_power(raw(-50), raw(-50))
        .delay(300)
        .drive_pulse(raw(50), raw(50), 500)
        .turn_to_point(-81.44, -103.5, 1000, back())
        .wait_done()
        .doinker(false)
        .clamp(true)
        .move_to_point(-81.44, -103.5, 1500, back())
        .wait_done()
        .delay(200)
        .turn_to_point(-68.45, -62.1, 700, back())
        .wait_done()
        .arm_brake(26.0, 0.2, BrakeMode::Hold)
        .move_to_point(-68.45, -62.1, 1500, back().max_speed(50.0))
        .turn_to_point(-80.76, -65.2, 700, fwd())
        .wait_done()
        .ring_hold(false)
        .staged(false)
        .intake(true)
        .wait_stall()
        .intake(false)
        // 联盟墙桩
        .drive_pulse(raw(100), raw(100), 400)
        .delay(100)
        .set_pose(0.0, 0.0, 0.0)
        .move_to_point(0.0, -7.4, 800, back().max_speed(30.0))
        .wait_done()
        .arm_brake(220.0, 10.0, BrakeMode::Coast)
        .delay(100)
        .intake(true)
        .delay(350)
        .move_to_point(0.0, -16.0, 800, back().max_speed(30.0))
        .turn_to_point(23.865, -6.147, 1000, fwd())
        .wait_done()
        .arm(0.0, 30.0)
        .clamp(false)
        // 挂杆
        .drive_pulse(raw(120), raw(120), 1500)
        .turn_to_heading(45.0, 1000, fwd())
        .wait_done()
        .drive_power(raw(-60), raw(-60))
        .hang(true)
        .delay(200)
        .arm_brake(41.0, 1.0, BrakeMode::Hold)
        .delay(1600)
        .drive_pulse(raw(50), raw(50), 120)
        .build()
}

fn test() -> Routine {
    RoutineBuilder::new("Test")
        .team(TeamColor::Red)
        .clamp(true)
        .wait_for(Condition::ClampEngaged)
        .intake(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Step;

    #[test]
    fn test_catalog_names() {
        let names: Vec<_> = catalog().iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec![
                "Red SAWP",
                "Blue SAWP",
                "Red Goal",
                "Blue Goal",
                "Red Ring",
                "Blue Ring",
                "Skills Auto",
                "Test"
            ]
        );
    }

    /// 测试所有程序参数合法，且以设置队伍颜色开头
    #[test]
    fn test_all_routines_valid() {
        for entry in catalog() {
            let routine = entry.build();
            assert_eq!(routine.name, entry.name);
            assert!(routine.validate().is_ok(), "{} invalid: {:?}", entry.name, routine.validate());

            let expected = if entry.name.starts_with("Blue") {
                TeamColor::Blue
            } else {
                TeamColor::Red
            };
            assert_eq!(routine.steps[0], Step::SetTeam { team: expected }, "{}", entry.name);
        }
    }

    #[test]
    fn test_blue_ring_mirrors_red_ring() {
        let red = build("Red Ring").unwrap();
        let blue = build("Blue Ring").unwrap();
        assert_eq!(red.steps.len(), blue.steps.len());
        assert_eq!(blue.steps, red.mirrored("Blue Ring").steps);
        assert!(matches!(
            blue.steps.iter().find(|s| matches!(s, Step::TurnToHeading { .. })),
            Some(Step::TurnToHeading { theta, .. }) if *theta == -195.0
        ));
    }

    /// 测试"运动 - 进度检查点 - 取消 - 再运动"的写法
    #[test]
    fn test_checkpoint_then_replace() {
        let routine = build("Red SAWP").unwrap();
        let index = routine
            .steps
            .iter()
            .position(|s| *s == Step::WaitUntil { progress: 9.0 })
            .unwrap();
        assert_eq!(routine.steps[index + 1], Step::CancelMotion);
        assert!(matches!(
            routine.steps[index + 2],
            Step::MoveToPoint { x, y, .. } if x == -16.7 && y == -32.9
        ));
    }

    #[test]
    fn test_skills_resets_pose_from_wall() {
        let routine = build("skills auto").unwrap();
        let divisors: Vec<_> = routine
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::SetPoseFromDistance { divisor } => Some(*divisor),
                _ => None,
            })
            .collect();
        assert_eq!(divisors, vec![100.0, 25.4]);
        assert!(routine.steps.contains(&Step::SetHang { extended: true }));
    }

    #[test]
    fn test_unknown_routine() {
        assert!(matches!(build("Purple"), Err(SequenceError::UnknownRoutine(_))));
        assert!(find("red sawp").is_some());
    }

    #[test]
    fn test_selector() {
        let mut selector = AutonSelector::new();
        assert_eq!(selector.selected().name, "Red SAWP");
        selector.previous();
        assert_eq!(selector.selected().name, "Test");
        selector.next();
        selector.next();
        assert_eq!(selector.selected().name, "Blue SAWP");
        selector.select("skills auto").unwrap();
        assert_eq!(selector.routine().name, "Skills Auto");
        assert!(selector.select("nope").is_err());
        assert_eq!(selector.selected().name, "Skills Auto");
    }

    #[test]
    fn test_routines_serialize() {
        for entry in catalog() {
            let routine = entry.build();
            let json = routine.to_json_pretty().unwrap();
            let parsed = Routine::from_json(&json).unwrap();
            assert_eq!(parsed.name, routine.name);
            assert_eq!(parsed.steps.len(), routine.steps.len());
            assert_eq!(parsed.motion_count(), routine.motion_count());
        }
    }
}
