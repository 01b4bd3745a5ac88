//! 操作手控制循环
//!
//! 10ms 一个 tick：
//!
//! | 输入 | 触发 | 动作 |
//! |------|------|------|
//! | 左摇杆 Y / 右摇杆 X | 电平 | 街机驱动，夹着桩时降低缩放 |
//! | Y | 上升沿 | 夹子切换为手动策略并翻转意图 |
//! | L1 | 上升沿 | 拨杆翻转 |
//! | Right | 上升沿 | 机械臂主预设循环 |
//! | Down | 上升沿 | 机械臂副预设循环 |
//! | B | 上升沿 | 计分姿态切换 |
//! | X | 上升沿 | 挂杆时序 |
//! | R1 / R2 | 电平 | 进球通道正转 / 反转，都不按时停止 |
//!
//! 自动程序运行期间忽略机械臂按键。

use std::sync::Arc;
use std::time::{Duration, Instant};

use stakebot_driver::{
    ArmCommander, ClampPolicy, ControlLoop, DriverError, IntakeOverride, Robot, RobotContext,
};
use stakebot_hal::{Buttons, Gamepad, Piston};
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::hang::HangTrigger;
use crate::motion::MotionController;

/// 按钮上升沿检测
#[derive(Debug, Default)]
pub struct ButtonEdges {
    prev: Buttons,
}

impl ButtonEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录当前状态，返回本次新按下的按钮
    pub fn update(&mut self, current: Buttons) -> Buttons {
        let prev = std::mem::replace(&mut self.prev, current);
        let rise = |now: bool, before: bool| now && !before;
        Buttons {
            l1: rise(current.l1, prev.l1),
            l2: rise(current.l2, prev.l2),
            r1: rise(current.r1, prev.r1),
            r2: rise(current.r2, prev.r2),
            up: rise(current.up, prev.up),
            down: rise(current.down, prev.down),
            left: rise(current.left, prev.left),
            right: rise(current.right, prev.right),
            a: rise(current.a, prev.a),
            b: rise(current.b, prev.b),
            x: rise(current.x, prev.x),
            y: rise(current.y, prev.y),
        }
    }
}

/// 操作手控制循环
pub struct OperatorControl {
    ctx: Arc<RobotContext>,
    arm: ArmCommander,
    chassis: Arc<dyn MotionController>,
    gamepad: Arc<dyn Gamepad>,
    doinker: Arc<dyn Piston>,
    hang: HangTrigger,
    config: OperatorConfig,
    edges: ButtonEdges,
    gamepad_lost: bool,
}

impl OperatorControl {
    pub fn new(
        robot: &Robot,
        chassis: Arc<dyn MotionController>,
        gamepad: Arc<dyn Gamepad>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            ctx: robot.context().clone(),
            arm: robot.arm().clone(),
            chassis,
            gamepad,
            doinker: robot.hardware().doinker_piston.clone(),
            hang: HangTrigger::new(robot, config.hang.clone()),
            config,
            edges: ButtonEdges::new(),
            gamepad_lost: false,
        }
    }

    /// 挂杆触发器（测试中用于等待时序结束）
    pub fn hang(&mut self) -> &mut HangTrigger {
        &mut self.hang
    }

    fn log_arm(result: Result<(), DriverError>) {
        if let Err(e) = result {
            warn!("arm request rejected: {}", e);
        }
    }

    fn handle_buttons(&mut self, pressed: Buttons, held: Buttons) {
        let ctx = &self.ctx;

        if pressed.y {
            ctx.set_clamp_policy(ClampPolicy::Manual);
            let engage = !ctx.clamp_engage();
            ctx.set_clamp_engage(engage);
            debug!("operator clamp -> {}", engage);
        }

        if pressed.l1 {
            let extended = !self.doinker.is_extended();
            if let Err(e) = self.doinker.set_extended(extended) {
                warn!("doinker write failed: {}", e);
            }
        }

        if ctx.autonomous_running() {
            if pressed.right || pressed.down || pressed.b {
                debug!("arm buttons ignored while a routine is running");
            }
        } else {
            if pressed.right {
                Self::log_arm(self.arm.cycle_primary());
            }
            if pressed.down {
                Self::log_arm(self.arm.cycle_secondary());
            }
            if pressed.b {
                Self::log_arm(self.arm.toggle_score());
            }
        }

        if pressed.x {
            match self.hang.trigger() {
                Ok(true) => info!("hang triggered"),
                Ok(false) => {},
                Err(e) => warn!("hang trigger failed: {}", e),
            }
        }

        if held.r1 {
            ctx.set_intake_reversed(false);
            ctx.set_intake_override(IntakeOverride::Forward);
        } else if held.r2 {
            ctx.set_intake_override(IntakeOverride::Reverse);
            ctx.set_intake_reversed(true);
        } else {
            ctx.set_intake_override(IntakeOverride::Stop);
        }
    }
}

impl ControlLoop for OperatorControl {
    fn name(&self) -> &'static str {
        "operator"
    }

    fn tick(&mut self, _now: Instant) -> Duration {
        let state = match self.gamepad.state() {
            Ok(state) => {
                if self.gamepad_lost {
                    info!("gamepad reconnected");
                    self.gamepad_lost = false;
                }
                state
            },
            Err(e) => {
                if !self.gamepad_lost {
                    warn!("gamepad read failed, holding drive at zero: {}", e);
                    self.gamepad_lost = true;
                }
                self.chassis.tank(0.0, 0.0);
                return self.config.tick();
            },
        };

        let scale = if self.ctx.clamp_actual() {
            self.config.loaded_drive_scale
        } else {
            self.config.drive_scale
        };
        self.chassis.arcade(state.left_y, state.right_x, scale);

        let pressed = self.edges.update(state.buttons);
        self.handle_buttons(pressed, state.buttons);

        self.config.tick()
    }

    fn on_exit(&mut self) {
        self.chassis.tank(0.0, 0.0);
        self.hang.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_chassis::SimChassis;
    use stakebot_driver::RobotBuilder;
    use stakebot_driver::sim::SimRig;
    use stakebot_hal::sim::SimGamepad;

    struct Rig {
        sim: SimRig,
        robot: Robot,
        chassis: Arc<SimChassis>,
        gamepad: Arc<SimGamepad>,
        op: OperatorControl,
    }

    fn rig() -> Rig {
        let sim = SimRig::new();
        let robot = RobotBuilder::new(sim.hardware()).build().unwrap();
        let chassis = Arc::new(SimChassis::new());
        let gamepad = Arc::new(SimGamepad::new());
        let op = OperatorControl::new(
            &robot,
            chassis.clone(),
            gamepad.clone(),
            OperatorConfig::default(),
        );
        Rig {
            sim,
            robot,
            chassis,
            gamepad,
            op,
        }
    }

    fn wait_for(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        f()
    }

    #[test]
    fn test_button_edges() {
        let mut edges = ButtonEdges::new();
        let pressed = edges.update(Buttons { y: true, ..Buttons::default() });
        assert!(pressed.y);
        let pressed = edges.update(Buttons { y: true, x: true, ..Buttons::default() });
        assert!(!pressed.y);
        assert!(pressed.x);
        let pressed = edges.update(Buttons::default());
        assert_eq!(pressed, Buttons::default());
    }

    /// 测试夹子按键：切换为手动策略，只在上升沿翻转
    #[test]
    fn test_clamp_toggle() {
        let mut r = rig();
        let ctx = r.robot.context().clone();

        r.gamepad.update(|s| s.buttons.y = true);
        r.op.tick(Instant::now());
        assert_eq!(ctx.clamp_policy(), ClampPolicy::Manual);
        assert!(ctx.clamp_engage());

        r.op.tick(Instant::now());
        assert!(ctx.clamp_engage());

        r.gamepad.update(|s| s.buttons.y = false);
        r.op.tick(Instant::now());
        r.gamepad.update(|s| s.buttons.y = true);
        r.op.tick(Instant::now());
        assert!(!ctx.clamp_engage());
    }

    #[test]
    fn test_drive_scale_reduced_when_loaded() {
        let mut r = rig();
        let ctx = r.robot.context().clone();
        r.gamepad.update(|s| s.left_y = 1.0);
        r.op.tick(Instant::now());
        assert_eq!(r.chassis.drive_power(), (0.45, 0.45));

        ctx.set_clamp_policy(ClampPolicy::Manual);
        ctx.set_clamp_engage(true);
        assert!(wait_for(Duration::from_secs(1), || ctx.clamp_actual()));
        r.op.tick(Instant::now());
        assert_eq!(r.chassis.drive_power(), (0.22, 0.22));
    }

    #[test]
    fn test_intake_buttons() {
        let mut r = rig();
        let ctx = r.robot.context().clone();

        r.gamepad.update(|s| s.buttons.r2 = true);
        r.op.tick(Instant::now());
        assert_eq!(ctx.intake_override(), IntakeOverride::Reverse);
        assert!(ctx.intake_reversed());

        r.gamepad.update(|s| {
            s.buttons.r2 = false;
            s.buttons.r1 = true;
        });
        r.op.tick(Instant::now());
        assert_eq!(ctx.intake_override(), IntakeOverride::Forward);
        assert!(!ctx.intake_reversed());

        r.gamepad.update(|s| s.buttons.r1 = false);
        r.op.tick(Instant::now());
        assert_eq!(ctx.intake_override(), IntakeOverride::Stop);
        assert!(wait_for(Duration::from_secs(1), || {
            r.sim.intake_primary.last_power() == Some(0.0)
                && r.sim.intake_secondary.last_power() == Some(0.0)
        }));
    }

    /// 测试自动程序运行时忽略机械臂按键
    #[test]
    fn test_arm_buttons_ignored_during_routine() {
        let mut r = rig();
        let ctx = r.robot.context().clone();

        ctx.set_autonomous_running(true);
        r.gamepad.update(|s| s.buttons.right = true);
        r.op.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(r.robot.arm().status().step, 0);

        ctx.set_autonomous_running(false);
        r.gamepad.update(|s| s.buttons.right = false);
        r.op.tick(Instant::now());
        r.gamepad.update(|s| s.buttons.right = true);
        r.op.tick(Instant::now());
        assert!(wait_for(Duration::from_secs(1), || {
            let status = r.robot.arm().status();
            status.step == 1 && status.target_deg == 26.0
        }));
    }

    #[test]
    fn test_doinker_toggle() {
        let mut r = rig();
        r.gamepad.update(|s| s.buttons.l1 = true);
        r.op.tick(Instant::now());
        assert!(r.sim.doinker_piston.is_extended());
        r.gamepad.update(|s| s.buttons.l1 = false);
        r.op.tick(Instant::now());
        r.gamepad.update(|s| s.buttons.l1 = true);
        r.op.tick(Instant::now());
        assert!(!r.sim.doinker_piston.is_extended());
    }

    #[test]
    fn test_hang_button() {
        let mut r = rig();
        r.gamepad.update(|s| s.buttons.x = true);
        let start = Instant::now();
        r.op.tick(Instant::now());
        // tick 不会等挂杆时序
        assert!(start.elapsed() < Duration::from_millis(100));
        r.op.hang().wait();
        assert!(r.sim.hang_piston.is_extended());
    }

    #[test]
    fn test_gamepad_loss_stops_drive() {
        let mut r = rig();
        r.gamepad.update(|s| s.left_y = 1.0);
        r.op.tick(Instant::now());
        assert_ne!(r.chassis.drive_power(), (0.0, 0.0));

        r.gamepad.set_disconnected(true);
        assert_eq!(r.op.tick(Instant::now()), Duration::from_millis(10));
        assert_eq!(r.chassis.drive_power(), (0.0, 0.0));

        r.gamepad.set_disconnected(false);
        r.op.tick(Instant::now());
        assert_ne!(r.chassis.drive_power(), (0.0, 0.0));
    }
}
