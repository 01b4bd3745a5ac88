//! 简单场地模型
//!
//! 演练时根据机器人意图改写仿真传感器读数：
//! - 请求夹紧时，桩出现在夹子前方
//! - 持环模式下进球通道运转一段时间后，己方颜色的环到达光学传感器
//! - 机械臂在装环位置、进球通道正转一段时间后，环顶住机械臂，第一级卡死
//! - 场地墙距离固定

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use stakebot_driver::sim::SimRig;
use stakebot_driver::{RobotContext, TeamColor};
use tracing::{debug, warn};

/// 场地模型参数
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub tick: Duration,
    /// 桩在夹子前方时的距离读数（毫米）
    pub goal_near_mm: u32,
    pub goal_far_mm: u32,
    /// 持环模式下环到达光学传感器所需时间
    pub ring_travel: Duration,
    /// 装环时环顶住机械臂所需时间
    pub load_travel: Duration,
    /// 装环位置（度）
    pub load_window_deg: (f64, f64),
    pub wall_mm: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            goal_near_mm: 10,
            goal_far_mm: 400,
            ring_travel: Duration::from_millis(300),
            load_travel: Duration::from_millis(500),
            load_window_deg: (20.0, 32.0),
            wall_mm: 1270,
        }
    }
}

/// 场地模型线程句柄
pub struct World {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl World {
    pub fn spawn(rig: SimRig, ctx: Arc<RobotContext>, config: WorldConfig) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("stakebot-world".into())
            .spawn(move || run(rig, ctx, config, flag))
            .context("启动场地模型线程失败")?;
        Ok(Self { stop, handle })
    }

    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("world model thread panicked");
        }
    }
}

fn run(rig: SimRig, ctx: Arc<RobotContext>, config: WorldConfig, stop: Arc<AtomicBool>) {
    rig.reset_distance.set_mm(config.wall_mm);

    let mut feeding_since: Option<Instant> = None;
    let mut loading_since: Option<Instant> = None;
    let mut ring_placed = false;
    let mut jammed = false;

    while !stop.load(Ordering::Acquire) && ctx.is_running() {
        let now = Instant::now();

        let goal_mm = if ctx.clamp_engage() {
            config.goal_near_mm
        } else {
            config.goal_far_mm
        };
        rig.clamp_distance.set_mm(goal_mm);

        // 持环
        let feeding = ctx.ring_hold_active() && (ctx.intake_enabled() || ctx.staged());
        if feeding {
            let since = *feeding_since.get_or_insert(now);
            if !ring_placed && now.duration_since(since) >= config.ring_travel {
                let (red, blue) = match ctx.team() {
                    TeamColor::Red => (200.0, 20.0),
                    TeamColor::Blue => (20.0, 200.0),
                };
                rig.optical.place(200.0, red, blue);
                ring_placed = true;
                debug!("world: ring reached the optical sensor");
            }
        } else {
            feeding_since = None;
            if ring_placed && !ctx.ring_hold_active() {
                rig.optical.clear();
                ring_placed = false;
            }
        }

        // 装环卡死
        let arm = ctx.arm_status();
        let (low, high) = config.load_window_deg;
        let loading = ctx.intake_enabled()
            && !ctx.intake_reversed()
            && !ctx.ring_hold_active()
            && arm.target_deg >= low
            && arm.target_deg <= high;
        if loading {
            let since = *loading_since.get_or_insert(now);
            if !jammed && now.duration_since(since) >= config.load_travel {
                rig.intake_primary.set_feedback(0.4, 0.0);
                jammed = true;
                debug!("world: ring jammed against the arm");
            }
        } else {
            loading_since = None;
            if jammed {
                rig.intake_primary.set_feedback(0.0, 0.0);
                jammed = false;
            }
        }

        std::thread::sleep(config.tick);
    }
}
