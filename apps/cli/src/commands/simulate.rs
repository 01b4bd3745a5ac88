//! simulate 命令
//!
//! 仿真硬件 + 真实控制循环 + 简单场地模型，执行一次程序并打印报告

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use stakebot_control::{
    Competition, MotionController, RobotConfig, Routine, RunReport, SimChassis, SimChassisConfig,
    routines,
};
use stakebot_driver::sim::SimRig;
use stakebot_driver::{MetricsSnapshot, RobotContext};
use tracing::warn;

use crate::world::{World, WorldConfig};

/// 演练公共参数
#[derive(Args, Debug, Clone)]
pub struct SimulateOptions {
    /// 配置文件（TOML），缺省使用默认配置
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 仿真底盘满速直线速度（英寸/秒）
    #[arg(long, default_value_t = 60.0)]
    pub speed: f64,
}

impl SimulateOptions {
    fn load_config(&self) -> Result<RobotConfig> {
        match &self.config {
            Some(path) => RobotConfig::load(path)
                .with_context(|| format!("加载配置失败: {}", path.display())),
            None => Ok(RobotConfig::default()),
        }
    }
}

/// 演练命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 程序名（不区分大小写）
    pub name: String,

    #[command(flatten)]
    pub options: SimulateOptions,
}

impl SimulateCommand {
    pub fn execute(&self) -> Result<()> {
        let routine = routines::build(&self.name)?;
        dry_run(&routine, &self.options)
    }
}

/// 在仿真硬件上执行程序
pub fn dry_run(routine: &Routine, options: &SimulateOptions) -> Result<()> {
    if !options.speed.is_finite() || options.speed <= 0.0 {
        anyhow::bail!("--speed 必须为正数，当前为 {}", options.speed);
    }
    let config = options.load_config()?;

    let rig = SimRig::new();
    let chassis = Arc::new(SimChassis::with_config(SimChassisConfig {
        linear_speed_ips: options.speed,
        turn_speed_dps: options.speed * 6.0,
    }));

    let ctx = Arc::new(RobotContext::new());
    {
        let ctx = ctx.clone();
        ctrlc::set_handler(move || {
            warn!("interrupted, shutting down");
            ctx.request_shutdown();
        })
        .context("安装 Ctrl-C 处理器失败")?;
    }

    let mut competition =
        Competition::initialize_with_context(rig.hardware(), chassis.clone(), config, ctx.clone())
            .context("初始化失败")?;
    let world = World::spawn(rig, ctx, WorldConfig::default())?;

    println!("🤖 演练: {} ({} 步)", routine.name, routine.steps.len());
    if !routine.description.is_empty() {
        println!("    {}", routine.description);
    }
    println!();

    let result = competition.run_routine(routine);
    world.stop();
    let metrics = competition.robot().metrics();
    let pose = chassis.pose();
    competition.shutdown();

    match result {
        Ok(report) => {
            print_report(&report);
            println!("  最终位姿: ({:.1}, {:.1}, {:.1}°)", pose.x, pose.y, pose.theta);
            print_metrics(&metrics);
            Ok(())
        },
        Err(e) => {
            println!("❌ 程序未完成: {}", e);
            print_metrics(&metrics);
            Err(e.into())
        },
    }
}

fn print_report(report: &RunReport) {
    println!("📊 执行结果:");
    println!("  步骤: {}/{}", report.steps_executed, report.total_steps);
    println!("  耗时: {:.2} 秒", report.elapsed.as_secs_f64());
    if report.wait_timeouts.is_empty() {
        println!("  等待超时: 无");
    } else {
        println!("  等待超时:");
        for (step, condition) in &report.wait_timeouts {
            println!("    第 {} 步: {:?}", step, condition);
        }
    }
}

fn print_metrics(metrics: &MetricsSnapshot) {
    println!();
    println!("📈 控制循环统计:");
    println!(
        "  ticks: arm {} / stall {} / intake {} / clamp {}",
        metrics.arm_ticks, metrics.stall_ticks, metrics.intake_ticks, metrics.clamp_ticks
    );
    println!("  机械臂请求: {}", metrics.arm_requests);
    println!(
        "  夹子: 夹紧 {} 次，松开 {} 次",
        metrics.clamp_engagements, metrics.clamp_releases
    );
    println!(
        "  进球通道: 卡死 {} 次，排异色 {} 次，持环 {} 次",
        metrics.stall_detections, metrics.reject_pulses, metrics.ring_holds
    );
    if metrics.device_errors > 0 {
        println!("  ⚠️ 设备错误: {}", metrics.device_errors);
    }
}
