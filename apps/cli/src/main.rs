//! # Stakebot CLI
//!
//! 自动程序的离线工具：在仿真硬件上演练程序、导出/回放 JSON 脚本、检查配置。
//!
//! ```bash
//! # 列出可选程序
//! stakebot-cli list
//!
//! # 在仿真硬件上演练（真实控制循环 + 简单场地模型）
//! stakebot-cli simulate "Red SAWP" --config robot.toml
//!
//! # 导出为 JSON 脚本，修改后回放
//! stakebot-cli dump "Red Ring" > red_ring.json
//! stakebot-cli run-script red_ring.json
//!
//! # 配置
//! stakebot-cli config show > robot.toml
//! stakebot-cli config check robot.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod world;

use commands::{ConfigCommand, DumpCommand, RunScriptCommand, SimulateCommand};

/// Stakebot CLI - 自动程序离线工具
#[derive(Parser, Debug)]
#[command(name = "stakebot-cli")]
#[command(about = "Dry-run and inspect stakebot autonomous routines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出程序目录
    List,

    /// 在仿真硬件上演练程序
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },

    /// 以 JSON 输出程序
    Dump {
        #[command(flatten)]
        args: DumpCommand,
    },

    /// 加载 JSON 脚本并演练
    RunScript {
        #[command(flatten)]
        args: RunScriptCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stakebot=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => commands::list(),
        Commands::Simulate { args } => args.execute(),
        Commands::Dump { args } => args.execute(),
        Commands::RunScript { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
