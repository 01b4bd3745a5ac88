//! 配置管理命令
//!
//! 输出默认配置、检查配置文件

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use stakebot_control::RobotConfig;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 以 TOML 输出默认配置（或指定文件补全默认值后的完整配置）
    Show {
        /// 配置文件路径
        file: Option<PathBuf>,
    },

    /// 检查配置文件
    Check {
        /// 配置文件路径
        file: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show { file } => Self::show_(file),

            ConfigCommand::Check { file } => Self::check_(file),
        }
    }

    fn show_(file: Option<PathBuf>) -> Result<()> {
        let config = match file {
            Some(path) => RobotConfig::load(&path)
                .with_context(|| format!("加载配置失败: {}", path.display()))?,
            None => RobotConfig::default(),
        };
        let text = config.to_toml_string().context("序列化配置失败")?;
        print!("{}", text);
        Ok(())
    }

    fn check_(file: PathBuf) -> Result<()> {
        let config = RobotConfig::load(&file)
            .with_context(|| format!("配置文件无效: {}", file.display()))?;

        println!("✅ 配置文件有效: {}", file.display());
        println!(
            "  机械臂周期: {} ms，夹子稳定: {} ms",
            config.driver.arm.period_ms, config.driver.clamp.settle_ms
        );
        println!(
            "  底盘缩放: {} / 夹桩 {}",
            config.operator.drive_scale, config.operator.loaded_drive_scale
        );
        println!(
            "  默认等待超时: {} ms",
            config.sequence.default_wait_timeout_ms
        );

        let defaults = RobotConfig::default();
        if config == defaults {
            println!("  (与默认配置相同)");
        }
        Ok(())
    }
}
