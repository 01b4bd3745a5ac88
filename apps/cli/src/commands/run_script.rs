//! run-script 命令
//!
//! 加载 JSON 脚本并在仿真硬件上演练

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stakebot_control::Routine;

use super::simulate::{SimulateOptions, dry_run};

/// 脚本回放命令参数
#[derive(Args, Debug)]
pub struct RunScriptCommand {
    /// 脚本文件路径（JSON）
    pub script: PathBuf,

    #[command(flatten)]
    pub options: SimulateOptions,
}

impl RunScriptCommand {
    pub fn execute(&self) -> Result<()> {
        println!("📜 加载脚本: {}", self.script.display());
        let content = fs::read_to_string(&self.script)
            .with_context(|| format!("读取脚本失败: {}", self.script.display()))?;
        let routine = Routine::from_json(&content)
            .with_context(|| format!("解析脚本失败: {}", self.script.display()))?;
        if let Err((step, reason)) = routine.validate() {
            anyhow::bail!("脚本第 {} 步无效: {}", step, reason);
        }

        dry_run(&routine, &self.options)
    }
}
