//! dump 命令
//!
//! 以 JSON 脚本形式输出目录中的程序，可修改后用 `run-script` 回放。

use anyhow::{Context, Result};
use clap::Args;
use stakebot_control::routines;

/// 导出命令参数
#[derive(Args, Debug)]
pub struct DumpCommand {
    /// 程序名（不区分大小写）
    pub name: String,

    /// 输出镜像后的程序（场地另一侧）
    #[arg(long)]
    pub mirror: bool,
}

impl DumpCommand {
    pub fn execute(&self) -> Result<()> {
        let mut routine = routines::build(&self.name)?;
        if self.mirror {
            routine = routine.mirrored(format!("{} (mirrored)", routine.name));
        }
        let json = routine.to_json_pretty().context("序列化程序失败")?;
        println!("{}", json);
        Ok(())
    }
}
