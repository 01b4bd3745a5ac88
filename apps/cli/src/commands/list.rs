//! list 命令

use anyhow::Result;
use stakebot_control::routines;

/// 列出程序目录（选择器顺序）
pub fn list() -> Result<()> {
    for (index, entry) in routines::catalog().iter().enumerate() {
        let routine = entry.build();
        println!(
            "{:>2}. {:<12} {:>3} steps  {}",
            index + 1,
            entry.name,
            routine.steps.len(),
            entry.description
        );
    }
    Ok(())
}
