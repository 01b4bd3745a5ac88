//! 控制循环线程
//!
//! 每个控制循环都是一个 `std::thread`，执行 轮询 - 计算 - 休眠。
//! 循环体实现为 [`ControlLoop::tick`]，返回下一次 tick 前的休眠时间，
//! 因此逻辑本身可以在测试中用合成的 `Instant` 确定性地驱动。

use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, trace};

use crate::DriverError;
use crate::state::RobotContext;

/// 休眠分片上限：保证关闭标志在该时间内被观察到
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// 控制循环
pub trait ControlLoop: Send + 'static {
    /// 线程名（同时用于日志）
    fn name(&self) -> &'static str;

    /// 执行一次 轮询 - 计算 - 输出，返回下一次 tick 前的休眠时间
    fn tick(&mut self, now: Instant) -> Duration;

    /// 循环退出时调用（停止执行器）
    fn on_exit(&mut self) {}
}

/// 运行控制循环直到关闭标志被清除
pub fn run_loop<L: ControlLoop>(mut control: L, ctx: Arc<RobotContext>) {
    let name = control.name();

    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::warn;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("{} thread priority set to MAX (realtime)", name);
            },
            Err(e) => {
                warn!(
                    "Failed to set {} thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    name, e
                );
            },
        }
    }

    info!("{} loop started", name);
    loop {
        // 检查运行标志
        if !ctx.is_running() {
            trace!("{} thread: is_running flag is false, exiting", name);
            break;
        }

        let next = control.tick(Instant::now());
        sleep_while_running(next, &ctx);
    }
    control.on_exit();
    info!("{} loop stopped", name);
}

/// 分片休眠，关闭时尽早返回
fn sleep_while_running(duration: Duration, ctx: &RobotContext) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline || !ctx.is_running() {
            return;
        }
        // 使用 spin_sleep 提供亚毫秒级延迟精度
        spin_sleep::sleep((deadline - now).min(MAX_SLEEP_SLICE));
    }
}

/// 在独立线程中启动控制循环
pub fn spawn_loop<L: ControlLoop>(
    control: L,
    ctx: Arc<RobotContext>,
) -> Result<JoinHandle<()>, DriverError> {
    let name = control.name();
    Builder::new()
        .name(format!("stakebot-{}", name))
        .spawn(move || run_loop(control, ctx))
        .map_err(|source| DriverError::Spawn { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct CountingLoop {
        ticks: Arc<AtomicU32>,
        exited: Arc<AtomicBool>,
    }

    impl ControlLoop for CountingLoop {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn tick(&mut self, _now: Instant) -> Duration {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(5)
        }

        fn on_exit(&mut self) {
            self.exited.store(true, Ordering::SeqCst);
        }
    }

    /// 测试循环在关闭标志清除后退出并调用 on_exit
    #[test]
    fn test_loop_runs_until_shutdown() {
        let ctx = Arc::new(RobotContext::new());
        let ticks = Arc::new(AtomicU32::new(0));
        let exited = Arc::new(AtomicBool::new(false));
        let handle = spawn_loop(
            CountingLoop {
                ticks: ticks.clone(),
                exited: exited.clone(),
            },
            ctx.clone(),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        ctx.request_shutdown();
        handle.join().unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 2);
        assert!(exited.load(Ordering::SeqCst));
    }

    /// 测试长休眠不会拖慢关闭
    #[test]
    fn test_long_sleep_is_interruptible() {
        struct Sleepy;
        impl ControlLoop for Sleepy {
            fn name(&self) -> &'static str {
                "sleepy"
            }
            fn tick(&mut self, _now: Instant) -> Duration {
                Duration::from_secs(10)
            }
        }

        let ctx = Arc::new(RobotContext::new());
        let handle = spawn_loop(Sleepy, ctx.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        ctx.request_shutdown();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
