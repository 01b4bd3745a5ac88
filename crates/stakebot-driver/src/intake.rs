//! 进球通道颜色仲裁
//!
//! 两级进球通道（第一级 `primary`，第二级 `secondary`）+ 光学传感器。
//! 每个 tick 先按固定优先级计算一次 [`IntakeMode`]，再按模式驱动电机：
//!
//! | 模式 | 第一级 | 第二级 |
//! |------|--------|--------|
//! | `Stalled` | 不写（卡死检测器独占） | 跟随基线意图 |
//! | `Staged` | 脚本给定功率 | 脚本给定功率 |
//! | `OperatorOverride` | 正转 / 反转 / 停止 | 同左 |
//! | `RingHold` | 持环功率，锁存后停止 | 全速，锁存后停止 |
//! | `RejectPulse` | 延时后反转一段时间 | 不变 |
//! | `Normal` | 开启时正转，关闭且未反转时停止 | 同左 |

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use stakebot_hal::{Motor, OpticalReading, OpticalSensor};
use tracing::{debug, trace, warn};

use crate::config::IntakeConfig;
use crate::mode::{IntakeMode, IntakeOverride, TeamColor};
use crate::pipeline::ControlLoop;
use crate::state::RobotContext;

/// 识别传感器前方的环
///
/// 接近度和亮度都超过阈值时认为有物体；红分量大于蓝分量为红环，否则为蓝环。
pub fn classify(
    reading: Option<&OpticalReading>,
    proximity_threshold: f64,
    brightness_threshold: f64,
) -> Option<TeamColor> {
    let r = reading?;
    if r.proximity > proximity_threshold && r.brightness > brightness_threshold {
        Some(if r.red > r.blue {
            TeamColor::Red
        } else {
            TeamColor::Blue
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectPhase {
    /// 检测到异色环，电机保持不变
    Delay,
    /// 第一级反转
    Reverse,
}

#[derive(Debug, Clone, Copy)]
struct RejectPulse {
    started: Instant,
    phase: RejectPhase,
}

/// 颜色仲裁循环
pub struct IntakeArbiter {
    ctx: Arc<RobotContext>,
    primary: Arc<dyn Motor>,
    secondary: Arc<dyn Motor>,
    optical: Arc<dyn OpticalSensor>,
    config: IntakeConfig,

    reject: Option<RejectPulse>,
    in_ring_hold: bool,
    hold_ticks: u32,
}

impl IntakeArbiter {
    pub fn new(
        ctx: Arc<RobotContext>,
        primary: Arc<dyn Motor>,
        secondary: Arc<dyn Motor>,
        optical: Arc<dyn OpticalSensor>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            ctx,
            primary,
            secondary,
            optical,
            config,
            reject: None,
            in_ring_hold: false,
            hold_ticks: 0,
        }
    }

    fn reject_total(&self) -> Duration {
        Duration::from_millis(self.config.reject_delay_ms + self.config.reject_ms)
    }

    fn poll_interval(&self) -> Duration {
        let ms = if self.ctx.intake_enabled() {
            self.config.poll_enabled_ms
        } else {
            self.config.poll_disabled_ms
        };
        Duration::from_millis(ms)
    }

    /// 按优先级计算本 tick 的模式
    fn select_mode(&mut self, now: Instant, reading: Option<&OpticalReading>) -> IntakeMode {
        let ctx = &self.ctx;
        if ctx.stuck_active() {
            return IntakeMode::Stalled;
        }
        if ctx.staged() {
            return IntakeMode::Staged;
        }
        if ctx.intake_override() != IntakeOverride::None {
            return IntakeMode::OperatorOverride;
        }
        if ctx.ring_hold_active() {
            return IntakeMode::RingHold;
        }

        if let Some(pulse) = self.reject {
            if now.saturating_duration_since(pulse.started) < self.reject_total() {
                return IntakeMode::RejectPulse;
            }
            self.reject = None;
        }

        let detected = classify(
            reading,
            self.config.proximity_threshold,
            self.config.brightness_threshold,
        );
        match detected {
            Some(color) if color != ctx.team() => {
                debug!("intake: {} ring detected, rejecting", color);
                self.reject = Some(RejectPulse {
                    started: now,
                    phase: RejectPhase::Delay,
                });
                IntakeMode::RejectPulse
            },
            _ => IntakeMode::Normal,
        }
    }

    fn drive(&self, primary: Option<f64>, secondary: Option<f64>) {
        if let Some(power) = primary
            && let Err(e) = self.primary.set_power(power)
        {
            warn!("intake: primary motor write failed: {}", e);
            self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(power) = secondary
            && let Err(e) = self.secondary.set_power(power)
        {
            warn!("intake: secondary motor write failed: {}", e);
            self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 基线：开启时两级正转，关闭且未反转时停止，反转时不写（操作手持有）
    fn baseline_power(&self) -> Option<f64> {
        if self.ctx.intake_enabled() {
            Some(1.0)
        } else if !self.ctx.intake_reversed() {
            Some(0.0)
        } else {
            None
        }
    }

    fn override_power(value: IntakeOverride) -> Option<f64> {
        match value {
            IntakeOverride::None => None,
            IntakeOverride::Forward => Some(1.0),
            IntakeOverride::Reverse => Some(-1.0),
            IntakeOverride::Stop => Some(0.0),
        }
    }

    fn stalled_tick(&self) {
        let ctx = &self.ctx;
        let secondary = match ctx.intake_override() {
            IntakeOverride::None if ctx.staged() => Some(ctx.staged_power().1),
            IntakeOverride::None => self.baseline_power(),
            other => Self::override_power(other),
        };
        self.drive(None, secondary);
    }

    fn ring_hold_tick(&mut self, reading: Option<&OpticalReading>) -> Duration {
        let held_poll = Duration::from_millis(self.config.ring_held_poll_ms);
        let entering = !self.in_ring_hold;
        if entering {
            self.in_ring_hold = true;
            self.hold_ticks = 0;
        }

        if self.ctx.ring_held() {
            if entering {
                self.drive(Some(0.0), Some(0.0));
            }
            return held_poll;
        }

        let detected = classify(
            reading,
            self.config.ring_hold_proximity_threshold,
            self.config.brightness_threshold,
        );
        let matched = detected == Some(self.ctx.team());
        if matched || self.hold_ticks > self.config.ring_hold_fallback_ticks {
            debug!(
                "intake: ring held (matched: {}, ticks: {})",
                matched, self.hold_ticks
            );
            self.drive(Some(0.0), Some(0.0));
            self.ctx.publish_ring_held(true);
            self.ctx.metrics.ring_holds.fetch_add(1, Ordering::Relaxed);
            return held_poll;
        }

        self.hold_ticks += 1;
        self.drive(Some(self.config.ring_hold_primary_power), Some(1.0));
        self.poll_interval()
    }

    fn reject_tick(&mut self, now: Instant) -> Duration {
        let Some(mut pulse) = self.reject else {
            return self.poll_interval();
        };
        let delay = Duration::from_millis(self.config.reject_delay_ms);
        let elapsed = now.saturating_duration_since(pulse.started);

        if elapsed < delay {
            return delay - elapsed;
        }
        if pulse.phase == RejectPhase::Delay {
            pulse.phase = RejectPhase::Reverse;
            self.reject = Some(pulse);
            trace!("intake: reject reverse");
            self.drive(Some(self.config.reject_power), None);
            self.ctx.metrics.reject_pulses.fetch_add(1, Ordering::Relaxed);
        }
        self.reject_total().saturating_sub(elapsed)
    }
}

impl ControlLoop for IntakeArbiter {
    fn name(&self) -> &'static str {
        "intake"
    }

    fn tick(&mut self, now: Instant) -> Duration {
        self.ctx.metrics.intake_ticks.fetch_add(1, Ordering::Relaxed);

        let reading = match self.optical.reading() {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("intake: optical read failed: {}", e);
                self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                None
            },
        };

        if !self.ctx.ring_hold_active() {
            self.ctx.publish_ring_held(false);
        }

        let mode = self.select_mode(now, reading.as_ref());
        self.ctx.publish_intake_mode(mode);

        if mode != IntakeMode::RejectPulse && self.reject.take().is_some() {
            trace!("intake: reject pulse preempted by {:?}", mode);
        }
        if mode != IntakeMode::RingHold {
            self.in_ring_hold = false;
        }

        match mode {
            IntakeMode::Stalled => {
                self.stalled_tick();
                self.poll_interval()
            },
            IntakeMode::Staged => {
                let (primary, secondary) = self.ctx.staged_power();
                self.drive(Some(primary), Some(secondary));
                self.poll_interval()
            },
            IntakeMode::OperatorOverride => {
                let power = Self::override_power(self.ctx.intake_override());
                self.drive(power, power);
                self.poll_interval()
            },
            IntakeMode::RingHold => self.ring_hold_tick(reading.as_ref()),
            IntakeMode::RejectPulse => self.reject_tick(now),
            IntakeMode::Normal => {
                let power = self.baseline_power();
                self.drive(power, power);
                self.poll_interval()
            },
        }
    }

    fn on_exit(&mut self) {
        self.drive(Some(0.0), Some(0.0));
    }
}
