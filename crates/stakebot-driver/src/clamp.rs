//! 夹子控制
//!
//! 自动策略：请求夹紧且距离传感器检测到目标（< 25 mm）时，
//! 目标必须连续保持到位 250 ms（每次轮询都重新检查）才伸出气缸。
//! 松开立即执行，之后 100 ms 去抖期内不接受任何转换。
//!
//! 手动策略（操作手）：意图直接驱动气缸，没有距离门控和稳定延时，松开去抖仍然生效。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use stakebot_hal::{DistanceSensor, Piston};
use tracing::{debug, warn};

use crate::config::ClampConfig;
use crate::mode::ClampPolicy;
use crate::pipeline::ControlLoop;
use crate::state::RobotContext;

/// 夹子控制循环
pub struct ClampController {
    ctx: Arc<RobotContext>,
    piston: Arc<dyn Piston>,
    distance: Arc<dyn DistanceSensor>,
    config: ClampConfig,
    /// 目标连续到位的起始时刻
    settle_since: Option<Instant>,
    /// 去抖结束时刻
    debounce_until: Option<Instant>,
}

impl ClampController {
    pub fn new(
        ctx: Arc<RobotContext>,
        piston: Arc<dyn Piston>,
        distance: Arc<dyn DistanceSensor>,
        config: ClampConfig,
    ) -> Self {
        Self {
            ctx,
            piston,
            distance,
            config,
            settle_since: None,
            debounce_until: None,
        }
    }

    fn poll_interval(&self) -> Duration {
        let ms = if self.ctx.clamp_engage() {
            self.config.poll_engaged_ms
        } else {
            self.config.poll_idle_ms
        };
        Duration::from_millis(ms)
    }

    /// 目标是否在夹取范围内；读数失败视为无目标
    fn target_present(&self) -> bool {
        match self.distance.distance_mm() {
            Ok(mm) => mm < self.config.engage_distance_mm,
            Err(e) => {
                warn!("clamp: distance read failed: {}", e);
                self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                false
            },
        }
    }

    fn actuate(&mut self, extended: bool, now: Instant) {
        if let Err(e) = self.piston.set_extended(extended) {
            warn!("clamp: piston write failed: {}", e);
            self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.ctx.publish_clamp_actual(extended);
        self.settle_since = None;
        if extended {
            debug!("clamp: engaged");
            self.ctx.metrics.clamp_engagements.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("clamp: released");
            self.ctx.metrics.clamp_releases.fetch_add(1, Ordering::Relaxed);
            self.debounce_until = Some(now + Duration::from_millis(self.config.release_debounce_ms));
        }
    }
}

impl ControlLoop for ClampController {
    fn name(&self) -> &'static str {
        "clamp"
    }

    fn tick(&mut self, now: Instant) -> Duration {
        self.ctx.metrics.clamp_ticks.fetch_add(1, Ordering::Relaxed);

        if let Some(until) = self.debounce_until {
            if now < until {
                return until - now;
            }
            self.debounce_until = None;
        }

        let engage = self.ctx.clamp_engage();
        let actuated = self.piston.is_extended();

        if !engage {
            self.settle_since = None;
            if actuated {
                self.actuate(false, now);
                return Duration::from_millis(self.config.release_debounce_ms);
            }
            return self.poll_interval();
        }

        if actuated {
            return self.poll_interval();
        }

        match self.ctx.clamp_policy() {
            ClampPolicy::Manual => self.actuate(true, now),
            ClampPolicy::Auto => {
                if self.target_present() {
                    let since = *self.settle_since.get_or_insert(now);
                    if now.saturating_duration_since(since)
                        >= Duration::from_millis(self.config.settle_ms)
                    {
                        self.actuate(true, now);
                    }
                } else {
                    self.settle_since = None;
                }
            },
        }
        self.poll_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakebot_hal::sim::{SimDistance, SimPiston};

    struct Rig {
        ctx: Arc<RobotContext>,
        piston: Arc<SimPiston>,
        distance: Arc<SimDistance>,
        clamp: ClampController,
    }

    fn rig() -> Rig {
        let ctx = Arc::new(RobotContext::new());
        let piston = Arc::new(SimPiston::new("clamp"));
        let distance = Arc::new(SimDistance::new());
        let clamp = ClampController::new(
            ctx.clone(),
            piston.clone(),
            distance.clone(),
            ClampConfig::default(),
        );
        Rig {
            ctx,
            piston,
            distance,
            clamp,
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// 以轮询周期驱动循环，直到 `end`
    fn run_until(clamp: &mut ClampController, start: Instant, end: Instant) -> Instant {
        let mut now = start;
        while now < end {
            now += clamp.tick(now);
        }
        now
    }

    /// 测试夹紧发生在稳定延时之后、一个轮询周期之内，而不是更早
    #[test]
    fn test_engages_after_settle_not_before() {
        let mut r = rig();
        r.ctx.set_clamp_engage(true);
        r.distance.set_mm(10);
        let t0 = Instant::now();

        let mut now = t0;
        while now < t0 + ms(240) {
            now += r.clamp.tick(now);
            assert!(!r.ctx.clamp_actual(), "engaged early at {:?}", now - t0);
        }
        run_until(&mut r.clamp, now, t0 + ms(260));
        assert!(r.ctx.clamp_actual());
        assert!(r.piston.is_extended());
        assert_eq!(r.piston.transitions(), 1);
    }

    /// 测试短暂的到位读数（短于稳定延时）不会触发夹紧
    #[test]
    fn test_momentary_reading_does_not_actuate() {
        let mut r = rig();
        r.ctx.set_clamp_engage(true);
        let t0 = Instant::now();

        r.distance.set_mm(10);
        let now = run_until(&mut r.clamp, t0, t0 + ms(150));
        r.distance.set_mm(200);
        let now = run_until(&mut r.clamp, now, t0 + ms(170));
        r.distance.set_mm(10);
        let now = run_until(&mut r.clamp, now, t0 + ms(300));
        assert!(!r.ctx.clamp_actual());

        // 重新计时：从 170ms 起满 250ms 才夹紧
        run_until(&mut r.clamp, now, t0 + ms(440));
        assert!(r.ctx.clamp_actual());
    }

    #[test]
    fn test_no_target_never_engages() {
        let mut r = rig();
        r.ctx.set_clamp_engage(true);
        let t0 = Instant::now();
        run_until(&mut r.clamp, t0, t0 + ms(2000));
        assert!(!r.ctx.clamp_actual());
        assert_eq!(r.piston.transitions(), 0);
    }

    /// 测试松开立即执行，随后去抖期内不接受转换
    #[test]
    fn test_release_then_debounce() {
        let mut r = rig();
        r.ctx.set_clamp_policy(ClampPolicy::Manual);
        r.ctx.set_clamp_engage(true);
        let t0 = Instant::now();
        r.clamp.tick(t0);
        assert!(r.ctx.clamp_actual());

        r.ctx.set_clamp_engage(false);
        assert_eq!(r.clamp.tick(t0 + ms(10)), ms(100));
        assert!(!r.ctx.clamp_actual());
        assert!(!r.piston.is_extended());

        // 去抖期内重新请求夹紧不生效
        r.ctx.set_clamp_engage(true);
        assert_eq!(r.clamp.tick(t0 + ms(60)), ms(50));
        assert!(!r.piston.is_extended());

        r.clamp.tick(t0 + ms(110));
        assert!(r.piston.is_extended());
        assert_eq!(r.ctx.metrics.snapshot().clamp_releases, 1);
        assert_eq!(r.ctx.metrics.snapshot().clamp_engagements, 2);
    }

    /// 测试手动策略无需距离门控
    #[test]
    fn test_manual_policy_ignores_distance() {
        let mut r = rig();
        r.ctx.set_clamp_policy(ClampPolicy::Manual);
        r.ctx.set_clamp_engage(true);
        r.clamp.tick(Instant::now());
        assert!(r.ctx.clamp_actual());
    }

    #[test]
    fn test_poll_interval_follows_intent() {
        let mut r = rig();
        assert_eq!(r.clamp.tick(Instant::now()), ms(100));
        r.ctx.set_clamp_engage(true);
        assert_eq!(r.clamp.tick(Instant::now()), ms(10));
    }

    #[test]
    fn test_sensor_failure_reads_as_no_object() {
        let mut r = rig();
        r.ctx.set_clamp_engage(true);
        r.distance.set_mm(5);
        r.distance.set_failing(true);
        let t0 = Instant::now();
        run_until(&mut r.clamp, t0, t0 + ms(500));
        assert!(!r.ctx.clamp_actual());
    }
}
