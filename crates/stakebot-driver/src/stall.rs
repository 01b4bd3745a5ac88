//! 卡死检测
//!
//! 监测进球通道第一级电机的扭矩和转速：扭矩超阈值且几乎停转（且不在反转）
//! 时判定为卡死，发布 `stuck_active` 并给第一级电机一个短暂的正转脉冲。
//! `stuck_active` 为电平信号，每次轮询都会重新评估。
//!
//! `stuck_active` 为真期间，第一级电机由本循环独占。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use stakebot_hal::Motor;
use tracing::{debug, trace, warn};

use crate::config::StallConfig;
use crate::pipeline::ControlLoop;
use crate::state::RobotContext;

/// 卡死判定
pub fn is_stuck(torque: f64, velocity: f64, reversed: bool, config: &StallConfig) -> bool {
    torque > config.torque_threshold && velocity.abs() < config.velocity_threshold && !reversed
}

/// 卡死检测循环
pub struct StallDetector {
    ctx: Arc<RobotContext>,
    primary: Arc<dyn Motor>,
    config: StallConfig,
    /// 进行中的解卡脉冲结束时刻
    pulse_until: Option<Instant>,
}

impl StallDetector {
    pub fn new(ctx: Arc<RobotContext>, primary: Arc<dyn Motor>, config: StallConfig) -> Self {
        Self {
            ctx,
            primary,
            config,
            pulse_until: None,
        }
    }

    /// 是否正在输出解卡脉冲
    pub fn pulsing(&self) -> bool {
        self.pulse_until.is_some()
    }

    fn poll_interval(&self) -> Duration {
        let ms = if self.ctx.intake_enabled() {
            self.config.poll_enabled_ms
        } else {
            self.config.poll_disabled_ms
        };
        Duration::from_millis(ms)
    }

    fn read(&self) -> Option<(f64, f64)> {
        let torque = self.primary.torque();
        let velocity = self.primary.velocity();
        match (torque, velocity) {
            (Ok(t), Ok(v)) => Some((t, v)),
            (Err(e), _) | (_, Err(e)) => {
                warn!("stall: intake motor read failed: {}", e);
                self.ctx.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }
}

impl ControlLoop for StallDetector {
    fn name(&self) -> &'static str {
        "stall"
    }

    fn tick(&mut self, now: Instant) -> Duration {
        self.ctx.metrics.stall_ticks.fetch_add(1, Ordering::Relaxed);

        // 脉冲进行中：等待结束后停止电机，然后立即重新评估
        if let Some(until) = self.pulse_until {
            if now < until {
                return until - now;
            }
            if let Err(e) = self.primary.set_power(0.0) {
                warn!("stall: failed to end unjam pulse: {}", e);
            }
            self.pulse_until = None;
        }

        let stuck = match self.read() {
            Some((torque, velocity)) => {
                trace!("stall: torque {:.3} velocity {:.2}", torque, velocity);
                is_stuck(torque, velocity, self.ctx.intake_reversed(), &self.config)
            },
            None => false,
        };

        self.ctx.publish_stuck(stuck);
        if stuck {
            debug!("stall: intake stuck, pulsing forward");
            self.ctx.metrics.stall_detections.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.primary.set_power(self.config.pulse_power) {
                warn!("stall: failed to start unjam pulse: {}", e);
            }
            let pulse = Duration::from_millis(self.config.pulse_ms);
            self.pulse_until = Some(now + pulse);
            return pulse;
        }

        self.poll_interval()
    }

    fn on_exit(&mut self) {
        if self.pulse_until.take().is_some() {
            let _ = self.primary.set_power(0.0);
        }
        self.ctx.publish_stuck(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw_power;
    use stakebot_hal::sim::{MotorCommand, SimMotor};

    fn rig() -> (Arc<RobotContext>, Arc<SimMotor>, StallDetector) {
        let ctx = Arc::new(RobotContext::new());
        let motor = Arc::new(SimMotor::new(11));
        let detector = StallDetector::new(ctx.clone(), motor.clone(), StallConfig::default());
        (ctx, motor, detector)
    }

    /// 测试卡死判定：扭矩 0.4、转速 0、未反转 -> 卡死，并输出正转脉冲
    #[test]
    fn test_stuck_triggers_forward_pulse() {
        let (ctx, motor, mut detector) = rig();
        motor.set_feedback(0.4, 0.0);

        let t0 = Instant::now();
        let next = detector.tick(t0);
        assert!(ctx.stuck_active());
        assert_eq!(next, Duration::from_millis(100));
        assert_eq!(motor.last_power(), Some(raw_power(90)));
        assert!(detector.pulsing());

        // 脉冲未结束时不重复下发
        detector.tick(t0 + Duration::from_millis(50));
        assert_eq!(motor.history().len(), 1);

        // 脉冲结束：停止，随后立即重新评估（仍卡死则再次脉冲）
        detector.tick(t0 + Duration::from_millis(100));
        let history = motor.history();
        assert_eq!(history[1].command, MotorCommand::Power(0.0));
        assert_eq!(history[2].command, MotorCommand::Power(raw_power(90)));
        assert_eq!(ctx.metrics.snapshot().stall_detections, 2);
    }

    /// 测试反转时不判定卡死
    #[test]
    fn test_reversed_is_never_stuck() {
        let (ctx, motor, mut detector) = rig();
        motor.set_feedback(0.4, 0.0);
        ctx.set_intake_reversed(true);

        detector.tick(Instant::now());
        assert!(!ctx.stuck_active());
        assert!(motor.history().is_empty());
    }

    /// 测试卡死解除后电平信号复位
    #[test]
    fn test_stuck_is_level_signal() {
        let (ctx, motor, mut detector) = rig();
        motor.set_feedback(0.4, 0.0);
        let t0 = Instant::now();
        detector.tick(t0);
        assert!(ctx.stuck_active());

        motor.set_feedback(0.1, 300.0);
        detector.tick(t0 + Duration::from_millis(100));
        assert!(!ctx.stuck_active());
        assert!(!detector.pulsing());
    }

    #[test]
    fn test_poll_interval_follows_intake() {
        let (ctx, _motor, mut detector) = rig();
        assert_eq!(detector.tick(Instant::now()), Duration::from_millis(150));
        ctx.set_intake_enabled(true);
        assert_eq!(detector.tick(Instant::now()), Duration::from_millis(100));
    }

    #[test]
    fn test_read_failure_is_not_stuck() {
        let (ctx, motor, mut detector) = rig();
        motor.set_feedback(0.4, 0.0);
        motor.inject_fault(stakebot_hal::DeviceErrorKind::Disconnected);
        detector.tick(Instant::now());
        assert!(!ctx.stuck_active());
        assert_eq!(ctx.metrics.snapshot().device_errors, 1);
    }

    #[test]
    fn test_is_stuck_thresholds() {
        let config = StallConfig::default();
        assert!(is_stuck(0.35, 0.5, false, &config));
        assert!(is_stuck(0.35, -0.5, false, &config));
        assert!(!is_stuck(0.34, 0.0, false, &config));
        assert!(!is_stuck(0.5, 1.0, false, &config));
    }
}
