//! PID Controller - 比例-积分-微分控制器
//!
//! 两轴（x, y）位置控制，输出为期望速度。
//!
//! # 算法
//!
//! ```text
//! u = Kp * e + Ki * ∫e dt + Kd * de/dt
//! ```
//!
//! 其中：
//! - `e` = 目标位置 - 当前位置（误差）
//! - `∫e dt` 用梯形法累积，`dt` 为两次采样之间**实测**的时间
//! - `de/dt` = (e_new - e_old) / dt
//!
//! # 零 dt
//!
//! 两次采样时间相同（dt = 0）时，本次不更新积分和微分，只记录新误差，
//! 并输出 warn 日志。
//!
//! # 示例
//!
//! ```rust
//! use minotaur_control::geometry::Vector2f;
//! use minotaur_control::pid::{PidController, PidGains};
//! use std::time::Duration;
//!
//! let mut pid = PidController::new(Vector2f::new(0.04, 0.0), Vector2f::ZERO)
//!     .with_gains(PidGains::new(2.0, 0.0, 0.0));
//! let u = pid.output();
//! assert!(u.x > 0.0);
//!
//! pid.update(Vector2f::new(0.01, 0.0), Duration::from_millis(10));
//! ```

use crate::geometry::Vector2f;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    /// 比例增益 (Kp)
    pub kp: f64,
    /// 积分增益 (Ki)
    pub ki: f64,
    /// 微分增益 (Kd)
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// 两轴 PID 控制器
#[derive(Debug, Clone)]
pub struct PidController {
    /// 目标位置
    target: Vector2f,

    gains: PidGains,

    /// 积分项累积值
    integral: Vector2f,

    /// 最近一次计算的微分
    derivative: Vector2f,

    /// 上一次的误差
    last_error: Vector2f,

    /// 积分项限制（防止积分饱和）
    integral_limit: f64,
}

impl PidController {
    /// 创建 PID 控制器
    ///
    /// 初始误差由 `position` 计算，积分与微分为零。
    /// 默认增益见 [`PidGains::default`]，积分不限幅。
    pub fn new(target: Vector2f, position: Vector2f) -> Self {
        PidController {
            target,
            gains: PidGains::default(),
            integral: Vector2f::ZERO,
            derivative: Vector2f::ZERO,
            last_error: target - position,
            integral_limit: f64::INFINITY,
        }
    }

    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = gains;
        self
    }

    /// 设置积分项限制
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    pub fn target(&self) -> Vector2f {
        self.target
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> Vector2f {
        self.integral
    }

    pub fn derivative(&self) -> Vector2f {
        self.derivative
    }

    /// 当前误差
    pub fn error(&self) -> Vector2f {
        self.last_error
    }

    /// 控制量 u
    pub fn output(&self) -> Vector2f {
        self.last_error * self.gains.kp
            + self.integral * self.gains.ki
            + self.derivative * self.gains.kd
    }

    /// 用新采样的位置更新误差、积分和微分
    pub fn update(&mut self, position: Vector2f, dt: Duration) {
        let error = self.target - position;
        let dt_sec = dt.as_secs_f64();

        // 防止除零
        if dt_sec <= 0.0 {
            tracing::warn!(
                "PID update with zero measured dt, skipping integral/derivative"
            );
            self.last_error = error;
            return;
        }

        // 梯形积分 + 饱和保护
        let limit = self.integral_limit;
        let integral = self.integral + (self.last_error + error) * (0.5 * dt_sec);
        self.integral = Vector2f::new(
            integral.x.clamp(-limit, limit),
            integral.y.clamp(-limit, limit),
        );

        self.derivative = (error - self.last_error) * (1.0 / dt_sec);
        self.last_error = error;
    }

    /// 清零积分和微分，误差按 `position` 重新计算
    pub fn reset(&mut self, position: Vector2f) {
        self.integral = Vector2f::ZERO;
        self.derivative = Vector2f::ZERO;
        self.last_error = self.target - position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pid_new() {
        let pid = PidController::new(Vector2f::new(1.0, 2.0), Vector2f::new(0.5, 0.0));
        assert_eq!(pid.gains(), PidGains::new(1.0, 0.0, 0.0));
        assert_eq!(pid.error(), Vector2f::new(0.5, 2.0));
        assert_eq!(pid.integral(), Vector2f::ZERO);
        assert_eq!(pid.derivative(), Vector2f::ZERO);
    }

    #[test]
    fn test_pid_proportional_only() {
        let pid = PidController::new(Vector2f::new(1.0, -1.0), Vector2f::new(0.5, 0.0))
            .with_gains(PidGains::new(10.0, 0.0, 0.0));

        // 误差 = (0.5, -1.0)，输出 = 10 * 误差
        let u = pid.output();
        assert_relative_eq!(u.x, 5.0, epsilon = 1e-12);
        assert_relative_eq!(u.y, -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pid_trapezoidal_integral() {
        let mut pid = PidController::new(Vector2f::new(1.0, 0.0), Vector2f::ZERO)
            .with_gains(PidGains::new(0.0, 1.0, 0.0));

        // 误差 1.0 → 0.5，dt = 0.1：积分 = (1.0 + 0.5) / 2 * 0.1 = 0.075
        pid.update(Vector2f::new(0.5, 0.0), Duration::from_millis(100));
        assert_relative_eq!(pid.integral().x, 0.075, epsilon = 1e-12);
        assert_relative_eq!(pid.output().x, 0.075, epsilon = 1e-12);

        // 误差保持 0.5：积分 += 0.5 * 0.1
        pid.update(Vector2f::new(0.5, 0.0), Duration::from_millis(100));
        assert_relative_eq!(pid.integral().x, 0.125, epsilon = 1e-12);
    }

    #[test]
    fn test_pid_uses_measured_dt() {
        let mut a = PidController::new(Vector2f::new(1.0, 0.0), Vector2f::ZERO)
            .with_gains(PidGains::new(0.0, 1.0, 1.0));
        let mut b = a.clone();

        a.update(Vector2f::new(0.5, 0.0), Duration::from_millis(10));
        b.update(Vector2f::new(0.5, 0.0), Duration::from_millis(13));

        assert_relative_eq!(a.derivative().x, -50.0, epsilon = 1e-9);
        assert_relative_eq!(b.derivative().x, -0.5 / 0.013, epsilon = 1e-9);
        assert!(b.integral().x > a.integral().x);
    }

    #[test]
    fn test_pid_integral_saturation() {
        let mut pid = PidController::new(Vector2f::new(1.0, 1.0), Vector2f::ZERO)
            .with_gains(PidGains::new(0.0, 1.0, 0.0))
            .with_integral_limit(0.5);

        for _ in 0..10 {
            pid.update(Vector2f::ZERO, Duration::from_secs(1));
        }

        assert_relative_eq!(pid.integral().x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(pid.integral().y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_pid_zero_dt_skips_integral_and_derivative() {
        let mut pid = PidController::new(Vector2f::new(1.0, 0.0), Vector2f::ZERO)
            .with_gains(PidGains::new(1.0, 1.0, 1.0));
        pid.update(Vector2f::new(0.2, 0.0), Duration::from_millis(100));
        let integral = pid.integral();
        let derivative = pid.derivative();

        pid.update(Vector2f::new(0.6, 0.0), Duration::ZERO);

        // 积分、微分保持不变，误差更新，输出有限
        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.derivative(), derivative);
        assert_relative_eq!(pid.error().x, 0.4, epsilon = 1e-12);
        assert!(pid.output().is_finite());
    }

    #[test]
    fn test_pid_reset() {
        let mut pid = PidController::new(Vector2f::new(1.0, 0.0), Vector2f::ZERO)
            .with_gains(PidGains::new(1.0, 1.0, 1.0));
        pid.update(Vector2f::new(0.5, 0.0), Duration::from_secs(1));
        assert!(pid.integral().x != 0.0);

        pid.reset(Vector2f::new(0.25, 0.0));
        assert_eq!(pid.integral(), Vector2f::ZERO);
        assert_eq!(pid.derivative(), Vector2f::ZERO);
        assert_relative_eq!(pid.error().x, 0.75, epsilon = 1e-12);
    }
}
