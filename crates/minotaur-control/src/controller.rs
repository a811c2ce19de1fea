//! 控制器
//!
//! 持有一个后端、按键状态、轴反向系数和定时动作调度器。所有方法都可以
//! 跨线程并发调用。

use crate::backend::{Actuator, Backend, BackendContext, BackendKind, Simulator};
use crate::error::ControlError;
use crate::geometry::{Axis, Direction, Vector2i, direction_vector};
use crate::keyboard::{Key, KeyboardState};
use crate::scheduler::Scheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// 控制器
pub struct Controller {
    backend: Box<dyn Backend>,
    keyboard: Arc<KeyboardState>,
    invert_x: AtomicI32,
    invert_y: AtomicI32,
    scheduler: Scheduler,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("backend", &self.backend.kind())
            .field("inversion", &self.inversion())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// 反向系数只取 ±1
fn sign_of(value: i32) -> i32 {
    if value < 0 { -1 } else { 1 }
}

impl Controller {
    /// 创建控制器并启动调度线程
    pub fn new(
        backend: Box<dyn Backend>,
        keyboard: Arc<KeyboardState>,
    ) -> Result<Self, ControlError> {
        info!("Controller created with {} backend", backend.kind());
        Ok(Self {
            backend,
            keyboard,
            invert_x: AtomicI32::new(1),
            invert_y: AtomicI32::new(1),
            scheduler: Scheduler::new()?,
        })
    }

    /// 设置初始反向系数（负数为 -1，其余为 +1）
    pub fn with_inversion(self, x: i32, y: i32) -> Self {
        self.invert_x.store(sign_of(x), Ordering::Release);
        self.invert_y.store(sign_of(y), Ordering::Release);
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn keyboard(&self) -> &Arc<KeyboardState> {
        &self.keyboard
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 模拟器专有能力
    pub fn as_simulator(&self) -> Option<&Simulator> {
        self.backend.as_simulator()
    }

    /// 执行器专有能力
    pub fn as_actuator(&self) -> Option<&Actuator> {
        self.backend.as_actuator()
    }

    fn context(&self) -> BackendContext<'_> {
        BackendContext {
            keyboard: &self.keyboard,
            scheduler: &self.scheduler,
        }
    }

    /// 当前 (x, y) 反向系数
    pub fn inversion(&self) -> (i32, i32) {
        (
            self.invert_x.load(Ordering::Acquire),
            self.invert_y.load(Ordering::Acquire),
        )
    }

    /// 沿方向移动
    pub fn move_direction(
        &self,
        direction: Direction,
        duration_ms: i64,
    ) -> Result<(), ControlError> {
        self.move_by(direction.to_vector(), duration_ms)
    }

    /// 沿原始方向值移动，非法值按零向量处理
    pub fn move_raw_direction(&self, raw: i32, duration_ms: i64) -> Result<(), ControlError> {
        self.move_by(direction_vector(raw), duration_ms)
    }

    /// 按向量移动（先应用轴反向）
    ///
    /// 反向后溢出（`i32::MIN` 取反）返回 `InvalidInput`。
    pub fn move_by(&self, vector: Vector2i, duration_ms: i64) -> Result<(), ControlError> {
        let (ix, iy) = self.inversion();
        let overflow = || ControlError::InvalidInput(format!("move vector {:?} overflows", vector));
        let vector = Vector2i::new(
            vector.x.checked_mul(ix).ok_or_else(overflow)?,
            vector.y.checked_mul(iy).ok_or_else(overflow)?,
        );
        self.backend
            .perform_move(&self.context(), vector, duration_ms)
    }

    /// 移动到 (x, y)
    pub fn move_to(
        &self,
        x: f64,
        y: f64,
        duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError> {
        self.backend
            .perform_move_to(&self.context(), x, y, duration_ms, delay_ms)
    }

    /// 触发第 `index` 个执行器
    pub fn actuate(&self, index: i32, duration_ms: i64, delay_ms: i64) -> Result<(), ControlError> {
        self.backend
            .perform_actuation(&self.context(), index, duration_ms, delay_ms)
    }

    /// 翻转一个轴的方向
    pub fn invert_axis(&self, axis: Axis) {
        let slot = match axis {
            Axis::X => &self.invert_x,
            Axis::Y => &self.invert_y,
        };
        slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(-sign_of(v)))
            .ok();
    }

    /// 按原始值翻转，非法值记录 error 日志后忽略
    pub fn invert_axis_raw(&self, raw: i32) {
        match Axis::from_raw(raw) {
            Some(axis) => self.invert_axis(axis),
            None => error!("Invalid axis specified for inversion: {}", raw),
        }
    }

    pub fn key_pressed(&self, key: Key) {
        self.keyboard.press(key);
    }

    pub fn key_released(&self, key: Key) {
        self.keyboard.release(key);
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.keyboard.is_down(key)
    }

    pub fn suspend_keyboard(&self, suspend: bool) {
        self.keyboard.set_suspended(suspend);
    }

    /// 等待所有定时动作和 moveTo 会话结束
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        if !self.scheduler.wait_idle(timeout) {
            return false;
        }
        match self.as_simulator() {
            Some(sim) => sim.wait_sessions(deadline.saturating_duration_since(Instant::now())),
            None => true,
        }
    }
}
