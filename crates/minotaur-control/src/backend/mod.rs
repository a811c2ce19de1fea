//! 控制后端
//!
//! 两种后端实现同一组能力：
//!
//! - [`Simulator`]：虚拟 SAM，按键模拟 + PID 闭环
//! - [`Actuator`]：Zaber 串口执行器
//!
//! 后端在配置时选定，通过 [`Controller`](crate::controller::Controller) 调用。

pub mod actuator;
pub mod simulator;

pub use actuator::{Actuator, ActuatorConfig, LinkStatus, StatusHook};
pub use simulator::{ACTUATION_KEYS, POSITION_UNIT_M, Simulator};

use crate::error::ControlError;
use crate::geometry::Vector2i;
use crate::keyboard::KeyboardState;
use crate::scheduler::Scheduler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Simulator,
    Actuator,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Simulator => write!(f, "simulator"),
            BackendKind::Actuator => write!(f, "actuator"),
        }
    }
}

/// 后端执行时可用的共享资源
#[derive(Debug, Clone, Copy)]
pub struct BackendContext<'a> {
    pub keyboard: &'a Arc<KeyboardState>,
    pub scheduler: &'a Scheduler,
}

/// 后端能力接口
///
/// 所有方法都不阻塞到动作完成；需要持续的动作交给调度器或独立线程。
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 按向量移动，`duration_ms` 为持续时间提示
    fn perform_move(
        &self,
        ctx: &BackendContext<'_>,
        vector: Vector2i,
        duration_ms: i64,
    ) -> Result<(), ControlError>;

    /// 触发第 `index` 个执行器
    fn perform_actuation(
        &self,
        ctx: &BackendContext<'_>,
        index: i32,
        duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError>;

    /// 移动到 (x, y)，默认不支持（空操作）
    fn perform_move_to(
        &self,
        _ctx: &BackendContext<'_>,
        _x: f64,
        _y: f64,
        _duration_ms: i64,
        _delay_ms: i64,
    ) -> Result<(), ControlError> {
        Ok(())
    }

    /// 模拟器专有能力
    fn as_simulator(&self) -> Option<&Simulator> {
        None
    }

    /// 执行器专有能力
    fn as_actuator(&self) -> Option<&Actuator> {
        None
    }
}
