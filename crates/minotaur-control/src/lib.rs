//! # Minotaur Control
//!
//! SAM 磁驱机器人的运动控制核心。SAM 只能通过改变四个固定线圈
//! （上、下、左、右）的电流来移动，既可以连接真实的 Zaber 执行器，也可以
//! 在物理模拟中运行。
//!
//! ## 模块
//!
//! - `geometry`: 二维向量、方向、坐标轴
//! - `solenoid` / `solver`: 线圈场模型与速度 → 电流逆解
//! - `pid` / `session`: PID 控制器与 moveTo 闭环会话
//! - `scheduler`: 延时 + 持续时间的定时动作
//! - `keyboard`: 手动操控按键状态
//! - `controller` / `backend`: 控制器与模拟器、执行器两种后端
//! - `scene`: 物理场景接口与参考实现
//! - `dispatch`: 面向自动化方的指令入口
//! - `config`: TOML 配置
//!
//! ## 数据流
//!
//! ```text
//! Dispatcher → Controller → Backend
//!     Simulator: TimedAction（按键）/ MoveToSession（PID → 逆解 → 线圈）
//!     Actuator:  ZaberFrame → SerialAdapter
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod keyboard;
pub mod pid;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod solenoid;
pub mod solver;

pub use backend::{
    ACTUATION_KEYS, Actuator, ActuatorConfig, Backend, BackendContext, BackendKind, LinkStatus,
    POSITION_UNIT_M, Simulator, StatusHook,
};
pub use config::MinotaurConfig;
pub use controller::Controller;
pub use dispatch::{Command, DEFAULT_DURATION_MS, Dispatcher, dispatch, try_dispatch};
pub use error::{ConfigError, ControlError, ParseCommandError, SolveError};
pub use geometry::{Axis, Direction, Vector2, Vector2f, Vector2i, direction_vector};
pub use keyboard::{Key, KeyboardState};
pub use pid::{PidController, PidGains};
pub use scene::{PhysicsLoop, SamState, Scene, SceneParams, SimScene};
pub use scheduler::{Scheduler, TaskHandle, TaskStatus, TimedAction};
pub use session::{
    DriveMode, MoveToSession, SessionConfig, SessionOutcome, SessionPolicy, SessionSlot,
};
pub use solenoid::{CoilGeometry, CoilSlot, Solenoid};
pub use solver::{Currents, InverseSolver};
