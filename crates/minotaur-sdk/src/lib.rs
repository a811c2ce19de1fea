//! Minotaur SDK - SAM 磁驱机器人 Rust SDK
//!
//! SAM 没有自己的驱动，完全靠四个固定线圈的电磁力移动。本 SDK 提供：
//!
//! - **协议层** (`protocol`): Zaber 执行器二进制指令
//! - **串口层** (`serial`): 串口抽象、Mock 与真实串口
//! - **控制层** (`control`): PID、逆解、定时动作、控制器与两种后端
//!
//! # 快速开始
//!
//! ```rust
//! use minotaur_sdk::prelude::*;
//!
//! let rig = MinotaurBuilder::new().build_simulator().unwrap();
//! let dispatcher = Dispatcher::with_controller(rig.controller.clone());
//!
//! assert!(dispatcher.send_actuation(0, 100, 0));
//! assert!(rig.controller.is_key_down(Key::Left));
//! ```

pub mod builder;
pub mod logging;
pub mod prelude;

pub use minotaur_control as control;
pub use minotaur_protocol as protocol;
pub use minotaur_serial as serial;

pub use builder::{MinotaurBuilder, SimulatorRig};
pub use logging::{LoggerError, init_logger, try_init_logger, try_init_logger_with};

pub use minotaur_control::{
    Command, ControlError, Controller, Dispatcher, MinotaurConfig, SolveError, dispatch,
};
pub use minotaur_protocol::ProtocolError;
pub use minotaur_serial::SerialError;
