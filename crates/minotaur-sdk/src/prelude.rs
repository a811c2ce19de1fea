//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use minotaur_sdk::prelude::*;
//! ```

pub use crate::builder::{MinotaurBuilder, SimulatorRig};

// 控制层
pub use minotaur_control::{
    Axis, BackendKind, Command, Controller, Currents, Direction, Dispatcher, Key, MinotaurConfig,
    PidGains, Scene, SessionPolicy, SimScene, Vector2f, Vector2i,
};

// 串口层
pub use minotaur_serial::{MockSerialAdapter, SerialAdapter};

// 错误类型
pub use minotaur_control::{ControlError, SolveError};
pub use minotaur_protocol::ProtocolError;
pub use minotaur_serial::SerialError;
