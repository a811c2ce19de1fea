//! # Minotaur Serial Link Layer
//!
//! 串口硬件抽象层，为 Zaber 执行器提供统一的收发接口。
//!
//! - `MockSerialAdapter`: 无硬件依赖，记录发送帧，可注入应答与故障
//! - `SerialPortAdapter`: 基于 `serialport` crate 的真实串口（`hardware` feature）

use std::time::Duration;
use thiserror::Error;

pub use minotaur_protocol::{ProtocolError, ZaberFrame};

pub mod mock;
pub mod settings;

#[cfg(feature = "hardware")]
pub mod hardware;

pub use mock::{MockSerialAdapter, MockSerialHandle};
pub use settings::{DataBits, FlowControl, Parity, SerialSettings, StopBits};

#[cfg(feature = "hardware")]
pub use hardware::SerialPortAdapter;

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    #[error("Port not open")]
    NotOpen,
    #[error("Link disconnected")]
    Disconnected,
}

impl SerialError {
    /// 是否为致命错误（需要重新打开端口）
    pub fn is_fatal(&self) -> bool {
        matches!(self, SerialError::NotOpen | SerialError::Disconnected)
    }
}

/// 串口适配器接口
///
/// 每条指令一次 `send`，结果即为该指令的成功/失败信号。
pub trait SerialAdapter {
    /// 发送一帧
    fn send(&mut self, frame: ZaberFrame) -> Result<(), SerialError>;

    /// 接收一帧（阻塞直到超时）
    fn receive(&mut self) -> Result<ZaberFrame, SerialError>;

    /// 设置接收超时
    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    /// 带超时接收
    fn receive_timeout(&mut self, timeout: Duration) -> Result<ZaberFrame, SerialError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }

    /// 非阻塞接收
    fn try_receive(&mut self) -> Result<Option<ZaberFrame>, SerialError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(SerialError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 端口名称（用于日志）
    fn port_name(&self) -> &str {
        "unknown"
    }
}

impl<A: SerialAdapter + ?Sized> SerialAdapter for Box<A> {
    fn send(&mut self, frame: ZaberFrame) -> Result<(), SerialError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<ZaberFrame, SerialError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }

    fn port_name(&self) -> &str {
        (**self).port_name()
    }
}
