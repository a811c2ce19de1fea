//! # Minotaur Protocol
//!
//! Zaber 线性执行器二进制串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（帧长度、广播地址、设备号）
//! - `command`: 指令码定义
//!
//! ## 帧格式
//!
//! ```text
//! [device:1][command:1][data:4]
//! ```
//!
//! 数据字段为 4 字节有符号整数，低位在前（小端字节序）。
//! 执行器的应答帧使用相同格式，`command` 字段回显请求的指令码。

pub mod command;
pub mod constants;

pub use command::ZaberCommand;
pub use constants::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unknown command code: {code}")]
    UnknownCommand { code: u8 },

    #[error("Unexpected reply: expected command {expected}, got {actual}")]
    UnexpectedReply { expected: u8, actual: u8 },
}

/// 串口指令帧
///
/// 请求与应答共用此结构。`command` 保留原始字节，因为应答帧中可能出现
/// 本 crate 未定义的指令码（例如错误码 255），这类帧仍需能够被解析与记录。
///
/// # 示例
///
/// ```rust
/// use minotaur_protocol::{ZaberCommand, ZaberFrame};
///
/// let frame = ZaberFrame::new(1, ZaberCommand::RelMove, 500);
/// assert_eq!(frame.to_bytes(), [1, 21, 0xF4, 0x01, 0x00, 0x00]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZaberFrame {
    /// 设备号（0 为广播）
    pub device: u8,

    /// 指令码（原始字节）
    pub command: u8,

    /// 数据字段
    pub data: i32,
}

impl ZaberFrame {
    /// 构建请求帧
    pub fn new(device: u8, command: ZaberCommand, data: i32) -> Self {
        Self {
            device,
            command: command.into(),
            data,
        }
    }

    /// 回零位
    pub fn home(device: u8) -> Self {
        Self::new(device, ZaberCommand::Home, 0)
    }

    /// 重新编号（总是广播）
    pub fn renumber() -> Self {
        Self::new(BROADCAST_DEVICE, ZaberCommand::Renumber, 0)
    }

    /// 绝对位置移动（单位：微步）
    pub fn absolute_move(device: u8, position: i32) -> Self {
        Self::new(device, ZaberCommand::AbsMove, position)
    }

    /// 相对位置移动（单位：微步）
    pub fn relative_move(device: u8, steps: i32) -> Self {
        Self::new(device, ZaberCommand::RelMove, steps)
    }

    /// 恒速移动，符号决定方向
    pub fn constant_speed(device: u8, speed: i32) -> Self {
        Self::new(device, ZaberCommand::ConstSpeedMove, speed)
    }

    /// 停止移动
    pub fn stop(device: u8) -> Self {
        Self::new(device, ZaberCommand::StopMove, 0)
    }

    /// 设置当前位置（不移动）
    pub fn set_current_position(device: u8, position: i32) -> Self {
        Self::new(device, ZaberCommand::SetCurrentPosition, position)
    }

    /// 查询固件版本
    pub fn firmware_version(device: u8) -> Self {
        Self::new(device, ZaberCommand::FirmwareVersion, 0)
    }

    /// 编码为 6 字节线路格式
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = self.device;
        bytes[1] = self.command;
        bytes[CMD_SIZE..].copy_from_slice(&i32_to_bytes_le(self.data));
        bytes
    }

    /// 从线路字节解码
    ///
    /// # 错误
    ///
    /// - `ProtocolError::InvalidLength`: 长度不是 6 字节
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != FRAME_SIZE {
            return Err(ProtocolError::InvalidLength {
                expected: FRAME_SIZE,
                actual: bytes.len(),
            });
        }

        let mut data = [0u8; DATA_SIZE];
        data.copy_from_slice(&bytes[CMD_SIZE..]);

        Ok(Self {
            device: bytes[0],
            command: bytes[1],
            data: bytes_to_i32_le(data),
        })
    }

    /// 获取类型化的指令码
    pub fn command(&self) -> Result<ZaberCommand, ProtocolError> {
        ZaberCommand::try_from(self.command)
            .map_err(|_| ProtocolError::UnknownCommand { code: self.command })
    }

    /// 是否为广播帧
    pub fn is_broadcast(&self) -> bool {
        self.device == BROADCAST_DEVICE
    }

    /// 校验应答帧是否回显了预期的指令
    pub fn expect_reply_to(&self, command: ZaberCommand) -> Result<i32, ProtocolError> {
        let expected: u8 = command.into();
        if self.command != expected {
            return Err(ProtocolError::UnexpectedReply {
                expected,
                actual: self.command,
            });
        }
        Ok(self.data)
    }
}

/// 固件版本
///
/// 执行器以 `版本号 * 100` 的整数形式返回固件版本（例如 `602` 表示 6.02）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
}

impl FirmwareVersion {
    /// 从应答数据字段解析
    pub fn from_reply_data(data: i32) -> Self {
        let raw = data.unsigned_abs();
        Self {
            major: raw / 100,
            minor: raw % 100,
        }
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// i32 转小端字节序
pub fn i32_to_bytes_le(value: i32) -> [u8; DATA_SIZE] {
    value.to_le_bytes()
}

/// 小端字节序转 i32
pub fn bytes_to_i32_le(bytes: [u8; DATA_SIZE]) -> i32 {
    i32::from_le_bytes(bytes)
}
