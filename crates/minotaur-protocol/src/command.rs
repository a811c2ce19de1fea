//! 指令码定义
//!
//! 对应 Zaber T-LSR 系列执行器的二进制指令集。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 执行器指令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ZaberCommand {
    /// 回零位
    Home = 1,
    /// 按链路顺序重新分配设备号
    Renumber = 2,
    /// 绝对位置移动
    AbsMove = 20,
    /// 相对位置移动
    RelMove = 21,
    /// 恒速移动
    ConstSpeedMove = 22,
    /// 停止移动
    StopMove = 23,
    /// 设置当前位置
    SetCurrentPosition = 45,
    /// 查询固件版本
    FirmwareVersion = 51,
}

impl ZaberCommand {
    /// 该指令是否会让执行器产生运动
    pub fn is_motion(self) -> bool {
        matches!(
            self,
            ZaberCommand::Home
                | ZaberCommand::AbsMove
                | ZaberCommand::RelMove
                | ZaberCommand::ConstSpeedMove
        )
    }
}
