//! 协议常量定义

/// 帧总长度（字节）
pub const FRAME_SIZE: usize = 6;

/// 帧头长度：设备号 + 指令码
pub const CMD_SIZE: usize = 2;

/// 数据字段长度
pub const DATA_SIZE: usize = 4;

/// 广播设备号（所有设备都会响应）
pub const BROADCAST_DEVICE: u8 = 0;

/// 默认的水平轴设备号
pub const DEFAULT_X_DEVICE: u8 = 1;

/// 默认的垂直轴设备号
pub const DEFAULT_Y_DEVICE: u8 = 2;

/// 默认每单位位移对应的微步数
pub const DEFAULT_STEP_FACTOR: i32 = 5;
