//! 控制层错误类型定义

use minotaur_protocol::ProtocolError;
use minotaur_serial::SerialError;
use thiserror::Error;

/// 逆解求解错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// 线性方程组接近奇异，结果数值不稳定
    #[error("Degenerate coil system at this position (determinant {determinant:e})")]
    Degenerate { determinant: f64 },

    /// 机器人位于线圈中心，场方向无定义
    #[error("Robot coincides with solenoid {index}")]
    CoincidentCoil { index: usize },

    /// 输入非法（非有限值或时间步长非正）
    #[error("Invalid solver input: {0}")]
    InvalidInput(String),
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 文本指令解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing argument '{argument}' for {command}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Too many arguments for {0}")]
    TooManyArguments(&'static str),
}

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// 当前没有绑定任何后端
    #[error("No backend bound")]
    UnboundBackend,

    /// 该能力仅模拟器后端提供
    #[error("Operation requires the simulator backend")]
    NotSimulator,

    /// 参数超出可执行范围（溢出、非有限值）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 已有 moveTo 会话在运行（Reject 策略）
    #[error("A move-to session is already in flight")]
    SessionBusy,

    /// 串口链路错误
    #[error("Serial link error: {0}")]
    Serial(#[from] SerialError),

    /// 协议错误（应答无法解析）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 逆解失败
    #[error("Solver error: {0}")]
    Solve(#[from] SolveError),

    /// 线程启动失败
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    /// 调度线程已退出
    #[error("Scheduler is shut down")]
    SchedulerClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        assert_eq!(ControlError::UnboundBackend.to_string(), "No backend bound");
        assert_eq!(
            ControlError::NotSimulator.to_string(),
            "Operation requires the simulator backend"
        );

        let err = ControlError::InvalidInput("kp = inf".to_string());
        assert_eq!(err.to_string(), "Invalid input: kp = inf");

        let err = ControlError::Spawn("out of threads".to_string());
        assert!(err.to_string().contains("out of threads"));
    }

    #[test]
    fn test_from_solve_error() {
        let err: ControlError = SolveError::Degenerate { determinant: 0.0 }.into();
        match err {
            ControlError::Solve(SolveError::Degenerate { determinant }) => {
                assert_eq!(determinant, 0.0)
            },
            _ => panic!("Expected Solve variant"),
        }
    }

    #[test]
    fn test_from_serial_error() {
        let err: ControlError = SerialError::Disconnected.into();
        assert!(matches!(err, ControlError::Serial(SerialError::Disconnected)));
    }

    #[test]
    fn test_solve_error_display() {
        let msg = SolveError::CoincidentCoil { index: 2 }.to_string();
        assert!(msg.contains("solenoid 2"));
    }
}
