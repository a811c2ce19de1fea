//! 真实串口后端
//!
//! 基于 `serialport` crate。打开失败时直接返回错误，由上层通过状态回调上报。

use crate::settings::{DataBits, FlowControl, Parity, SerialSettings, StopBits};
use crate::{SerialAdapter, SerialError};
use minotaur_protocol::{FRAME_SIZE, ZaberFrame};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// 串口适配器
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl std::fmt::Debug for SerialPortAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortAdapter").field("name", &self.name).finish()
    }
}

impl SerialPortAdapter {
    /// 打开串口
    ///
    /// # 错误
    ///
    /// - `SerialError::Device`: 端口不存在、被占用或参数不受支持
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self, SerialError> {
        info!(
            "Opening serial port {} @ {} baud",
            path, settings.baud_rate
        );

        let port = serialport::new(path, settings.baud_rate)
            .data_bits(match settings.data_bits {
                DataBits::Five => serialport::DataBits::Five,
                DataBits::Six => serialport::DataBits::Six,
                DataBits::Seven => serialport::DataBits::Seven,
                DataBits::Eight => serialport::DataBits::Eight,
            })
            .parity(match settings.parity {
                Parity::None => serialport::Parity::None,
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
            })
            .stop_bits(match settings.stop_bits {
                StopBits::One => serialport::StopBits::One,
                StopBits::Two => serialport::StopBits::Two,
            })
            .flow_control(match settings.flow_control {
                FlowControl::None => serialport::FlowControl::None,
                FlowControl::Software => serialport::FlowControl::Software,
                FlowControl::Hardware => serialport::FlowControl::Hardware,
            })
            .timeout(settings.read_timeout())
            .open()
            .map_err(|e| SerialError::Device(format!("{}: {}", path, e)))?;

        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    /// 列出系统中可用的串口
    pub fn available_ports() -> Result<Vec<String>, SerialError> {
        let ports = serialport::available_ports().map_err(|e| SerialError::Device(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn send(&mut self, frame: ZaberFrame) -> Result<(), SerialError> {
        let bytes = frame.to_bytes();
        debug!("serial tx {}: {:?}", self.name, bytes);
        self.port.write_all(&bytes).map_err(map_io_error)?;
        self.port.flush().map_err(map_io_error)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<ZaberFrame, SerialError> {
        let mut buf = [0u8; FRAME_SIZE];
        self.port.read_exact(&mut buf).map_err(map_io_error)?;
        debug!("serial rx {}: {:?}", self.name, buf);
        Ok(ZaberFrame::from_bytes(&buf)?)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.port.set_timeout(timeout) {
            tracing::warn!("Failed to set serial timeout on {}: {}", self.name, e);
        }
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

fn map_io_error(e: std::io::Error) -> SerialError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => SerialError::Timeout,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            SerialError::Disconnected
        },
        _ => SerialError::Io(e),
    }
}
