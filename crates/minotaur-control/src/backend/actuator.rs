//! Zaber 执行器后端
//!
//! 每条指令编码为一帧写入串口。两个轴各对应一个设备号，位移乘以各轴
//! 的步数系数。每条指令的结果（成功/失败）都会通知可选的状态回调。

use super::{Backend, BackendContext, BackendKind};
use crate::error::ControlError;
use crate::geometry::Vector2i;
use crate::scheduler::{TimedAction, millis};
use minotaur_protocol::{
    DEFAULT_STEP_FACTOR, DEFAULT_X_DEVICE, DEFAULT_Y_DEVICE, FirmwareVersion, ZaberCommand,
    ZaberFrame,
};
use minotaur_serial::{SerialAdapter, SerialError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 应答等待时间
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// 串口链路状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    Failed(String),
}

/// 链路状态回调
pub type StatusHook = Arc<dyn Fn(&LinkStatus) + Send + Sync>;

/// 执行器参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// 水平轴设备号
    pub x_device: u8,
    /// 竖直轴设备号
    pub y_device: u8,
    /// 水平轴每单位步数
    pub x_scale: i32,
    /// 竖直轴每单位步数
    pub y_scale: i32,
    /// 恒速移动速度
    pub speed: i32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            x_device: DEFAULT_X_DEVICE,
            y_device: DEFAULT_Y_DEVICE,
            x_scale: DEFAULT_STEP_FACTOR,
            y_scale: DEFAULT_STEP_FACTOR,
            speed: 1000,
        }
    }
}

type SharedLink = Arc<Mutex<Box<dyn SerialAdapter + Send>>>;

/// 串口链路 + 状态回调，可被定时动作持有
#[derive(Clone)]
struct Link {
    port: SharedLink,
    status: Option<StatusHook>,
}

impl Link {
    fn send(&self, frame: ZaberFrame) -> Result<(), SerialError> {
        let result = self.port.lock().send(frame);
        if let Some(hook) = &self.status {
            match &result {
                Ok(()) => hook(&LinkStatus::Ok),
                Err(e) => hook(&LinkStatus::Failed(e.to_string())),
            }
        }
        if let Err(e) = &result {
            error!("Failed to send {:?}: {}", frame, e);
        }
        result
    }

    /// 定时动作中发送，错误已记录并上报
    fn send_detached(&self, frame: ZaberFrame) {
        let _ = self.send(frame);
    }
}

/// 执行器后端
pub struct Actuator {
    link: Link,
    devices: Mutex<(u8, u8)>,
    config: ActuatorConfig,
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("port", &self.link.port.lock().port_name())
            .field("devices", &*self.devices.lock())
            .field("config", &self.config)
            .finish()
    }
}

impl Actuator {
    pub fn new(port: Box<dyn SerialAdapter + Send>, config: ActuatorConfig) -> Self {
        Self {
            link: Link {
                port: Arc::new(Mutex::new(port)),
                status: None,
            },
            devices: Mutex::new((config.x_device, config.y_device)),
            config,
        }
    }

    /// 打开真实串口
    #[cfg(feature = "hardware")]
    pub fn open(
        path: &str,
        settings: &minotaur_serial::SerialSettings,
        config: ActuatorConfig,
    ) -> Result<Self, ControlError> {
        let port = minotaur_serial::SerialPortAdapter::open(path, settings)?;
        Ok(Self::new(Box::new(port), config))
    }

    pub fn with_status_hook(mut self, hook: StatusHook) -> Self {
        self.link.status = Some(hook);
        self
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// 当前 (x, y) 设备号
    pub fn devices(&self) -> (u8, u8) {
        *self.devices.lock()
    }

    /// 交换两轴设备号
    pub fn switch_devices(&self) {
        let mut devices = self.devices.lock();
        *devices = (devices.1, devices.0);
        info!("Actuator devices switched: x = {}, y = {}", devices.0, devices.1);
    }

    /// 广播重新编号
    pub fn renumber(&self) -> Result<(), ControlError> {
        self.link.send(ZaberFrame::renumber())?;
        Ok(())
    }

    /// 两轴回零
    pub fn home(&self) -> Result<(), ControlError> {
        let (x, y) = self.devices();
        self.link.send(ZaberFrame::home(x))?;
        self.link.send(ZaberFrame::home(y))?;
        Ok(())
    }

    /// 两轴停止
    pub fn stop(&self) -> Result<(), ControlError> {
        let (x, y) = self.devices();
        self.link.send(ZaberFrame::stop(x))?;
        self.link.send(ZaberFrame::stop(y))?;
        Ok(())
    }

    pub fn set_current_position(&self, device: u8, position: i32) -> Result<(), ControlError> {
        self.link
            .send(ZaberFrame::set_current_position(device, position))?;
        Ok(())
    }

    /// 查询固件版本
    pub fn firmware_version(&self, device: u8) -> Result<FirmwareVersion, ControlError> {
        self.link.send(ZaberFrame::firmware_version(device))?;
        let reply = self.link.port.lock().receive_timeout(REPLY_TIMEOUT)?;
        let data = reply.expect_reply_to(ZaberCommand::FirmwareVersion)?;
        Ok(FirmwareVersion::from_reply_data(data))
    }

    /// 执行器序号 → (设备号, 方向)
    fn actuation_target(&self, index: i32) -> (u8, i32) {
        let (x, y) = self.devices();
        match index.clamp(0, 3) {
            0 => (x, -1),
            1 => (x, 1),
            2 => (y, 1),
            _ => (y, -1),
        }
    }
}

/// 位移 × 步数系数
fn steps(units: i32, scale: i32) -> Result<i32, ControlError> {
    units.checked_mul(scale).ok_or_else(|| {
        ControlError::InvalidInput(format!("{} units x {} steps overflows", units, scale))
    })
}

impl Backend for Actuator {
    fn kind(&self) -> BackendKind {
        BackendKind::Actuator
    }

    fn perform_move(
        &self,
        _ctx: &BackendContext<'_>,
        vector: Vector2i,
        duration_ms: i64,
    ) -> Result<(), ControlError> {
        let (x, y) = self.devices();
        debug!("actuator move {:?} ({} ms hint)", vector, duration_ms);
        // 两轴都先换算，溢出时一帧都不发
        let x_steps = steps(vector.x, self.config.x_scale)?;
        let y_steps = steps(vector.y, self.config.y_scale)?;
        if x_steps != 0 {
            self.link.send(ZaberFrame::relative_move(x, x_steps))?;
        }
        if y_steps != 0 {
            self.link.send(ZaberFrame::relative_move(y, y_steps))?;
        }
        Ok(())
    }

    fn perform_actuation(
        &self,
        ctx: &BackendContext<'_>,
        index: i32,
        duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError> {
        let (device, sign) = self.actuation_target(index);
        let start = ZaberFrame::constant_speed(device, sign * self.config.speed);
        let stop = ZaberFrame::stop(device);
        let end_link = self.link.clone();

        if delay_ms <= 0 {
            self.link.send(start)?;
            ctx.scheduler
                .submit(TimedAction::once(millis(duration_ms), move || {
                    end_link.send_detached(stop)
                }))?;
        } else {
            let start_link = self.link.clone();
            ctx.scheduler.submit(TimedAction::from_millis(
                delay_ms,
                duration_ms,
                move || start_link.send_detached(start),
                move || end_link.send_detached(stop),
            ))?;
        }
        Ok(())
    }

    fn perform_move_to(
        &self,
        ctx: &BackendContext<'_>,
        x: f64,
        y: f64,
        _duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError> {
        let (x_device, y_device) = self.devices();
        let frames = [
            ZaberFrame::absolute_move(x_device, (x * self.config.x_scale as f64).round() as i32),
            ZaberFrame::absolute_move(y_device, (y * self.config.y_scale as f64).round() as i32),
        ];

        if delay_ms <= 0 {
            for frame in frames {
                self.link.send(frame)?;
            }
        } else {
            let link = self.link.clone();
            ctx.scheduler
                .submit(TimedAction::once(millis(delay_ms), move || {
                    frames.into_iter().for_each(|f| link.send_detached(f))
                }))?;
        }
        Ok(())
    }

    fn as_actuator(&self) -> Option<&Actuator> {
        Some(self)
    }
}
