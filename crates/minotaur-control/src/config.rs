//! TOML 配置
//!
//! 所有字段都有默认值，缺省的表或字段按默认值处理：
//!
//! ```toml
//! [controller]
//! invert_x = 1
//! invert_y = -1
//!
//! [pid]
//! kp = 2.0
//! drive = "solver"
//! policy = "preempt"
//!
//! [geometry]
//! separation = 0.3
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! ```

use crate::backend::ActuatorConfig;
use crate::error::ConfigError;
use crate::pid::PidGains;
use crate::scene::SceneParams;
use crate::session::{DriveMode, SessionConfig, SessionPolicy};
use crate::solenoid::CoilGeometry;
use minotaur_protocol::{DEFAULT_STEP_FACTOR, DEFAULT_X_DEVICE, DEFAULT_Y_DEVICE};
use minotaur_serial::SerialSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub invert_x: i32,
    pub invert_y: i32,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            invert_x: 1,
            invert_y: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidSection {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub tick_ms: u64,
    pub amplification: f64,
    pub max_current: f64,
    pub drive: DriveMode,
    pub policy: SessionPolicy,
}

impl Default for PidSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            kp: session.gains.kp,
            ki: session.gains.ki,
            kd: session.gains.kd,
            tick_ms: session.tick.as_millis() as u64,
            amplification: session.amplification,
            max_current: session.max_current,
            drive: session.drive,
            policy: SessionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometrySection {
    pub separation: f64,
    pub coil_radius: f64,
    pub turns: u32,
    pub coil_length: f64,
    pub permeability: f64,
    pub sam_mass: f64,
    pub damping: f64,
    pub friction: f64,
    pub manual_current: f64,
}

impl Default for GeometrySection {
    fn default() -> Self {
        let scene = SceneParams::default();
        Self {
            separation: scene.geometry.separation,
            coil_radius: scene.geometry.coil_radius,
            turns: scene.geometry.turns,
            coil_length: scene.geometry.coil_length,
            permeability: scene.geometry.permeability,
            sam_mass: scene.mass,
            damping: scene.damping,
            friction: scene.friction,
            manual_current: scene.manual_current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub x_device: u8,
    pub y_device: u8,
    pub x_scale: i32,
    pub y_scale: i32,
    pub speed: i32,
    pub read_timeout_ms: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        let settings = SerialSettings::default();
        Self {
            port: None,
            baud_rate: settings.baud_rate,
            x_device: DEFAULT_X_DEVICE,
            y_device: DEFAULT_Y_DEVICE,
            x_scale: DEFAULT_STEP_FACTOR,
            y_scale: DEFAULT_STEP_FACTOR,
            speed: ActuatorConfig::default().speed,
            read_timeout_ms: settings.read_timeout_ms,
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MinotaurConfig {
    pub controller: ControllerSection,
    pub pid: PidSection,
    pub geometry: GeometrySection,
    pub serial: SerialSection,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {}", value)))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be non-negative, got {}", value)))
    }
}

impl MinotaurConfig {
    /// 解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("controller.invert_x", self.controller.invert_x),
            ("controller.invert_y", self.controller.invert_y),
        ] {
            if value != 1 && value != -1 {
                return Err(invalid(field, format!("must be 1 or -1, got {}", value)));
            }
        }

        let pid = &self.pid;
        for (field, value) in [("pid.kp", pid.kp), ("pid.ki", pid.ki), ("pid.kd", pid.kd)] {
            if !value.is_finite() {
                return Err(invalid(field, "must be finite"));
            }
        }
        if pid.tick_ms == 0 {
            return Err(invalid("pid.tick_ms", "must be at least 1"));
        }
        positive("pid.amplification", pid.amplification)?;
        positive("pid.max_current", pid.max_current)?;

        let g = &self.geometry;
        positive("geometry.separation", g.separation)?;
        positive("geometry.coil_radius", g.coil_radius)?;
        positive("geometry.coil_length", g.coil_length)?;
        positive("geometry.permeability", g.permeability)?;
        positive("geometry.sam_mass", g.sam_mass)?;
        non_negative("geometry.damping", g.damping)?;
        non_negative("geometry.friction", g.friction)?;
        non_negative("geometry.manual_current", g.manual_current)?;
        if g.turns == 0 {
            return Err(invalid("geometry.turns", "must be at least 1"));
        }
        if g.coil_length / 2.0 >= g.separation {
            return Err(invalid(
                "geometry.coil_length",
                "coils would overlap the scene centre",
            ));
        }

        let s = &self.serial;
        if s.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be positive"));
        }
        if s.x_device == s.y_device {
            return Err(invalid("serial.y_device", "must differ from x_device"));
        }
        Ok(())
    }

    pub fn gains(&self) -> PidGains {
        PidGains::new(self.pid.kp, self.pid.ki, self.pid.kd)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            gains: self.gains(),
            tick: Duration::from_millis(self.pid.tick_ms),
            amplification: self.pid.amplification,
            max_current: self.pid.max_current,
            drive: self.pid.drive,
        }
    }

    pub fn coil_geometry(&self) -> CoilGeometry {
        let g = &self.geometry;
        CoilGeometry {
            separation: g.separation,
            coil_radius: g.coil_radius,
            turns: g.turns,
            coil_length: g.coil_length,
            permeability: g.permeability,
        }
    }

    /// 实时场景参数
    pub fn scene_params(&self) -> SceneParams {
        SceneParams {
            geometry: self.coil_geometry(),
            mass: self.geometry.sam_mass,
            damping: self.geometry.damping,
            friction: self.geometry.friction,
            manual_current: self.geometry.manual_current,
            realtime: true,
        }
    }

    pub fn actuator_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            x_device: self.serial.x_device,
            y_device: self.serial.y_device,
            x_scale: self.serial.x_scale,
            y_scale: self.serial.y_scale,
            speed: self.serial.speed,
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::default()
            .with_baud_rate(self.serial.baud_rate)
            .with_read_timeout(Duration::from_millis(self.serial.read_timeout_ms))
    }
}
