//! 后端连接
//!
//! 模拟器后端额外启动后台物理线程，使手动按键在无人查询时也能推进场景。

use anyhow::{Context, Result};
use minotaur_sdk::control::{PhysicsLoop, Scene};
use minotaur_sdk::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// 物理线程周期
const PHYSICS_PERIOD: Duration = Duration::from_millis(5);

/// 后端选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendArg {
    /// 物理模拟
    Sim,
    /// Zaber 执行器（串口）
    Actuator,
}

/// 已连接的控制器
pub struct Rig {
    pub dispatcher: Dispatcher,
    pub controller: Arc<Controller>,
    scene: Option<Arc<SimScene>>,
    _physics: Option<PhysicsLoop>,
}

impl Rig {
    pub fn connect(
        backend: BackendArg,
        config: &MinotaurConfig,
        port: Option<&str>,
    ) -> Result<Self> {
        match backend {
            BackendArg::Sim => Self::simulator(config),
            BackendArg::Actuator => {
                let mut config = config.clone();
                if let Some(port) = port {
                    config.serial.port = Some(port.to_string());
                }
                let controller = MinotaurBuilder::new()
                    .config(config)
                    .open_actuator()
                    .context("打开执行器串口失败")?;
                Ok(Self {
                    dispatcher: Dispatcher::with_controller(controller.clone()),
                    controller,
                    scene: None,
                    _physics: None,
                })
            },
        }
    }

    /// 模拟器后端
    pub fn simulator(config: &MinotaurConfig) -> Result<Self> {
        let rig = MinotaurBuilder::new().config(config.clone()).build_simulator()?;
        let physics = PhysicsLoop::spawn(rig.scene.clone(), PHYSICS_PERIOD)?;
        Ok(Self {
            dispatcher: Dispatcher::with_controller(rig.controller.clone()),
            controller: rig.controller,
            scene: Some(rig.scene),
            _physics: Some(physics),
        })
    }

    /// 状态描述
    pub fn status(&self) -> String {
        let (ix, iy) = self.controller.inversion();
        match &self.scene {
            Some(scene) => {
                let sam = scene.sam();
                let [up, down, left, right] = scene.currents();
                format!(
                    "simulator | SAM ({:+.4}, {:+.4}) m, v ({:+.4}, {:+.4}) m/s | \
                     coils U {:.1} D {:.1} L {:.1} R {:.1} A | inversion ({}, {})",
                    sam.position.x,
                    sam.position.y,
                    sam.velocity.x,
                    sam.velocity.y,
                    up,
                    down,
                    left,
                    right,
                    ix,
                    iy
                )
            },
            None => match self.controller.as_actuator() {
                Some(actuator) => {
                    let (x, y) = actuator.devices();
                    format!("actuator | devices x={} y={} | inversion ({}, {})", x, y, ix, iy)
                },
                None => format!("{} | inversion ({}, {})", self.controller.kind(), ix, iy),
            },
        }
    }

    /// 急停：松开所有按键，线圈断电，执行器停止
    pub fn emergency_stop(&self) {
        self.controller.keyboard().release_all();
        if let Some(scene) = &self.scene {
            scene.apply(Currents::ZERO);
        }
        if let Some(actuator) = self.controller.as_actuator()
            && let Err(e) = actuator.stop()
        {
            tracing::error!("Emergency stop failed: {}", e);
        }
    }
}
