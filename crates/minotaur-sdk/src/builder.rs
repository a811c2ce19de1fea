//! Builder：按配置组装控制器

use minotaur_control::{
    Actuator, Backend, ControlError, Controller, KeyboardState, MinotaurConfig, SceneParams,
    SimScene, Simulator,
};
use minotaur_serial::SerialAdapter;
use std::sync::Arc;

/// 组装好的模拟器
///
/// 场景与控制器共享同一份按键状态，手动按键直接驱动线圈。
#[derive(Debug, Clone)]
pub struct SimulatorRig {
    pub controller: Arc<Controller>,
    pub scene: Arc<SimScene>,
    pub keyboard: Arc<KeyboardState>,
}

/// 控制器 Builder
#[derive(Debug, Clone, Default)]
pub struct MinotaurBuilder {
    config: MinotaurConfig,
    realtime: Option<bool>,
}

impl MinotaurBuilder {
    /// 创建新的 Builder（默认配置）
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用已加载的配置
    pub fn config(mut self, config: MinotaurConfig) -> Self {
        self.config = config;
        self
    }

    /// 场景是否按墙钟推进（默认: true）
    ///
    /// 关闭后只能通过 [`SimScene::step`] 推进，适合确定性测试。
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = Some(realtime);
        self
    }

    fn scene_params(&self) -> SceneParams {
        let mut params = self.config.scene_params();
        if let Some(realtime) = self.realtime {
            params.realtime = realtime;
        }
        params
    }

    fn controller(
        &self,
        backend: Box<dyn Backend>,
        keyboard: Arc<KeyboardState>,
    ) -> Result<Controller, ControlError> {
        let inversion = &self.config.controller;
        Ok(Controller::new(backend, keyboard)?
            .with_inversion(inversion.invert_x, inversion.invert_y))
    }

    /// 构建模拟器后端的控制器
    pub fn build_simulator(&self) -> Result<SimulatorRig, ControlError> {
        let keyboard = Arc::new(KeyboardState::new());
        let scene = Arc::new(SimScene::new(self.scene_params()).with_keyboard(keyboard.clone()));
        let simulator = Simulator::with_config(
            scene.clone(),
            self.config.session_config(),
            self.config.pid.policy,
        );
        let controller = self.controller(Box::new(simulator), keyboard.clone())?;

        Ok(SimulatorRig {
            controller: Arc::new(controller),
            scene,
            keyboard,
        })
    }

    /// 在给定串口上构建执行器后端的控制器
    pub fn build_actuator(
        &self,
        port: Box<dyn SerialAdapter + Send>,
    ) -> Result<Arc<Controller>, ControlError> {
        let actuator = Actuator::new(port, self.config.actuator_config());
        let controller = self.controller(Box::new(actuator), Arc::new(KeyboardState::new()))?;
        Ok(Arc::new(controller))
    }

    /// 打开配置中的串口并构建执行器控制器
    #[cfg(feature = "hardware")]
    pub fn open_actuator(&self) -> Result<Arc<Controller>, ControlError> {
        let path = self.config.serial.port.as_deref().ok_or_else(|| {
            ControlError::Serial(minotaur_serial::SerialError::Device(
                "no serial port configured".to_string(),
            ))
        })?;
        let port = minotaur_serial::SerialPortAdapter::open(path, &self.config.serial_settings())?;
        self.build_actuator(Box::new(port))
    }
}
