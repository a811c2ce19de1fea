//! 模拟器后端
//!
//! 执行器触发与按向量移动都转换为定时按键（按下 → 保持 → 释放），由
//! 场景的手动操控把按键变成线圈电流。moveTo 在延时后启动一个 PID 会话
//! 线程。

use super::{Backend, BackendContext, BackendKind};
use crate::error::ControlError;
use crate::geometry::{Vector2f, Vector2i};
use crate::keyboard::{Key, KeyboardState};
use crate::pid::PidGains;
use crate::scene::Scene;
use crate::scheduler::{TimedAction, millis};
use crate::session::{
    MoveToSession, SessionConfig, SessionOutcome, SessionPolicy, SessionSlot, SessionTicket,
};
use crate::solver::Currents;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// 执行器序号对应的按键
pub const ACTUATION_KEYS: [Key; 4] = [Key::Left, Key::Right, Key::Up, Key::Down];

/// moveTo 坐标单位 (m)
pub const POSITION_UNIT_M: f64 = 1e-3;

/// 电流试算使用的时间步长 (ms)
const CALCULATION_TIMESTEP_MS: f64 = 10.0;

type SessionList = Arc<Mutex<Vec<JoinHandle<SessionOutcome>>>>;

/// 模拟器后端
pub struct Simulator {
    scene: Arc<dyn Scene>,
    gains: Arc<ArcSwap<PidGains>>,
    session: SessionConfig,
    policy: SessionPolicy,
    slot: Arc<SessionSlot>,
    sessions: SessionList,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("gains", &self.gains())
            .field("session", &self.session)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    pub fn new(scene: Arc<dyn Scene>) -> Self {
        Self::with_config(scene, SessionConfig::default(), SessionPolicy::default())
    }

    pub fn with_config(
        scene: Arc<dyn Scene>,
        session: SessionConfig,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            scene,
            gains: Arc::new(ArcSwap::from_pointee(session.gains)),
            session,
            policy,
            slot: SessionSlot::new(),
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scene(&self) -> &Arc<dyn Scene> {
        &self.scene
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// 当前 PID 增益（新会话开始时读取）
    pub fn gains(&self) -> PidGains {
        **self.gains.load()
    }

    /// 设置 Kp，非有限值返回 `InvalidInput`
    pub fn set_kp(&self, kp: f64) -> Result<(), ControlError> {
        finite_gain("kp", kp)?;
        self.gains.rcu(|g| PidGains { kp, ..**g });
        info!("Kp set to {}", kp);
        Ok(())
    }

    pub fn set_ki(&self, ki: f64) -> Result<(), ControlError> {
        finite_gain("ki", ki)?;
        self.gains.rcu(|g| PidGains { ki, ..**g });
        info!("Ki set to {}", ki);
        Ok(())
    }

    pub fn set_kd(&self, kd: f64) -> Result<(), ControlError> {
        finite_gain("kd", kd)?;
        self.gains.rcu(|g| PidGains { kd, ..**g });
        info!("Kd set to {}", kd);
        Ok(())
    }

    /// SAM 回到中心
    pub fn reset(&self) {
        self.scene.reset();
    }

    /// 试算达到速度 (vx, vy) 所需电流（不施加）
    pub fn calculate_currents(&self, velocity: Vector2f) -> Result<Currents, ControlError> {
        let currents = self
            .scene
            .solve_velocity(velocity, CALCULATION_TIMESTEP_MS)?;
        info!(
            "Currents for velocity ({}, {}): Ih = {:.3} A, Iv = {:.3} A",
            velocity.x, velocity.y, currents.horizontal, currents.vertical
        );
        Ok(currents)
    }

    /// 是否有 moveTo 会话（含延时中的）
    pub fn session_active(&self) -> bool {
        self.slot.is_active() || self.sessions.lock().iter().any(|h| !h.is_finished())
    }

    /// 收集已结束会话的结果
    pub fn take_finished(&self) -> Vec<SessionOutcome> {
        let mut sessions = self.sessions.lock();
        let mut outcomes = Vec::new();
        let mut running = Vec::new();
        for handle in sessions.drain(..) {
            if handle.is_finished() {
                match handle.join() {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(_) => error!("Move-to session thread panicked"),
                }
            } else {
                running.push(handle);
            }
        }
        *sessions = running;
        outcomes
    }

    /// 等待所有已启动的会话线程结束
    pub fn wait_sessions(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.sessions.lock().iter().all(|h| h.is_finished()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn target(&self, x: f64, y: f64) -> Vector2f {
        self.scene.center() + Vector2f::new(x, y) * POSITION_UNIT_M
    }
}

fn finite_gain(name: &str, value: f64) -> Result<(), ControlError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControlError::InvalidInput(format!("{} = {}", name, value)))
    }
}

/// 向量各分量符号对应的方向键
fn keys_for(vector: Vector2i) -> Vec<Key> {
    let mut keys = Vec::with_capacity(2);
    match vector.x.signum() {
        1 => keys.push(Key::Right),
        -1 => keys.push(Key::Left),
        _ => {},
    }
    match vector.y.signum() {
        1 => keys.push(Key::Up),
        -1 => keys.push(Key::Down),
        _ => {},
    }
    keys
}

fn hold_keys(
    ctx: &BackendContext<'_>,
    keys: Vec<Key>,
    delay_ms: i64,
    duration_ms: i64,
) -> Result<(), ControlError> {
    let press: Arc<KeyboardState> = ctx.keyboard.clone();
    let release: Arc<KeyboardState> = ctx.keyboard.clone();
    let released = keys.clone();
    ctx.scheduler.submit(TimedAction::from_millis(
        delay_ms,
        duration_ms,
        move || keys.iter().for_each(|k| press.press(*k)),
        move || released.iter().for_each(|k| release.release(*k)),
    ))?;
    Ok(())
}

impl Backend for Simulator {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulator
    }

    fn perform_move(
        &self,
        ctx: &BackendContext<'_>,
        vector: Vector2i,
        duration_ms: i64,
    ) -> Result<(), ControlError> {
        let keys = keys_for(vector);
        if keys.is_empty() {
            return Ok(());
        }
        debug!("simulated move {:?} for {} ms", keys, duration_ms);
        hold_keys(ctx, keys, 0, duration_ms)
    }

    fn perform_actuation(
        &self,
        ctx: &BackendContext<'_>,
        index: i32,
        duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError> {
        let key = ACTUATION_KEYS[index.clamp(0, 3) as usize];
        debug!(
            "simulated actuation {} -> {:?} ({} ms after {} ms)",
            index, key, duration_ms, delay_ms
        );
        hold_keys(ctx, vec![key], delay_ms, duration_ms)
    }

    fn perform_move_to(
        &self,
        ctx: &BackendContext<'_>,
        x: f64,
        y: f64,
        duration_ms: i64,
        delay_ms: i64,
    ) -> Result<(), ControlError> {
        let reserved: Option<SessionTicket> = match self.policy {
            SessionPolicy::Reject => Some(self.slot.try_reserve()?),
            _ => None,
        };

        let target = self.target(x, y);
        let duration = millis(duration_ms);
        let scene = self.scene.clone();
        let keyboard = ctx.keyboard.clone();
        let gains = self.gains.clone();
        let base = self.session;
        let slot = self.slot.clone();
        let policy = self.policy;
        let sessions = self.sessions.clone();

        ctx.scheduler.submit(TimedAction::once(millis(delay_ms), move || {
            let config = SessionConfig {
                gains: **gains.load(),
                ..base
            };
            let session = MoveToSession::new(scene, keyboard, config, target, duration);
            match session.spawn(slot, policy, reserved) {
                Ok(handle) => sessions.lock().push(handle),
                Err(e) => error!("Failed to start move-to session: {}", e),
            }
        }))?;
        Ok(())
    }

    fn as_simulator(&self) -> Option<&Simulator> {
        Some(self)
    }
}
