//! 物理场景
//!
//! [`Scene`] 是控制核心所依赖的物理/渲染协作方接口；[`SimScene`] 是
//! 随库提供的参考实现：四个螺线管 + 一个在平面上滑动的 SAM，
//! 带线性阻尼和库仑摩擦。
//!
//! 线圈电流与 SAM 状态都在同一把锁内，控制线程与物理线程的读写互斥。

use crate::error::{ControlError, SolveError};
use crate::geometry::Vector2f;
use crate::keyboard::{Key, KeyboardState};
use crate::solenoid::{CoilGeometry, CoilSlot, Solenoid, total_field};
use crate::solver::{Currents, DEFAULT_MASS, FORCE_PER_TESLA, InverseSolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 重力加速度 (m/s²)
pub const GRAVITY: f64 = 9.809;

/// 积分子步长
pub const SUBSTEP: Duration = Duration::from_millis(1);

/// 单次追赶的最大时长，超出部分丢弃
pub const MAX_CATCH_UP: Duration = Duration::from_millis(100);

/// SAM 状态快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamState {
    /// 位置 (m)
    pub position: Vector2f,
    /// 速度 (m/s)
    pub velocity: Vector2f,
    /// 质量 (kg)
    pub mass: f64,
}

/// 物理/渲染协作方接口
pub trait Scene: Send + Sync {
    /// 场景中心
    fn center(&self) -> Vector2f;

    /// 四个螺线管（只读快照）
    fn solenoids(&self) -> Vec<Solenoid>;

    /// SAM 状态
    fn sam(&self) -> SamState;

    /// 竖直驱动：up = +I, down = -I
    fn power_vertical(&self, current: f64);

    /// 水平驱动：left = -I, right = +I
    fn power_horizontal(&self, current: f64);

    /// 挂起/恢复手动操控
    fn suspend_controls(&self, suspend: bool);

    /// 求解达到目标速度所需的电流（不施加）
    fn solve_velocity(
        &self,
        target_velocity: Vector2f,
        timestep_ms: f64,
    ) -> Result<Currents, SolveError>;

    /// SAM 回到中心并静止，线圈断电
    fn reset(&self);

    /// 求解并施加达到目标速度所需的电流
    fn request_velocity(
        &self,
        target_velocity: Vector2f,
        timestep_ms: f64,
    ) -> Result<Currents, SolveError> {
        let currents = self.solve_velocity(target_velocity, timestep_ms)?;
        self.apply(currents);
        Ok(currents)
    }

    /// 同时设置两路驱动
    fn apply(&self, currents: Currents) {
        self.power_horizontal(currents.horizontal);
        self.power_vertical(currents.vertical);
    }
}

/// 场景参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    pub geometry: CoilGeometry,
    pub mass: f64,
    /// 线性阻尼 (N·s/m)
    pub damping: f64,
    /// 库仑摩擦系数
    pub friction: f64,
    /// 方向键按下时对应线圈的电流 (A)
    pub manual_current: f64,
    /// 是否按墙钟时间自动推进
    pub realtime: bool,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            geometry: CoilGeometry::default(),
            mass: DEFAULT_MASS,
            damping: 0.05,
            friction: 0.3,
            manual_current: 100.0,
            realtime: true,
        }
    }
}

#[derive(Debug)]
struct SceneState {
    coils: [Solenoid; 4],
    position: Vector2f,
    velocity: Vector2f,
    manual: [bool; 4],
    last_update: Instant,
}

/// 参考物理场景
pub struct SimScene {
    params: SceneParams,
    solver: InverseSolver,
    state: Mutex<SceneState>,
    controls_suspended: AtomicBool,
    keyboard: Option<Arc<KeyboardState>>,
}

impl std::fmt::Debug for SimScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimScene")
            .field("params", &self.params)
            .field("controls_suspended", &self.controls_suspended)
            .finish()
    }
}

impl Default for SimScene {
    fn default() -> Self {
        Self::new(SceneParams::default())
    }
}

impl SimScene {
    pub fn new(params: SceneParams) -> Self {
        Self {
            solver: InverseSolver::new(&params.geometry, params.mass),
            state: Mutex::new(SceneState {
                coils: Solenoid::arrangement(&params.geometry),
                position: Vector2f::ZERO,
                velocity: Vector2f::ZERO,
                manual: [false; 4],
                last_update: Instant::now(),
            }),
            params,
            controls_suspended: AtomicBool::new(false),
            keyboard: None,
        }
    }

    /// 绑定键盘，用于手动操控
    pub fn with_keyboard(mut self, keyboard: Arc<KeyboardState>) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    pub fn solver(&self) -> &InverseSolver {
        &self.solver
    }

    pub fn controls_suspended(&self) -> bool {
        self.controls_suspended.load(Ordering::Acquire)
    }

    /// 四路线圈电流，按 [`CoilSlot`] 顺序
    pub fn currents(&self) -> [f64; 4] {
        self.advance();
        self.state.lock().coils.clone().map(|c| c.current)
    }

    /// 直接设置单个线圈电流
    pub fn set_current(&self, slot: CoilSlot, current: f64) {
        self.advance();
        self.state.lock().coils[slot.index()].current = current;
    }

    /// 把 SAM 放到指定位置并静止
    pub fn place(&self, position: Vector2f) {
        let mut state = self.state.lock();
        state.position = self.clamp_to_arena(position);
        state.velocity = Vector2f::ZERO;
        state.last_update = Instant::now();
    }

    /// 推进到当前时刻（仅实时模式）
    pub fn advance(&self) {
        if !self.params.realtime {
            return;
        }
        let mut state = self.state.lock();
        let now = Instant::now();
        let mut elapsed = now.saturating_duration_since(state.last_update);
        state.last_update = now;
        if elapsed > MAX_CATCH_UP {
            debug!("physics fell behind by {:?}, dropping excess", elapsed - MAX_CATCH_UP);
            elapsed = MAX_CATCH_UP;
        }
        self.integrate(&mut state, elapsed);
    }

    /// 手动推进 `dt`（不依赖墙钟）
    pub fn step(&self, dt: Duration) {
        let mut state = self.state.lock();
        self.integrate(&mut state, dt);
    }

    fn integrate(&self, state: &mut SceneState, mut remaining: Duration) {
        while !remaining.is_zero() {
            let h = remaining.min(SUBSTEP);
            remaining -= h;
            self.apply_manual_drive(state);
            self.substep(state, h.as_secs_f64());
        }
    }

    fn apply_manual_drive(&self, state: &mut SceneState) {
        let Some(keyboard) = &self.keyboard else {
            return;
        };
        if self.controls_suspended() {
            return;
        }
        for slot in CoilSlot::ALL {
            let key = match slot {
                CoilSlot::Up => Key::Up,
                CoilSlot::Down => Key::Down,
                CoilSlot::Left => Key::Left,
                CoilSlot::Right => Key::Right,
            };
            let held = keyboard.is_down(key);
            let i = slot.index();
            if held != state.manual[i] {
                state.manual[i] = held;
                state.coils[i].current = if held { self.params.manual_current } else { 0.0 };
            }
        }
    }

    fn substep(&self, state: &mut SceneState, h: f64) {
        let mass = self.params.mass;
        let mut force = total_field(&state.coils, state.position) * FORCE_PER_TESLA
            - state.velocity * self.params.damping;

        let friction = self.params.friction * mass * GRAVITY;
        let old_velocity = state.velocity;
        match old_velocity.normalized() {
            Some(dir) => force -= dir * friction,
            None => match force.normalized() {
                Some(dir) if force.norm() > friction => force -= dir * friction,
                _ => force = Vector2f::ZERO,
            },
        }

        let mut velocity = old_velocity + force * (h / mass);
        // 动摩擦不能让速度反向
        if old_velocity.dot(velocity) < 0.0 {
            velocity = Vector2f::ZERO;
        }

        let next = state.position + velocity * h;
        let clamped = self.clamp_to_arena(next);
        if clamped.x != next.x {
            velocity.x = 0.0;
        }
        if clamped.y != next.y {
            velocity.y = 0.0;
        }
        state.position = clamped;
        state.velocity = velocity;
    }

    /// SAM 只能在线圈端面围成的区域内运动
    fn clamp_to_arena(&self, p: Vector2f) -> Vector2f {
        let g = &self.params.geometry;
        let half = (g.separation - g.coil_length / 2.0).max(0.0);
        Vector2f::new(p.x.clamp(-half, half), p.y.clamp(-half, half))
    }
}

impl Scene for SimScene {
    fn center(&self) -> Vector2f {
        Vector2f::ZERO
    }

    fn solenoids(&self) -> Vec<Solenoid> {
        self.advance();
        self.state.lock().coils.to_vec()
    }

    fn sam(&self) -> SamState {
        self.advance();
        let state = self.state.lock();
        SamState {
            position: state.position,
            velocity: state.velocity,
            mass: self.params.mass,
        }
    }

    fn power_vertical(&self, current: f64) {
        self.advance();
        let mut state = self.state.lock();
        state.coils[CoilSlot::Up.index()].current = current;
        state.coils[CoilSlot::Down.index()].current = -current;
    }

    fn power_horizontal(&self, current: f64) {
        self.advance();
        let mut state = self.state.lock();
        state.coils[CoilSlot::Left.index()].current = -current;
        state.coils[CoilSlot::Right.index()].current = current;
    }

    fn suspend_controls(&self, suspend: bool) {
        self.advance();
        self.controls_suspended.store(suspend, Ordering::Release);
        if !suspend {
            // 恢复后按当前按键重新施加手动电流
            self.state.lock().manual = [false; 4];
        }
    }

    fn solve_velocity(
        &self,
        target_velocity: Vector2f,
        timestep_ms: f64,
    ) -> Result<Currents, SolveError> {
        let sam = self.sam();
        self.solver.solve(
            sam.velocity,
            target_velocity,
            timestep_ms / 1000.0,
            sam.position,
        )
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.position = Vector2f::ZERO;
        state.velocity = Vector2f::ZERO;
        for coil in state.coils.iter_mut() {
            coil.current = 0.0;
        }
        state.manual = [false; 4];
        state.last_update = Instant::now();
        info!("Scene reset");
    }
}

/// 后台物理线程
///
/// 以固定周期推进 [`SimScene`]，使手动操控在无人查询时也能运动。
/// Drop 时停止并 join。
pub struct PhysicsLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PhysicsLoop {
    pub fn spawn(scene: Arc<SimScene>, period: Duration) -> Result<Self, ControlError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name("minotaur-physics".to_string())
            .spawn(move || {
                let sleeper = spin_sleep::SpinSleeper::default();
                while flag.load(Ordering::Acquire) {
                    scene.advance();
                    sleeper.sleep(period);
                }
            })
            .map_err(|e| ControlError::Spawn(e.to_string()))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Physics thread panicked");
        }
    }
}

impl Drop for PhysicsLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
