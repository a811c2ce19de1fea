//! moveTo 闭环会话
//!
//! 一个会话从开始到结束独占线圈与键盘：开始时挂起手动操控并清零两路
//! 驱动，每个周期按 PID 输出驱动 SAM，到达请求时长后清零驱动并恢复
//! 手动操控。
//!
//! 多个会话之间的关系由 [`SessionPolicy`] 决定，所有会话共享同一个
//! [`SessionSlot`]。被抢占的会话在下一个周期退出，不再触碰线圈和键盘。
//!
//! 会话对线圈和键盘的每次写入都在槽位锁内进行，并先确认自己仍是当前
//! 会话，因此旧会话的收尾不会与新会话的启动交错。

use crate::error::ControlError;
use crate::geometry::Vector2f;
use crate::keyboard::KeyboardState;
use crate::pid::{PidController, PidGains};
use crate::scene::Scene;
use crate::solver::Currents;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 重叠 moveTo 的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// 新会话开始时接管，旧会话在下一个周期退出
    #[default]
    Preempt,
    /// 已有会话（含延时中的）时拒绝新请求
    Reject,
    /// 排队，等前一个会话结束后开始
    Queue,
}

/// PID 输出到线圈的施加方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// 把 u 当作期望速度交给逆解器
    #[default]
    Solver,
    /// u × 放大系数直接作为两路电流
    Direct,
}

/// 会话参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub gains: PidGains,
    /// 控制周期
    pub tick: Duration,
    /// 直接驱动时的放大系数
    pub amplification: f64,
    /// 电流限幅 (A)
    pub max_current: f64,
    pub drive: DriveMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            tick: Duration::from_millis(10),
            amplification: 100.0,
            max_current: 500.0,
            drive: DriveMode::Solver,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    active: bool,
}

/// 会话槽：记录当前拥有线圈的会话
#[derive(Debug, Default)]
pub struct SessionSlot {
    state: Mutex<SlotState>,
    cv: Condvar,
}

/// 会话凭证，Drop 时释放槽位（仍为当前会话时）
#[derive(Debug)]
pub struct SessionTicket {
    slot: Arc<SessionSlot>,
    generation: u64,
}

impl SessionSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// 无条件接管
    pub fn preempt(self: &Arc<Self>) -> SessionTicket {
        let mut state = self.state.lock();
        if state.active {
            info!("Preempting move-to session {}", state.generation);
        }
        state.generation += 1;
        state.active = true;
        self.ticket(state.generation)
    }

    /// 槽位空闲时占用，否则返回 `SessionBusy`
    pub fn try_reserve(self: &Arc<Self>) -> Result<SessionTicket, ControlError> {
        let mut state = self.state.lock();
        if state.active {
            return Err(ControlError::SessionBusy);
        }
        state.generation += 1;
        state.active = true;
        Ok(self.ticket(state.generation))
    }

    /// 阻塞直到槽位空闲后占用
    pub fn wait_turn(self: &Arc<Self>) -> SessionTicket {
        let mut state = self.state.lock();
        while state.active {
            self.cv.wait(&mut state);
        }
        state.generation += 1;
        state.active = true;
        self.ticket(state.generation)
    }

    fn ticket(self: &Arc<Self>, generation: u64) -> SessionTicket {
        SessionTicket {
            slot: self.clone(),
            generation,
        }
    }
}

impl SessionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 是否仍拥有槽位
    pub fn is_current(&self) -> bool {
        self.slot.state.lock().generation == self.generation
    }

    /// 仍为当前会话时，在槽位锁内执行 `f`
    ///
    /// 持锁期间其它会话无法接管，`f` 内对线圈和键盘的写入不会与新会话交错。
    pub fn with_current<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.slot.state.lock();
        if state.generation != self.generation {
            return None;
        }
        let result = f();
        drop(state);
        Some(result)
    }

    /// 仍为当前会话时，在槽位锁内执行 `f` 并释放槽位
    pub fn release_with(&self, f: impl FnOnce()) -> bool {
        let mut state = self.slot.state.lock();
        if state.generation != self.generation {
            return false;
        }
        f();
        state.active = false;
        self.slot.cv.notify_all();
        true
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        if state.generation == self.generation {
            state.active = false;
            self.slot.cv.notify_all();
        }
    }
}

/// 会话结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOutcome {
    /// 正常结束
    Completed {
        /// 结束时的位置误差
        final_error: Vector2f,
        ticks: u32,
    },
    /// 被新会话接管
    Preempted { ticks: u32 },
}

/// 一次 moveTo 会话
pub struct MoveToSession {
    scene: Arc<dyn Scene>,
    keyboard: Arc<KeyboardState>,
    config: SessionConfig,
    target: Vector2f,
    duration: Duration,
}

impl std::fmt::Debug for MoveToSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveToSession")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl MoveToSession {
    pub fn new(
        scene: Arc<dyn Scene>,
        keyboard: Arc<KeyboardState>,
        config: SessionConfig,
        target: Vector2f,
        duration: Duration,
    ) -> Self {
        Self {
            scene,
            keyboard,
            config,
            target,
            duration,
        }
    }

    /// 在当前线程上运行，直到结束或被抢占
    pub fn run(self, ticket: &SessionTicket) -> SessionOutcome {
        let scene = self.scene.as_ref();
        info!(
            "Move-to session {} started: target ({:.4}, {:.4}) for {:?}",
            ticket.generation(),
            self.target.x,
            self.target.y,
            self.duration
        );

        let started = ticket.with_current(|| {
            self.keyboard.set_suspended(true);
            scene.suspend_controls(true);
            scene.apply(Currents::ZERO);
        });
        if started.is_none() {
            return self.preempted(ticket, 0);
        }

        let mut pid =
            PidController::new(self.target, scene.sam().position).with_gains(self.config.gains);
        let sleeper = SpinSleeper::default();
        let mut last = Instant::now();
        let mut elapsed = Duration::ZERO;
        let mut ticks = 0u32;

        loop {
            let u = pid.output();
            if ticket.with_current(|| self.drive(u)).is_none() {
                return self.preempted(ticket, ticks);
            }
            ticks += 1;

            sleeper.sleep(self.config.tick);
            let now = Instant::now();
            let dt = now.saturating_duration_since(last);
            last = now;

            if !ticket.is_current() {
                return self.preempted(ticket, ticks);
            }
            pid.update(scene.sam().position, dt);
            elapsed += dt;
            if elapsed >= self.duration {
                break;
            }
        }

        let final_error = pid.error();
        let released = ticket.release_with(|| {
            scene.apply(Currents::ZERO);
            scene.suspend_controls(false);
            self.keyboard.set_suspended(false);
        });
        if !released {
            return self.preempted(ticket, ticks);
        }
        info!(
            "Move-to session {} finished after {} ticks, error ({:.4}, {:.4})",
            ticket.generation(),
            ticks,
            final_error.x,
            final_error.y
        );
        SessionOutcome::Completed { final_error, ticks }
    }

    /// 启动独立线程运行会话
    pub fn spawn(
        self,
        slot: Arc<SessionSlot>,
        policy: SessionPolicy,
        reserved: Option<SessionTicket>,
    ) -> Result<std::thread::JoinHandle<SessionOutcome>, ControlError> {
        std::thread::Builder::new()
            .name("minotaur-moveto".to_string())
            .spawn(move || {
                let ticket = match (reserved, policy) {
                    (Some(ticket), _) => ticket,
                    (None, SessionPolicy::Queue) => slot.wait_turn(),
                    (None, _) => slot.preempt(),
                };
                self.run(&ticket)
            })
            .map_err(|e| ControlError::Spawn(e.to_string()))
    }

    fn preempted(&self, ticket: &SessionTicket, ticks: u32) -> SessionOutcome {
        debug!("Move-to session {} preempted", ticket.generation());
        SessionOutcome::Preempted { ticks }
    }

    fn drive(&self, u: Vector2f) {
        let currents = match self.config.drive {
            DriveMode::Solver => {
                let tick_ms = self.config.tick.as_secs_f64() * 1000.0;
                match self.scene.solve_velocity(u, tick_ms) {
                    Ok(currents) => currents,
                    Err(e) => {
                        warn!("Solver failed ({}), falling back to direct drive", e);
                        self.direct(u)
                    },
                }
            },
            DriveMode::Direct => self.direct(u),
        };
        if !currents.is_finite() {
            warn!(
                "Non-finite drive ({}, {}), coils zeroed",
                currents.horizontal, currents.vertical
            );
            self.scene.apply(Currents::ZERO);
            return;
        }
        self.scene.apply(currents.clamped(self.config.max_current));
    }

    fn direct(&self, u: Vector2f) -> Currents {
        Currents::new(
            u.x * self.config.amplification,
            u.y * self.config.amplification,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SimScene;

    #[test]
    fn test_slot_reject_while_active() {
        let slot = SessionSlot::new();
        let first = slot.try_reserve().unwrap();
        assert!(slot.is_active());
        assert!(matches!(slot.try_reserve(), Err(ControlError::SessionBusy)));

        drop(first);
        assert!(!slot.is_active());
        assert!(slot.try_reserve().is_ok());
    }

    #[test]
    fn test_slot_preempt() {
        let slot = SessionSlot::new();
        let old = slot.preempt();
        let new = slot.preempt();
        assert!(!old.is_current());
        assert!(new.is_current());

        // 旧凭证释放不影响新会话
        drop(old);
        assert!(slot.is_active());
        drop(new);
        assert!(!slot.is_active());
    }

    #[test]
    fn test_slot_queue_waits() {
        let slot = SessionSlot::new();
        let first = slot.preempt();

        let s = slot.clone();
        let waiter = std::thread::spawn(move || s.wait_turn().generation());

        std::thread::sleep(Duration::from_millis(30));
        assert!(!waiter.is_finished());
        drop(first);

        assert_eq!(waiter.join().unwrap(), 2);
    }

    fn quick_config() -> SessionConfig {
        SessionConfig {
            gains: PidGains::new(5.0, 0.0, 0.0),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_session_restores_keyboard_and_zeroes_coils() {
        let scene = Arc::new(SimScene::default());
        let keyboard = Arc::new(KeyboardState::new());
        let slot = SessionSlot::new();

        let session = MoveToSession::new(
            scene.clone(),
            keyboard.clone(),
            quick_config(),
            Vector2f::new(0.02, 0.0),
            Duration::from_millis(60),
        );
        let ticket = slot.preempt();
        let outcome = session.run(&ticket);

        assert!(matches!(outcome, SessionOutcome::Completed { ticks, .. } if ticks >= 1));
        assert!(!keyboard.is_suspended());
        assert!(!scene.controls_suspended());
        assert_eq!(scene.currents(), [0.0; 4]);
    }

    #[test]
    fn test_preempted_session_leaves_coils_alone() {
        let scene = Arc::new(SimScene::default());
        let keyboard = Arc::new(KeyboardState::new());
        let slot = SessionSlot::new();

        let old = MoveToSession::new(
            scene.clone(),
            keyboard.clone(),
            quick_config(),
            Vector2f::new(0.02, 0.0),
            Duration::from_secs(5),
        )
        .spawn(slot.clone(), SessionPolicy::Preempt, None)
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let ticket = slot.preempt();
        let outcome = old.join().unwrap();
        assert!(matches!(outcome, SessionOutcome::Preempted { .. }));

        // 新会话仍持有键盘挂起状态
        assert!(keyboard.is_suspended());
        assert!(ticket.is_current());
    }

    #[test]
    fn test_non_finite_output_zeroes_coils() {
        let scene = Arc::new(SimScene::default());
        let keyboard = Arc::new(KeyboardState::new());
        let slot = SessionSlot::new();

        for kp in [f64::INFINITY, f64::NAN] {
            let config = SessionConfig {
                gains: PidGains::new(kp, 0.0, 0.0),
                ..SessionConfig::default()
            };
            let handle = MoveToSession::new(
                scene.clone(),
                keyboard.clone(),
                config,
                Vector2f::new(0.02, 0.0),
                Duration::from_millis(80),
            )
            .spawn(slot.clone(), SessionPolicy::Preempt, None)
            .unwrap();

            std::thread::sleep(Duration::from_millis(40));
            assert_eq!(scene.currents(), [0.0; 4]);
            assert!(scene.sam().position.is_finite());

            let outcome = handle.join().unwrap();
            assert!(matches!(outcome, SessionOutcome::Completed { .. }));
            assert_eq!(scene.sam().position, Vector2f::ZERO);
        }
    }

    /// 恢复手动操控很慢的场景，用于拉长会话收尾的时间窗口
    struct SlowRestoreScene {
        inner: SimScene,
        restore_delay: Duration,
    }

    impl Scene for SlowRestoreScene {
        fn center(&self) -> Vector2f {
            self.inner.center()
        }

        fn solenoids(&self) -> Vec<crate::solenoid::Solenoid> {
            self.inner.solenoids()
        }

        fn sam(&self) -> crate::scene::SamState {
            self.inner.sam()
        }

        fn power_vertical(&self, current: f64) {
            self.inner.power_vertical(current)
        }

        fn power_horizontal(&self, current: f64) {
            self.inner.power_horizontal(current)
        }

        fn suspend_controls(&self, suspend: bool) {
            if !suspend {
                std::thread::sleep(self.restore_delay);
            }
            self.inner.suspend_controls(suspend)
        }

        fn solve_velocity(
            &self,
            target_velocity: Vector2f,
            timestep_ms: f64,
        ) -> Result<Currents, crate::error::SolveError> {
            self.inner.solve_velocity(target_velocity, timestep_ms)
        }

        fn reset(&self) {
            self.inner.reset()
        }
    }

    #[test]
    fn test_teardown_does_not_release_newer_session() {
        let scene = Arc::new(SlowRestoreScene {
            inner: SimScene::default(),
            restore_delay: Duration::from_millis(150),
        });
        let keyboard = Arc::new(KeyboardState::new());
        let slot = SessionSlot::new();

        let old = MoveToSession::new(
            scene.clone(),
            keyboard.clone(),
            quick_config(),
            Vector2f::new(0.02, 0.0),
            Duration::from_millis(30),
        )
        .spawn(slot.clone(), SessionPolicy::Preempt, None)
        .unwrap();

        // 旧会话此时正在收尾（恢复手动操控中）
        std::thread::sleep(Duration::from_millis(90));
        let new = MoveToSession::new(
            scene.clone(),
            keyboard.clone(),
            quick_config(),
            Vector2f::new(-0.02, 0.0),
            Duration::from_secs(1),
        )
        .spawn(slot.clone(), SessionPolicy::Preempt, None)
        .unwrap();

        assert!(matches!(old.join().unwrap(), SessionOutcome::Completed { .. }));
        std::thread::sleep(Duration::from_millis(200));

        // 新会话仍在运行：手动操控必须保持挂起
        assert!(!new.is_finished());
        assert!(keyboard.is_suspended());
        assert!(scene.inner.controls_suspended());

        let stop = slot.preempt();
        assert!(matches!(new.join().unwrap(), SessionOutcome::Preempted { .. }));
        drop(stop);
    }

    #[test]
    fn test_ticket_with_current() {
        let slot = SessionSlot::new();
        let old = slot.preempt();
        assert_eq!(old.with_current(|| 7), Some(7));

        let new = slot.preempt();
        assert_eq!(old.with_current(|| 7), None);
        assert!(!old.release_with(|| panic!("stale session must not tear down")));

        assert!(new.release_with(|| {}));
        assert!(!slot.is_active());
    }
}
