//! 定时动作调度
//!
//! 一个 [`TimedAction`]：等待 `delay` → 执行开始动作 → 等待 `duration`
//! → 执行结束动作。调度器持有动作直到结束动作执行完毕；调用方拿到的
//! [`TaskHandle`] 只用于查询、等待和（开始前）取消。
//!
//! 所有定时都由一个工作线程处理：按 (到期时刻, 提交序号) 排序的小顶堆，
//! 通过 channel 接收新任务。保证"不早于请求时刻触发、按计划时刻非递减
//! 顺序触发"，不保证抖动上界。
//!
//! `delay <= 0` 时开始动作在调用线程上同步执行；`duration <= 0` 时
//! 结束动作紧接着同步执行。

use crate::error::ControlError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// 一次性动作
pub type Effect = Box<dyn FnOnce() + Send + 'static>;

/// 延时 + 持续时间的一次性动作
pub struct TimedAction {
    delay: Duration,
    duration: Duration,
    start: Effect,
    end: Effect,
}

impl std::fmt::Debug for TimedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedAction")
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl TimedAction {
    pub fn new<S, E>(delay: Duration, duration: Duration, start: S, end: E) -> Self
    where
        S: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        Self {
            delay,
            duration,
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    /// 以毫秒构造，非正值视为 0
    pub fn from_millis<S, E>(delay_ms: i64, duration_ms: i64, start: S, end: E) -> Self
    where
        S: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        Self::new(millis(delay_ms), millis(duration_ms), start, end)
    }

    /// 只有开始动作
    pub fn once<S>(delay: Duration, start: S) -> Self
    where
        S: FnOnce() + Send + 'static,
    {
        Self::new(delay, Duration::ZERO, start, || {})
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// 非正毫秒数转为零时长
pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// 等待开始
    Pending,
    /// 开始动作已执行，等待结束
    Started,
    /// 结束动作已执行
    Finished,
    /// 开始前被取消
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Cancelled)
    }
}

#[derive(Debug)]
struct TaskState {
    id: u64,
    status: Mutex<TaskStatus>,
    cv: Condvar,
    outstanding: Arc<AtomicUsize>,
}

impl TaskState {
    /// Pending → Started；已取消返回 false
    fn begin(&self) -> bool {
        let mut status = self.status.lock();
        if *status != TaskStatus::Pending {
            return false;
        }
        *status = TaskStatus::Started;
        true
    }

    fn finish(&self) {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return;
        }
        *status = TaskStatus::Finished;
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.cv.notify_all();
    }

    fn cancel(&self) -> bool {
        let mut status = self.status.lock();
        if *status != TaskStatus::Pending {
            return false;
        }
        *status = TaskStatus::Cancelled;
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.cv.notify_all();
        true
    }
}

/// 已提交任务的句柄
///
/// 丢弃句柄不会影响任务执行。
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn status(&self) -> TaskStatus {
        *self.state.status.lock()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    /// 取消尚未开始的任务
    ///
    /// 开始动作已执行时返回 false，结束动作仍会按时执行。
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.cancel();
        if cancelled {
            debug!("timed action {} cancelled", self.state.id);
        }
        cancelled
    }

    /// 等待任务结束（完成或取消），超时返回 false
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.state.status.lock();
        while !status.is_terminal() {
            if self.state.cv.wait_until(&mut status, deadline).timed_out() {
                return status.is_terminal();
            }
        }
        true
    }

    pub fn wait(&self) {
        let mut status = self.state.status.lock();
        while !status.is_terminal() {
            self.state.cv.wait(&mut status);
        }
    }
}

enum Phase {
    Start {
        start: Effect,
        duration: Duration,
        end: Effect,
    },
    End { end: Effect },
}

struct Entry {
    due: Instant,
    seq: u64,
    task: Arc<TaskState>,
    phase: Phase,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap 是大顶堆，反转得到最早到期优先
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Message {
    Schedule(Entry),
    Shutdown,
}

/// 定时动作调度器
pub struct Scheduler {
    tx: Sender<Message>,
    handle: Option<JoinHandle<()>>,
    seq: AtomicU64,
    outstanding: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Scheduler {
    /// 启动调度线程
    pub fn new() -> Result<Self, ControlError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("minotaur-scheduler".to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| ControlError::Spawn(e.to_string()))?;

        Ok(Self {
            tx,
            handle: Some(handle),
            seq: AtomicU64::new(0),
            outstanding: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 提交定时动作
    ///
    /// 不阻塞等待动作完成。`delay` 为零时开始动作在当前线程执行。
    pub fn submit(&self, action: TimedAction) -> Result<TaskHandle, ControlError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let task = Arc::new(TaskState {
            id: seq,
            status: Mutex::new(TaskStatus::Pending),
            cv: Condvar::new(),
            outstanding: self.outstanding.clone(),
        });
        let handle = TaskHandle {
            state: task.clone(),
        };
        trace!("timed action {} submitted: {:?}", seq, action);

        let TimedAction {
            delay,
            duration,
            start,
            end,
        } = action;

        if !delay.is_zero() {
            let entry = Entry {
                due: Instant::now() + delay,
                seq,
                task: task.clone(),
                phase: Phase::Start {
                    start,
                    duration,
                    end,
                },
            };
            if self.tx.send(Message::Schedule(entry)).is_err() {
                task.cancel();
                return Err(ControlError::SchedulerClosed);
            }
            return Ok(handle);
        }

        // 立即开始
        task.begin();
        run_effect(seq, "start", start);
        if duration.is_zero() {
            run_effect(seq, "end", end);
            task.finish();
            return Ok(handle);
        }

        let entry = Entry {
            due: Instant::now() + duration,
            seq,
            task: task.clone(),
            phase: Phase::End { end },
        };
        if let Err(crossbeam_channel::SendError(Message::Schedule(entry))) =
            self.tx.send(Message::Schedule(entry))
        {
            // 已开始的动作必须收尾
            warn!("Scheduler closed, ending timed action {} early", seq);
            if let Phase::End { end } = entry.phase {
                run_effect(seq, "end", end);
            }
            task.finish();
        }
        Ok(handle)
    }

    /// 未结束的任务数
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// 等待全部任务结束，超时返回 false
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.outstanding() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// 停止调度线程
    ///
    /// 已开始的任务立即执行结束动作，未开始的任务被丢弃。
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Scheduler thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_effect(id: u64, label: &str, effect: Effect) {
    trace!("timed action {} {}", id, label);
    if catch_unwind(AssertUnwindSafe(effect)).is_err() {
        error!("Timed action {} panicked in {} effect", id, label);
    }
}

fn worker_loop(rx: Receiver<Message>) {
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();

    loop {
        let message = match heap.peek() {
            Some(next) => {
                let now = Instant::now();
                if next.due <= now {
                    if let Some(entry) = heap.pop() {
                        fire(entry, &mut heap);
                    }
                    continue;
                }
                rx.recv_timeout(next.due - now)
            },
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(Message::Schedule(entry)) => heap.push(entry),
            Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {},
        }
    }

    // 收尾：已开始的执行结束动作，未开始的丢弃
    let remaining = heap.len();
    if remaining > 0 {
        debug!("Scheduler stopping with {} pending entries", remaining);
    }
    for entry in heap.into_vec() {
        match entry.phase {
            Phase::Start { .. } => {
                entry.task.cancel();
            },
            Phase::End { end } => {
                run_effect(entry.seq, "end", end);
                entry.task.finish();
            },
        }
    }
}

fn fire(entry: Entry, heap: &mut BinaryHeap<Entry>) {
    let Entry {
        seq, task, phase, ..
    } = entry;
    match phase {
        Phase::Start {
            start,
            duration,
            end,
        } => {
            if !task.begin() {
                // 已取消
                return;
            }
            run_effect(seq, "start", start);
            if duration.is_zero() {
                run_effect(seq, "end", end);
                task.finish();
            } else {
                heap.push(Entry {
                    due: Instant::now() + duration,
                    seq,
                    task,
                    phase: Phase::End { end },
                });
            }
        },
        Phase::End { end } => {
            run_effect(seq, "end", end);
            task.finish();
        },
    }
}
