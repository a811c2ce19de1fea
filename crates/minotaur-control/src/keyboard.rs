//! 键盘按键状态
//!
//! 手动操控与闭环控制共享同一份按键表：moveTo 会话期间键盘被挂起，
//! 挂起时的按下/释放全部忽略。

use crate::geometry::Direction;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// 按键标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    /// 其它按键（原始键码）
    Other(u32),
}

impl From<Direction> for Key {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Up => Key::Up,
            Direction::Down => Key::Down,
            Direction::Left => Key::Left,
            Direction::Right => Key::Right,
        }
    }
}

impl Key {
    /// 方向键对应的方向
    pub fn direction(self) -> Option<Direction> {
        match self {
            Key::Up => Some(Direction::Up),
            Key::Down => Some(Direction::Down),
            Key::Left => Some(Direction::Left),
            Key::Right => Some(Direction::Right),
            Key::Other(_) => None,
        }
    }
}

/// 按键状态表
///
/// 同一按键只保留一项（后写覆盖），可跨线程共享。
#[derive(Debug, Default)]
pub struct KeyboardState {
    keys: Mutex<HashMap<Key, bool>>,
    suspended: AtomicBool,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按下；挂起时忽略
    pub fn press(&self, key: Key) {
        if self.is_suspended() {
            return;
        }
        debug!("key pressed: {:?}", key);
        self.keys.lock().insert(key, true);
    }

    /// 释放；挂起时忽略
    pub fn release(&self, key: Key) {
        if self.is_suspended() {
            return;
        }
        debug!("key released: {:?}", key);
        self.keys.lock().insert(key, false);
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.keys.lock().get(&key).copied().unwrap_or(false)
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// 记录的按键项数
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 释放所有按键（不受挂起影响）
    pub fn release_all(&self) {
        for pressed in self.keys.lock().values_mut() {
            *pressed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release() {
        let kb = KeyboardState::new();
        assert!(!kb.is_down(Key::Left));

        kb.press(Key::Left);
        assert!(kb.is_down(Key::Left));

        kb.release(Key::Left);
        assert!(!kb.is_down(Key::Left));
    }

    #[test]
    fn test_double_press_idempotent() {
        let kb = KeyboardState::new();
        kb.press(Key::Up);
        kb.press(Key::Up);
        assert!(kb.is_down(Key::Up));
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn test_suspended_ignores_input() {
        let kb = KeyboardState::new();
        kb.press(Key::Right);

        kb.set_suspended(true);
        kb.release(Key::Right);
        kb.press(Key::Down);
        assert!(kb.is_down(Key::Right));
        assert!(!kb.is_down(Key::Down));
        assert_eq!(kb.len(), 1);

        kb.set_suspended(false);
        kb.release(Key::Right);
        assert!(!kb.is_down(Key::Right));
    }

    #[test]
    fn test_release_all() {
        let kb = KeyboardState::new();
        kb.press(Key::Up);
        kb.press(Key::Left);
        kb.press(Key::Other(32));

        kb.release_all();
        assert!(!kb.is_down(Key::Up));
        assert!(!kb.is_down(Key::Left));
        assert!(!kb.is_down(Key::Other(32)));
    }

    #[test]
    fn test_key_direction_mapping() {
        for dir in Direction::ALL {
            assert_eq!(Key::from(dir).direction(), Some(dir));
        }
        assert_eq!(Key::Other(7).direction(), None);
    }
}
