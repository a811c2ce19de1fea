//! Mock 串口
//!
//! 用于测试和无硬件运行：记录所有发送帧，按顺序返回预置应答，
//! 并可模拟链路断开。

use crate::{SerialAdapter, SerialError};
use minotaur_protocol::ZaberFrame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<ZaberFrame>,
    replies: VecDeque<ZaberFrame>,
    disconnected: bool,
}

/// Mock 串口适配器
#[derive(Debug, Clone)]
pub struct MockSerialAdapter {
    state: Arc<Mutex<MockState>>,
    name: String,
}

/// Mock 串口的观察句柄
///
/// 适配器被移动进执行器后，测试代码仍可通过句柄检查发送记录。
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSerialAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerialAdapter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            name: "mock".to_string(),
        }
    }

    pub fn handle(&self) -> MockSerialHandle {
        MockSerialHandle {
            state: self.state.clone(),
        }
    }
}

impl MockSerialHandle {
    /// 已发送的全部帧
    pub fn sent_frames(&self) -> Vec<ZaberFrame> {
        self.state.lock().sent.clone()
    }

    /// 清空发送记录
    pub fn clear(&self) {
        self.state.lock().sent.clear();
    }

    /// 预置一条应答
    pub fn push_reply(&self, frame: ZaberFrame) {
        self.state.lock().replies.push_back(frame);
    }

    /// 模拟链路断开/恢复
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }
}

impl SerialAdapter for MockSerialAdapter {
    fn send(&mut self, frame: ZaberFrame) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(SerialError::Disconnected);
        }
        tracing::trace!("mock serial tx: {:?}", frame.to_bytes());
        state.sent.push(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<ZaberFrame, SerialError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(SerialError::Disconnected);
        }
        state.replies.pop_front().ok_or(SerialError::Timeout)
    }

    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    fn port_name(&self) -> &str {
        &self.name
    }
}
