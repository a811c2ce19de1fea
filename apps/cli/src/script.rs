//! 脚本系统
//!
//! JSON 脚本是一串指令，指令格式与 [`Command`] 的 JSON 形式相同，另外
//! 支持 `{"wait": 毫秒}` 暂停：
//!
//! ```json
//! {
//!   "name": "square",
//!   "steps": [
//!     {"type": "kp", "value": 5},
//!     {"type": "moveto", "x": 40, "y": 0, "duration": 2000},
//!     {"wait": 2000}
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use minotaur_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 脚本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub steps: Vec<ScriptStep>,
}

/// 脚本步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    /// 暂停
    Wait {
        #[serde(rename = "wait")]
        wait_ms: u64,
    },
    Command(Command),
}

impl Script {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("读取脚本失败: {}", path.display()))?;
        Self::parse(&content)
    }

    /// 解析脚本，也接受裸指令数组
    pub fn parse(content: &str) -> Result<Self> {
        if let Ok(steps) = serde_json::from_str::<Vec<ScriptStep>>(content) {
            return Ok(Self {
                name: String::new(),
                description: String::new(),
                steps,
            });
        }
        serde_json::from_str(content).context("脚本格式错误")
    }
}

/// 执行选项
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// 失败时是否继续
    pub continue_on_error: bool,

    /// 脚本结束后等待定时动作和 moveTo 会话完成的上限
    pub settle_timeout: Duration,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            settle_timeout: Duration::from_secs(30),
        }
    }
}

/// 执行结果
#[derive(Debug, Default)]
pub struct ScriptResult {
    pub total_steps: usize,
    pub succeeded: usize,
    /// (步骤序号, 说明)
    pub failed: Vec<(usize, String)>,
    pub interrupted: bool,
    pub settled: bool,
    pub duration: Duration,
}

/// 脚本执行器
pub struct ScriptExecutor {
    config: ScriptConfig,
    interrupt: Arc<AtomicBool>,
}

impl ScriptExecutor {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            config,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 中断标志（Ctrl+C 处理器置位）
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// 可中断的等待
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.interrupted() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }

    pub fn execute(&self, script: &Script, dispatcher: &Dispatcher) -> ScriptResult {
        let start = Instant::now();
        let mut result = ScriptResult {
            total_steps: script.steps.len(),
            ..Default::default()
        };

        for (i, step) in script.steps.iter().enumerate() {
            if self.interrupted() {
                result.interrupted = true;
                break;
            }
            match step {
                ScriptStep::Wait { wait_ms } => {
                    tracing::debug!("step {}: wait {} ms", i + 1, wait_ms);
                    self.pause(Duration::from_millis(*wait_ms));
                    result.succeeded += 1;
                },
                ScriptStep::Command(command) => {
                    tracing::debug!("step {}: {:?}", i + 1, command);
                    if dispatcher.execute(command) {
                        result.succeeded += 1;
                    } else {
                        result.failed.push((i, format!("{} rejected", command.name())));
                        if !self.config.continue_on_error {
                            break;
                        }
                    }
                },
            }
        }

        if self.interrupted() {
            result.interrupted = true;
        } else if let Some(controller) = dispatcher.controller() {
            result.settled = controller.wait_idle(self.config.settle_timeout);
        }
        result.duration = start.elapsed();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        let rig = MinotaurBuilder::new().realtime(false).build_simulator().unwrap();
        Dispatcher::with_controller(rig.controller)
    }

    #[test]
    fn test_parse_named_script() {
        let script = Script::parse(
            r#"{"name": "demo", "steps": [
                {"type": "kp", "value": 5},
                {"wait": 20},
                {"type": "actuate", "index": 1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(script.name, "demo");
        assert_eq!(
            script.steps,
            vec![
                ScriptStep::Command(Command::Kp { value: 5.0 }),
                ScriptStep::Wait { wait_ms: 20 },
                ScriptStep::Command(Command::Actuate {
                    index: 1,
                    duration: 1000,
                    delay: 0
                }),
            ]
        );
    }

    #[test]
    fn test_parse_bare_array() {
        let script = Script::parse(r#"[{"type": "reset"}, {"wait": 5}]"#).unwrap();
        assert_eq!(script.steps.len(), 2);
        assert!(Script::parse(r#"[{"type": "fly"}]"#).is_err());
    }

    #[test]
    fn test_execute_runs_all_steps() {
        let script = Script::parse(
            r#"[
                {"type": "ki", "value": 0.1},
                {"wait": 5},
                {"type": "move", "x": 1, "y": 0, "dt": 10}
            ]"#,
        )
        .unwrap();
        let dispatcher = dispatcher();
        let result = ScriptExecutor::new(ScriptConfig::default()).execute(&script, &dispatcher);
        assert_eq!(result.succeeded, 3);
        assert!(result.failed.is_empty());
        assert!(result.settled);
    }

    #[test]
    fn test_execute_stops_on_failure() {
        let script = Script::parse(r#"[{"type": "reset"}, {"type": "kp", "value": 1}]"#).unwrap();
        let unbound = Dispatcher::new();

        let result = ScriptExecutor::new(ScriptConfig::default()).execute(&script, &unbound);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.succeeded, 0);

        let config = ScriptConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let result = ScriptExecutor::new(config).execute(&script, &unbound);
        assert_eq!(result.failed.len(), 2);
    }

    #[test]
    fn test_interrupt_skips_remaining() {
        let script = Script::parse(r#"[{"wait": 10000}, {"type": "reset"}]"#).unwrap();
        let executor = ScriptExecutor::new(ScriptConfig::default());
        executor.interrupt_flag().store(true, Ordering::Release);

        let result = executor.execute(&script, &dispatcher());
        assert!(result.interrupted);
        assert_eq!(result.succeeded, 0);
    }
}
