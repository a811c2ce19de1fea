//! 指令分发
//!
//! 外部自动化方（脚本、命令行）通过 [`Dispatcher`] 把 move / actuate /
//! moveto 等请求交给当前绑定的控制器。所有入口只返回 `bool`：未绑定或
//! 执行失败都返回 `false`，错误写入日志，不会 panic。

use crate::controller::Controller;
use crate::error::{ControlError, ParseCommandError};
use crate::geometry::{Vector2f, Vector2i};
use crate::solver::Currents;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// 默认持续时间 (ms)
pub const DEFAULT_DURATION_MS: i64 = 1000;

fn default_duration() -> i64 {
    DEFAULT_DURATION_MS
}

/// 自动化指令
///
/// JSON 形式以 `type` 字段区分，例如
/// `{"type": "moveto", "x": 40, "y": 0, "duration": 2000}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// 按向量移动
    Move {
        x: i32,
        y: i32,
        #[serde(default = "default_duration")]
        dt: i64,
    },
    /// 触发执行器
    Actuate {
        index: i32,
        #[serde(default = "default_duration")]
        duration: i64,
        #[serde(default)]
        delay: i64,
    },
    /// 移动到 (x, y)
    #[serde(rename = "moveto")]
    MoveTo {
        x: i32,
        y: i32,
        #[serde(default = "default_duration")]
        duration: i64,
        #[serde(default)]
        delay: i64,
    },
    /// 模拟器复位
    Reset,
    Kp { value: f64 },
    Ki { value: f64 },
    Kd { value: f64 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Actuate { .. } => "actuate",
            Command::MoveTo { .. } => "moveto",
            Command::Reset => "reset",
            Command::Kp { .. } => "kp",
            Command::Ki { .. } => "ki",
            Command::Kd { .. } => "kd",
        }
    }
}

fn arg<T: FromStr>(
    args: &[&str],
    i: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<T, ParseCommandError> {
    let raw = args
        .get(i)
        .ok_or(ParseCommandError::MissingArgument { command, argument })?;
    raw.parse()
        .map_err(|_| ParseCommandError::InvalidNumber(raw.to_string()))
}

fn opt_arg<T: FromStr>(args: &[&str], i: usize, default: T) -> Result<T, ParseCommandError> {
    match args.get(i) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ParseCommandError::InvalidNumber(raw.to_string())),
        None => Ok(default),
    }
}

fn check_arity(args: &[&str], max: usize, command: &'static str) -> Result<(), ParseCommandError> {
    if args.len() > max {
        return Err(ParseCommandError::TooManyArguments(command));
    }
    Ok(())
}

impl FromStr for Command {
    type Err = ParseCommandError;

    /// 解析文本指令，如 `moveto 40 0 2000 100`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(ParseCommandError::Empty)?;
        let args: Vec<&str> = parts.collect();

        let command = match name.to_ascii_lowercase().as_str() {
            "move" => {
                check_arity(&args, 3, "move")?;
                Command::Move {
                    x: arg(&args, 0, "move", "x")?,
                    y: arg(&args, 1, "move", "y")?,
                    dt: opt_arg(&args, 2, DEFAULT_DURATION_MS)?,
                }
            },
            "actuate" => {
                check_arity(&args, 3, "actuate")?;
                Command::Actuate {
                    index: arg(&args, 0, "actuate", "index")?,
                    duration: opt_arg(&args, 1, DEFAULT_DURATION_MS)?,
                    delay: opt_arg(&args, 2, 0)?,
                }
            },
            "moveto" => {
                check_arity(&args, 4, "moveto")?;
                Command::MoveTo {
                    x: arg(&args, 0, "moveto", "x")?,
                    y: arg(&args, 1, "moveto", "y")?,
                    duration: opt_arg(&args, 2, DEFAULT_DURATION_MS)?,
                    delay: opt_arg(&args, 3, 0)?,
                }
            },
            "reset" => {
                check_arity(&args, 0, "reset")?;
                Command::Reset
            },
            "kp" => {
                check_arity(&args, 1, "kp")?;
                Command::Kp {
                    value: arg(&args, 0, "kp", "value")?,
                }
            },
            "ki" => {
                check_arity(&args, 1, "ki")?;
                Command::Ki {
                    value: arg(&args, 0, "ki", "value")?,
                }
            },
            "kd" => {
                check_arity(&args, 1, "kd")?;
                Command::Kd {
                    value: arg(&args, 0, "kd", "value")?,
                }
            },
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// 在给定控制器上执行指令
///
/// 未绑定控制器、模拟器专有指令用在执行器上、或执行出错时返回 `false`。
pub fn dispatch(controller: Option<&Controller>, command: &Command) -> bool {
    match try_dispatch(controller, command) {
        Ok(()) => true,
        Err(e) => {
            warn!("{} failed: {}", command.name(), e);
            false
        },
    }
}

/// 与 [`dispatch`] 相同，但返回具体错误
///
/// 未绑定控制器时返回 [`ControlError::UnboundBackend`]。
pub fn try_dispatch(
    controller: Option<&Controller>,
    command: &Command,
) -> Result<(), ControlError> {
    let controller = controller.ok_or(ControlError::UnboundBackend)?;
    execute(controller, command)
}

fn execute(controller: &Controller, command: &Command) -> Result<(), ControlError> {
    match *command {
        Command::Move { x, y, dt } => controller.move_by(Vector2i::new(x, y), dt),
        Command::Actuate {
            index,
            duration,
            delay,
        } => controller.actuate(index, duration, delay),
        Command::MoveTo {
            x,
            y,
            duration,
            delay,
        } => controller.move_to(x as f64, y as f64, duration, delay),
        Command::Reset => {
            simulator(controller)?.reset();
            Ok(())
        },
        Command::Kp { value } => simulator(controller)?.set_kp(value),
        Command::Ki { value } => simulator(controller)?.set_ki(value),
        Command::Kd { value } => simulator(controller)?.set_kd(value),
    }
}

fn simulator(controller: &Controller) -> Result<&crate::backend::Simulator, ControlError> {
    controller.as_simulator().ok_or(ControlError::NotSimulator)
}

/// 当前控制器的绑定点
///
/// 自动化方持有 `Dispatcher`，控制器可随时绑定/解绑。
#[derive(Debug, Default)]
pub struct Dispatcher {
    binding: ArcSwapOption<Controller>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(controller: Arc<Controller>) -> Self {
        let dispatcher = Self::new();
        dispatcher.bind(controller);
        dispatcher
    }

    pub fn bind(&self, controller: Arc<Controller>) {
        info!("Dispatcher bound to {} controller", controller.kind());
        self.binding.store(Some(controller));
    }

    pub fn unbind(&self) -> Option<Arc<Controller>> {
        let previous = self.binding.swap(None);
        if previous.is_some() {
            info!("Dispatcher unbound");
        }
        previous
    }

    pub fn is_bound(&self) -> bool {
        self.binding.load().is_some()
    }

    pub fn controller(&self) -> Option<Arc<Controller>> {
        self.binding.load_full()
    }

    /// 执行一条指令
    pub fn execute(&self, command: &Command) -> bool {
        let controller = self.binding.load_full();
        dispatch(controller.as_deref(), command)
    }

    /// 执行一条指令并返回具体错误
    pub fn try_execute(&self, command: &Command) -> Result<(), ControlError> {
        let controller = self.binding.load_full();
        try_dispatch(controller.as_deref(), command)
    }

    pub fn send_movement(&self, x: i32, y: i32, dt: i64) -> bool {
        self.execute(&Command::Move { x, y, dt })
    }

    pub fn send_actuation(&self, index: i32, duration: i64, delay: i64) -> bool {
        self.execute(&Command::Actuate {
            index,
            duration,
            delay,
        })
    }

    pub fn send_movement_to(&self, x: i32, y: i32, duration: i64, delay: i64) -> bool {
        self.execute(&Command::MoveTo {
            x,
            y,
            duration,
            delay,
        })
    }

    pub fn reset_simulator(&self) -> bool {
        self.execute(&Command::Reset)
    }

    pub fn set_proportion(&self, value: f64) -> bool {
        self.execute(&Command::Kp { value })
    }

    pub fn set_integral(&self, value: f64) -> bool {
        self.execute(&Command::Ki { value })
    }

    pub fn set_derivative(&self, value: f64) -> bool {
        self.execute(&Command::Kd { value })
    }

    /// 试算达到速度 (vx, vy) 所需电流，仅模拟器
    pub fn calculate_currents(&self, vx: f64, vy: f64) -> Option<Currents> {
        let controller = self.binding.load_full()?;
        let sim = controller.as_simulator()?;
        match sim.calculate_currents(Vector2f::new(vx, vy)) {
            Ok(currents) => Some(currents),
            Err(e) => {
                warn!("Current calculation failed: {}", e);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Actuator, ActuatorConfig, Simulator};
    use crate::keyboard::{Key, KeyboardState};
    use crate::scene::{SceneParams, SimScene};
    use minotaur_serial::MockSerialAdapter;

    fn simulator_controller() -> Arc<Controller> {
        let scene = Arc::new(SimScene::new(SceneParams {
            realtime: false,
            ..SceneParams::default()
        }));
        Arc::new(
            Controller::new(
                Box::new(Simulator::new(scene)),
                Arc::new(KeyboardState::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_unbound_returns_false() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.is_bound());
        assert!(!dispatcher.send_movement(1, 0, 1000));
        assert!(!dispatcher.send_actuation(0, 100, 0));
        assert!(!dispatcher.send_movement_to(10, 10, 1000, 0));
        assert!(!dispatcher.reset_simulator());
        assert!(!dispatcher.set_proportion(1.0));
        assert!(dispatcher.calculate_currents(0.1, 0.0).is_none());
        assert!(!dispatch(None, &Command::Reset));
        assert!(matches!(
            dispatcher.try_execute(&Command::Reset),
            Err(ControlError::UnboundBackend)
        ));
    }

    #[test]
    fn test_non_finite_gains_rejected() {
        let controller = simulator_controller();
        let dispatcher = Dispatcher::with_controller(controller.clone());
        assert!(dispatcher.set_proportion(2.0));

        for line in ["kp inf", "ki nan", "kd -inf"] {
            let command: Command = line.parse().unwrap();
            assert!(!dispatcher.execute(&command), "{} accepted", line);
            assert!(matches!(
                dispatcher.try_execute(&command),
                Err(ControlError::InvalidInput(_))
            ));
        }

        let gains = controller.as_simulator().unwrap().gains();
        assert_eq!((gains.kp, gains.ki, gains.kd), (2.0, 0.0, 0.0));
    }

    #[test]
    fn test_overflowing_move_returns_false() {
        let controller = simulator_controller();
        let dispatcher = Dispatcher::with_controller(controller.clone());

        controller.invert_axis(crate::geometry::Axis::X);
        assert!(!dispatcher.send_movement(i32::MIN, 0, 100));
        assert!(matches!(
            dispatcher.try_execute(&Command::Move {
                x: i32::MIN,
                y: 0,
                dt: 100
            }),
            Err(ControlError::InvalidInput(_))
        ));
        assert!(controller.keyboard().is_empty());

        // 未反向的轴不受影响
        assert!(dispatcher.send_movement(0, i32::MIN, 1000));
        assert!(controller.is_key_down(Key::Down));
    }

    #[test]
    fn test_bound_simulator() {
        let controller = simulator_controller();
        let dispatcher = Dispatcher::with_controller(controller.clone());

        assert!(dispatcher.send_actuation(1, 1000, 0));
        assert!(controller.is_key_down(Key::Right));

        assert!(dispatcher.set_proportion(3.0));
        assert!(dispatcher.set_integral(0.5));
        assert!(dispatcher.set_derivative(0.25));
        let gains = controller.as_simulator().unwrap().gains();
        assert_eq!((gains.kp, gains.ki, gains.kd), (3.0, 0.5, 0.25));

        assert!(dispatcher.reset_simulator());
        assert!(dispatcher.calculate_currents(0.1, 0.0).is_some());

        dispatcher.unbind();
        assert!(!dispatcher.send_actuation(1, 1000, 0));
    }

    #[test]
    fn test_simulator_only_commands_fail_on_actuator() {
        let controller = Arc::new(
            Controller::new(
                Box::new(Actuator::new(
                    Box::new(MockSerialAdapter::new()),
                    ActuatorConfig::default(),
                )),
                Arc::new(KeyboardState::new()),
            )
            .unwrap(),
        );
        let dispatcher = Dispatcher::with_controller(controller);

        assert!(dispatcher.send_movement(1, 0, 1000));
        assert!(!dispatcher.reset_simulator());
        assert!(!dispatcher.set_proportion(2.0));
        assert!(dispatcher.calculate_currents(0.1, 0.0).is_none());
    }

    #[test]
    fn test_parse_text_commands() {
        assert_eq!(
            "move 10 0 500".parse::<Command>().unwrap(),
            Command::Move { x: 10, y: 0, dt: 500 }
        );
        assert_eq!(
            "actuate 0".parse::<Command>().unwrap(),
            Command::Actuate {
                index: 0,
                duration: 1000,
                delay: 0
            }
        );
        assert_eq!(
            "MoveTo 40 0 2000 100".parse::<Command>().unwrap(),
            Command::MoveTo {
                x: 40,
                y: 0,
                duration: 2000,
                delay: 100
            }
        );
        assert_eq!("reset".parse::<Command>().unwrap(), Command::Reset);
        assert_eq!(
            "kp 2.5".parse::<Command>().unwrap(),
            Command::Kp { value: 2.5 }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "fly 1 2".parse::<Command>(),
            Err(ParseCommandError::Unknown("fly".to_string()))
        );
        assert_eq!(
            "move 1".parse::<Command>(),
            Err(ParseCommandError::MissingArgument {
                command: "move",
                argument: "y"
            })
        );
        assert_eq!(
            "kp abc".parse::<Command>(),
            Err(ParseCommandError::InvalidNumber("abc".to_string()))
        );
        assert_eq!(
            "reset now".parse::<Command>(),
            Err(ParseCommandError::TooManyArguments("reset"))
        );
    }

    #[test]
    fn test_json_defaults() {
        let cmd: Command = serde_json::from_str(r#"{"type": "moveto", "x": 40, "y": -5}"#).unwrap();
        assert_eq!(
            cmd,
            Command::MoveTo {
                x: 40,
                y: -5,
                duration: 1000,
                delay: 0
            }
        );

        let cmd: Command = serde_json::from_str(r#"{"type": "move", "x": 1, "y": 0}"#).unwrap();
        assert_eq!(cmd, Command::Move { x: 1, y: 0, dt: 1000 });

        let cmd: Command = serde_json::from_str(r#"{"type": "reset"}"#).unwrap();
        assert_eq!(cmd, Command::Reset);
    }
}
