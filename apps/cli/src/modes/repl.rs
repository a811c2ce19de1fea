//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程持有 rustyline Editor（保留历史），经 crossbeam 通道把
//! 输入行交给主线程执行。Ctrl+C 在主线程触发急停。

use anyhow::Result;
use crossbeam_channel::{Receiver, bounded};
use minotaur_sdk::prelude::*;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::thread;
use std::time::Duration;

use crate::rig::{BackendArg, Rig};

/// Ctrl+C 在通道上的标记
const SIGINT: &str = "\u{3}";

const HISTORY_FILE: &str = ".minotaur_history";

/// 输入线程
struct ReplInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<()>,
}

impl ReplInput {
    fn new() -> Result<Self> {
        let (command_tx, command_rx) = bounded::<String>(10);

        // Editor 在输入线程内创建，生命周期 = REPL 会话
        let input_thread = thread::Builder::new()
            .name("minotaur-repl-input".to_string())
            .spawn(move || {
                let mut rl = match DefaultEditor::new() {
                    Ok(rl) => rl,
                    Err(e) => {
                        eprintln!("Failed to initialize readline: {}", e);
                        return;
                    },
                };
                rl.load_history(HISTORY_FILE).ok();

                loop {
                    match rl.readline("sam> ") {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            let _ = rl.add_history_entry(line.as_str());
                            let quit = line == "exit" || line == "quit";
                            if command_tx.send(line).is_err() || quit {
                                break;
                            }
                        },
                        Err(ReadlineError::Interrupted) => {
                            println!("^C");
                            let _ = command_tx.send(SIGINT.to_string());
                        },
                        Err(ReadlineError::Eof) => break,
                        Err(err) => {
                            eprintln!("Error: {:?}", err);
                            break;
                        },
                    }
                }
                rl.save_history(HISTORY_FILE).ok();
            })?;

        Ok(Self {
            command_rx,
            _input_thread: input_thread,
        })
    }
}

/// Shell 内的一行
#[derive(Debug, PartialEq)]
enum ShellLine {
    Exit,
    Help,
    Status,
    Stop,
    Wait(Duration),
    Invert(Axis),
    Dispatch(Command),
}

fn parse_line(line: &str) -> Result<ShellLine> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    Ok(match head {
        "exit" | "quit" => ShellLine::Exit,
        "help" => ShellLine::Help,
        "status" => ShellLine::Status,
        "stop" => ShellLine::Stop,
        "wait" => {
            let ms: u64 = rest
                .first()
                .ok_or_else(|| anyhow::anyhow!("用法: wait <ms>"))?
                .parse()?;
            ShellLine::Wait(Duration::from_millis(ms))
        },
        "invert" => match rest.first().copied() {
            Some("x") | Some("X") => ShellLine::Invert(Axis::X),
            Some("y") | Some("Y") => ShellLine::Invert(Axis::Y),
            _ => anyhow::bail!("用法: invert <x|y>"),
        },
        _ => ShellLine::Dispatch(line.parse()?),
    })
}

/// 运行 REPL
pub fn run_repl(backend: BackendArg, config: &MinotaurConfig, port: Option<&str>) -> Result<()> {
    let rig = Rig::connect(backend, config, port)?;

    println!("Minotaur CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();

    let input = ReplInput::new()?;
    while let Ok(line) = input.command_rx.recv() {
        if line == SIGINT {
            eprintln!("🛑 急停");
            rig.emergency_stop();
            continue;
        }

        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("❌ {}", e);
                eprintln!("💡 提示: 输入 'help' 查看所有命令");
                continue;
            },
        };

        match parsed {
            ShellLine::Exit => {
                println!("👋 再见！");
                break;
            },
            ShellLine::Help => print_help(),
            ShellLine::Status => println!("📊 {}", rig.status()),
            ShellLine::Stop => {
                rig.emergency_stop();
                println!("✅ 已急停");
            },
            ShellLine::Wait(duration) => thread::sleep(duration),
            ShellLine::Invert(axis) => {
                rig.controller.invert_axis(axis);
                println!("✅ 反向: {:?}", rig.controller.inversion());
            },
            ShellLine::Dispatch(command) => {
                // 错误隔离：防止 panic 导致 REPL 崩溃
                let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                    rig.dispatcher.execute(&command)
                }));
                match outcome {
                    Ok(true) => println!("✅ {}", command.name()),
                    Ok(false) => eprintln!("❌ {} 执行失败（详见日志）", command.name()),
                    Err(_) => eprintln!("❌ {} panicked", command.name()),
                }
            },
        }
    }

    rig.emergency_stop();
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  move <x> <y> [dt]                 按方向移动 dt 毫秒");
    println!("  actuate <index> [duration] [delay] 触发执行器 (0=左 1=右 2=上 3=下)");
    println!("  moveto <x> <y> [duration] [delay]  PID 移动到 (x, y) 毫米");
    println!("  reset                             SAM 回到中心（模拟器）");
    println!("  kp|ki|kd <value>                  设置 PID 增益（模拟器）");
    println!("  invert <x|y>                      翻转坐标轴");
    println!("  wait <ms>                         暂停");
    println!("  status                            显示状态");
    println!("  stop                              急停");
    println!("  help                              显示帮助");
    println!("  exit / quit                       退出");
    println!();
    println!("快捷键:");
    println!("  Ctrl+C                            急停");
    println!("  Ctrl+D                            退出");
    println!();
}
