//! # Minotaur CLI
//!
//! SAM 磁驱机器人命令行工具。
//!
//! ### 脚本模式
//!
//! ```bash
//! minotaur-cli run --script demo.json
//! minotaur-cli --backend actuator --port /dev/ttyUSB0 run --script demo.json
//! ```
//!
//! ### Shell 模式
//!
//! ```bash
//! $ minotaur-cli shell
//! sam> kp 5
//! sam> moveto 40 0 2000
//! sam> wait 2000
//! sam> status
//! sam> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod modes;
mod rig;
mod script;

use commands::{ConfigCommand, CurrentsCommand, RunCommand};
use rig::BackendArg;

/// Minotaur CLI - SAM 磁驱机器人命令行工具
#[derive(Parser, Debug)]
#[command(name = "minotaur-cli")]
#[command(about = "Command-line interface for the SAM magnetic robot", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（默认: 用户配置目录下的 minotaur/config.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 后端
    #[arg(short, long, global = true, value_enum, default_value_t = BackendArg::Sim)]
    backend: BackendArg,

    /// 串口（覆盖配置，仅 actuator 后端）
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 执行 JSON 脚本
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 试算目标速度所需的线圈电流
    Currents {
        #[command(flatten)]
        args: CurrentsCommand,
    },

    /// 启动交互式 Shell
    Shell,
}

fn main() -> Result<()> {
    // 初始化日志（RUST_LOG 优先）
    minotaur_sdk::try_init_logger()?;

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => commands::config::default_config_file()?,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config_path),

        Commands::Run { args } => {
            let config = commands::config::load_or_default(&config_path)?;
            args.execute(cli.backend, &config, cli.port.as_deref())
        },

        Commands::Currents { args } => {
            let config = commands::config::load_or_default(&config_path)?;
            args.execute(&config)
        },

        Commands::Shell => {
            let config = commands::config::load_or_default(&config_path)?;
            modes::repl::run_repl(cli.backend, &config, cli.port.as_deref())
        },
    }
}
