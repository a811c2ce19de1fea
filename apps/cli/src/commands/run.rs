//! run 命令
//!
//! 执行脚本文件

use anyhow::Result;
use clap::Args;
use minotaur_sdk::MinotaurConfig;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::rig::{BackendArg, Rig};
use crate::script::{Script, ScriptConfig, ScriptExecutor};

/// 脚本执行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 脚本文件路径
    #[arg(short, long)]
    pub script: String,

    /// 失败时继续执行
    #[arg(long)]
    pub continue_on_error: bool,

    /// 脚本结束后等待运动完成的上限（毫秒）
    #[arg(long, default_value_t = 30_000)]
    pub settle_ms: u64,
}

impl RunCommand {
    pub fn execute(
        &self,
        backend: BackendArg,
        config: &MinotaurConfig,
        port: Option<&str>,
    ) -> Result<()> {
        println!("📜 加载脚本: {}", self.script);
        let script = Script::load(&self.script)?;
        if !script.name.is_empty() {
            println!("📋 脚本: {}", script.name);
        }
        if !script.description.is_empty() {
            println!("    {}", script.description);
        }
        println!("    {} 个步骤", script.steps.len());
        println!();

        let rig = Rig::connect(backend, config, port)?;
        let executor = ScriptExecutor::new(ScriptConfig {
            continue_on_error: self.continue_on_error,
            settle_timeout: Duration::from_millis(self.settle_ms),
        });

        let interrupt = executor.interrupt_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            eprintln!("\n🛑 收到 Ctrl+C，停止脚本...");
            interrupt.store(true, Ordering::Release);
        }) {
            tracing::warn!("Ctrl+C handler not installed: {}", e);
        }

        let result = executor.execute(&script, &rig.dispatcher);
        if result.interrupted {
            rig.emergency_stop();
        }

        println!();
        println!("📊 执行结果:");
        println!("  总步骤数: {}", result.total_steps);
        println!("  成功: {}", result.succeeded);
        println!("  失败: {}", result.failed.len());
        println!("  耗时: {:.2} 秒", result.duration.as_secs_f64());
        println!("  状态: {}", rig.status());

        if result.interrupted {
            println!("🛑 已中断");
        } else if !result.settled {
            println!("⚠️  运动未在 {} ms 内结束", self.settle_ms);
        }

        if !result.failed.is_empty() {
            println!();
            println!("❌ 失败的步骤:");
            for (idx, err) in &result.failed {
                println!("  步骤 {}: {}", idx + 1, err);
            }
            anyhow::bail!("{} 个步骤失败", result.failed.len());
        }
        Ok(())
    }
}
