//! currents 命令：试算达到目标速度所需的电流

use anyhow::{Result, anyhow};
use clap::Args;
use minotaur_sdk::MinotaurConfig;

use crate::rig::Rig;

#[derive(Args, Debug)]
pub struct CurrentsCommand {
    /// 目标速度 x (m/s)
    #[arg(allow_hyphen_values = true)]
    pub vx: f64,

    /// 目标速度 y (m/s)
    #[arg(allow_hyphen_values = true)]
    pub vy: f64,
}

impl CurrentsCommand {
    pub fn execute(&self, config: &MinotaurConfig) -> Result<()> {
        let rig = Rig::simulator(config)?;
        let currents = rig
            .dispatcher
            .calculate_currents(self.vx, self.vy)
            .ok_or_else(|| anyhow!("当前位置无解"))?;
        println!(
            "Ih = {:.3} A, Iv = {:.3} A",
            currents.horizontal, currents.vertical
        );
        Ok(())
    }
}
