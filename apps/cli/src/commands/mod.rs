//! 子命令实现

pub mod config;
pub mod currents;
pub mod run;

pub use config::ConfigCommand;
pub use currents::CurrentsCommand;
pub use run::RunCommand;
