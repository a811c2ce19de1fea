//! 配置管理命令
//!
//! 读写 TOML 配置文件。键名形如 `pid.kp`、`serial.port`。

use anyhow::{Context, Result};
use clap::Subcommand;
use minotaur_sdk::MinotaurConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("minotaur");
    path.push("config.toml");
    Ok(path)
}

/// 加载配置，文件不存在时使用默认值
pub fn load_or_default(path: &Path) -> Result<MinotaurConfig> {
    if !path.exists() {
        return Ok(MinotaurConfig::default());
    }
    MinotaurConfig::load(path).with_context(|| format!("加载配置失败: {}", path.display()))
}

fn save(config: &MinotaurConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("创建配置目录失败")?;
    }
    config
        .save(path)
        .with_context(|| format!("写入配置失败: {}", path.display()))
}

/// 命令行上的值：依次尝试整数、浮点、布尔，最后按字符串处理
fn parse_value(raw: &str) -> toml::Value {
    if let Ok(v) = raw.parse::<i64>() {
        toml::Value::Integer(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        toml::Value::Float(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        toml::Value::Boolean(v)
    } else {
        toml::Value::String(raw.to_string())
    }
}

/// 设置 `section.field`，结果需通过校验
pub fn set_key(config: &MinotaurConfig, key: &str, raw: &str) -> Result<MinotaurConfig> {
    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("键名应为 section.field: {}", key))?;

    let mut doc = toml::Value::try_from(config).context("序列化配置失败")?;
    let table = doc
        .get_mut(section)
        .and_then(toml::Value::as_table_mut)
        .ok_or_else(|| anyhow::anyhow!("未知配置段: {}", section))?;

    let mut value = parse_value(raw);
    // 浮点字段接受整数写法
    if let (Some(toml::Value::Float(_)), toml::Value::Integer(i)) = (table.get(field), &value) {
        value = toml::Value::Float(*i as f64);
    }
    // 未设置的可选项不会出现在序列化结果里
    if !table.contains_key(field) && key != "serial.port" {
        anyhow::bail!("未知配置项: {}", key);
    }
    table.insert(field.to_string(), value);

    let updated: MinotaurConfig = doc.try_into().context("配置项类型不匹配")?;
    updated.validate()?;
    Ok(updated)
}

/// 读取 `section.field` 或整个配置段
pub fn get_key(config: &MinotaurConfig, key: &str) -> Result<String> {
    let doc = toml::Value::try_from(config).context("序列化配置失败")?;
    let value = key
        .split('.')
        .try_fold(&doc, |v, part| v.get(part))
        .ok_or_else(|| anyhow::anyhow!("未知配置项: {}", key))?;
    Ok(match value {
        toml::Value::Table(_) => toml::to_string_pretty(value)?,
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 写入默认配置
    Init {
        /// 覆盖已有文件
        #[arg(long)]
        force: bool,
    },

    /// 设置配置项（如 `pid.kp 5`）
    Set { key: String, value: String },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
                }
                save(&MinotaurConfig::default(), path)?;
                println!("✅ 已写入默认配置: {}", path.display());
                Ok(())
            },

            ConfigCommand::Set { key, value } => {
                let config = set_key(&load_or_default(path)?, &key, &value)?;
                save(&config, path)?;
                println!("✅ {} = {}", key, value);
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let config = load_or_default(path)?;
                if key == "all" {
                    print!("{}", config.to_toml_string()?);
                } else {
                    println!("{}", get_key(&config, &key)?);
                }
                Ok(())
            },

            ConfigCommand::Check => {
                println!("配置文件: {}", path.display());
                if !path.exists() {
                    println!("  (不存在，使用默认配置)");
                    return Ok(());
                }
                let config = load_or_default(path)?;
                println!("✅ 配置有效");
                println!("  增益: {:?}", config.gains());
                println!("  串口: {:?}", config.serial.port);
                Ok(())
            },
        }
    }
}
