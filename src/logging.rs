//! 日志模块 - 按天滚动的文件日志

use crate::config::{load_section, save_section};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 保留的日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            max_files: default_max_files(),
        }
    }
}

impl LogConfig {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "log")
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        save_section(config_dir, "log", self)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 初始化日志系统
///
/// 返回的 guard 必须存活到进程结束，否则缓冲中的日志会丢失。
/// 日志被禁用时返回 `None`。
pub fn init_logging(log_dir: &Path, config: &LogConfig) -> Result<Option<WorkerGuard>> {
    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return Ok(None);
    }

    std::fs::create_dir_all(log_dir)?;

    let env_filter = EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into())
        .add_directive("sqlx=warn".parse()?);

    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix("gallerysync")
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // debug 模式下同时输出到控制台
    #[cfg(debug_assertions)]
    {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    #[cfg(not(debug_assertions))]
    {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    Ok(Some(guard))
}
