//! 配置模块 - config.json 中的各个配置段

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "gallerysync";

/// 读取配置段，文件不存在或内容无效时返回默认值
pub(crate) fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, section: &str) -> T {
    fs::read_to_string(config_dir.join(CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get(section).cloned())
        .and_then(|value| serde_json::from_value::<T>(value).ok())
        .unwrap_or_default()
}

/// 写入配置段，保留文件中的其他配置段
pub(crate) fn save_section<T: Serialize>(config_dir: &Path, section: &str, value: &T) -> Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[section] = serde_json::to_value(value)?;

    fs::create_dir_all(config_dir)?;
    fs::write(&config_file, serde_json::to_string_pretty(&config)?)?;
    Ok(())
}

/// 合并引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    /// 资产沙箱根目录
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: String,
    /// 挪开冲突文件时最多尝试的后缀数
    #[serde(default = "default_max_conflict_suffix")]
    pub max_conflict_suffix: u32,
    /// 本地索引数据库文件名（相对数据目录）
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

fn default_sandbox_root() -> String {
    "/storage/cloud/files".to_string()
}

fn default_max_conflict_suffix() -> u32 {
    100
}

fn default_db_file() -> String {
    "gallerysync.db".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            sandbox_root: default_sandbox_root(),
            max_conflict_suffix: default_max_conflict_suffix(),
            db_file: default_db_file(),
        }
    }
}

impl MergeConfig {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "merge")
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        save_section(config_dir, "merge", self)
    }

    pub fn db_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.db_file)
    }
}

/// 默认数据目录：系统配置目录下的 gallerysync
pub fn data_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
    } else {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    };

    base.map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}
