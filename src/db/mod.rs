pub mod index;
pub mod models;

#[cfg(test)]
pub mod fake;

pub use index::{LocalIndex, SqliteIndex};
pub use models::*;

use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
pub use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// 打开（必要时创建）本地索引数据库并执行迁移
pub async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    // Windows 路径需要转换反斜杠为正斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| crate::error::MergeError::invalid("Invalid database path"))?
        .replace('\\', "/");

    let db = SqlitePoolOptions::new()
        .max_connections(5) // SQLite 单文件，不需要太多连接
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    Ok(db)
}

/// 内存数据库（测试用）
///
/// 只保留一个永不过期的连接，否则内存库会随连接一起消失。
pub async fn open_memory_pool() -> Result<SqlitePool> {
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    Ok(db)
}
