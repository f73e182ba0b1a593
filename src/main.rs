//! 回放工具：从 JSON 文件读取一批云端记录，合并进本地索引

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use gallerysync_lib::config::{data_dir, MergeConfig};
use gallerysync_lib::core::{CloudRecord, FileDataHandler, SqliteIdAllocator};
use gallerysync_lib::db::{open_pool, SqliteIndex};
use gallerysync_lib::logging::{init_logging, LogConfig};
use gallerysync_lib::storage::LocalStorage;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let records_file = &cli.records;

    let data_dir = cli.data_dir.clone().unwrap_or_else(data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let sandbox_dir = cli.sandbox_dir(&data_dir);

    let _guard = init_logging(&data_dir.join("logs"), &LogConfig::load(&data_dir))?;
    let config = MergeConfig::load(&data_dir);

    let content = std::fs::read_to_string(&records_file)
        .with_context(|| format!("cannot read {}", records_file.display()))?;
    let mut records: Vec<CloudRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of records", records_file.display()))?;

    let db = Arc::new(open_pool(&config.db_path(&data_dir)).await?);
    let handler = FileDataHandler::new(
        Arc::new(SqliteIndex::new(db.clone())),
        Arc::new(SqliteIdAllocator::new(db.clone())),
        Arc::new(LocalStorage::new(sandbox_dir)?),
        &config,
    );

    tracing::info!("回放 {} 条记录: {}", records.len(), records_file.display());
    let report = handler.on_fetch_records(&mut records).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    db.close().await;
    Ok(())
}
