//! 本地资产索引 - 合并引擎访问本地数据的唯一入口

use super::models::{AlbumMembershipRow, IndexChange, LocalAssetRow};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

/// 本地资产索引接口
///
/// 查询失败一律返回 `StoreFault`；行内容是否可读由调用方判断。
#[async_trait]
pub trait LocalIndex: Send + Sync {
    /// 按沙箱路径查找所有匹配行
    async fn find_by_path(&self, path: &str) -> Result<Vec<LocalAssetRow>>;

    async fn find_by_id(&self, file_id: i64) -> Result<Option<LocalAssetRow>>;

    async fn find_by_cloud_id(&self, cloud_id: &str) -> Result<Option<LocalAssetRow>>;

    /// 插入或覆盖一行
    async fn upsert_row(&self, row: &LocalAssetRow) -> Result<()>;

    /// 更新已存在的行，返回受影响行数
    async fn update_row(&self, row: &LocalAssetRow) -> Result<u64>;

    async fn delete_row(&self, file_id: i64) -> Result<u64>;

    /// 查询资产的相册成员关系
    async fn find_membership(&self, asset_id: i64) -> Result<Vec<AlbumMembershipRow>>;

    async fn upsert_membership(&self, row: &AlbumMembershipRow) -> Result<()>;

    async fn remove_membership(&self, asset_id: i64, album_id: i64) -> Result<u64>;

    /// 批量提交资产行和成员关系的写操作
    async fn commit(&self, changes: &[IndexChange]) -> Result<()> {
        for change in changes {
            match change {
                IndexChange::UpsertRow(row) => self.upsert_row(row).await?,
                IndexChange::DeleteRow(file_id) => {
                    self.delete_row(*file_id).await?;
                }
                IndexChange::UpsertMembership(row) => self.upsert_membership(row).await?,
                IndexChange::RemoveMembership { asset_id, album_id } => {
                    self.remove_membership(*asset_id, *album_id).await?;
                }
            }
        }
        Ok(())
    }
}

/// SQLite 实现
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    db: Arc<SqlitePool>,
}

const ROW_COLUMNS: &str =
    "file_id, data, display_name, size, date_modified, media_type, dirty, cloud_id";

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn upsert_row_query(row: &LocalAssetRow) -> SqliteQuery<'_> {
    sqlx::query(
        r#"INSERT INTO photos (file_id, data, display_name, size, date_modified, media_type, dirty, cloud_id)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(file_id) DO UPDATE SET
               data = excluded.data,
               display_name = excluded.display_name,
               size = excluded.size,
               date_modified = excluded.date_modified,
               media_type = excluded.media_type,
               dirty = excluded.dirty,
               cloud_id = excluded.cloud_id"#,
    )
    .bind(row.file_id)
    .bind(row.data.clone())
    .bind(row.display_name.clone())
    .bind(row.size)
    .bind(row.date_modified)
    .bind(row.media_type)
    .bind(row.dirty)
    .bind(row.cloud_id.clone())
}

fn upsert_membership_query(row: &AlbumMembershipRow) -> SqliteQuery<'_> {
    sqlx::query(
        r#"INSERT INTO photo_map (asset_id, album_id, dirty) VALUES (?, ?, ?)
           ON CONFLICT(asset_id, album_id) DO UPDATE SET dirty = excluded.dirty"#,
    )
    .bind(row.asset_id)
    .bind(row.album_id)
    .bind(row.dirty)
}

impl SqliteIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl LocalIndex for SqliteIndex {
    async fn find_by_path(&self, path: &str) -> Result<Vec<LocalAssetRow>> {
        let rows = sqlx::query_as::<_, LocalAssetRow>(&format!(
            "SELECT {} FROM photos WHERE data = ?",
            ROW_COLUMNS
        ))
        .bind(path)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows)
    }

    async fn find_by_id(&self, file_id: i64) -> Result<Option<LocalAssetRow>> {
        let row = sqlx::query_as::<_, LocalAssetRow>(&format!(
            "SELECT {} FROM photos WHERE file_id = ?",
            ROW_COLUMNS
        ))
        .bind(file_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row)
    }

    async fn find_by_cloud_id(&self, cloud_id: &str) -> Result<Option<LocalAssetRow>> {
        let row = sqlx::query_as::<_, LocalAssetRow>(&format!(
            "SELECT {} FROM photos WHERE cloud_id = ? LIMIT 1",
            ROW_COLUMNS
        ))
        .bind(cloud_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row)
    }

    async fn upsert_row(&self, row: &LocalAssetRow) -> Result<()> {
        upsert_row_query(row).execute(&*self.db).await?;
        Ok(())
    }

    async fn update_row(&self, row: &LocalAssetRow) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE photos SET
                   data = ?, display_name = ?, size = ?, date_modified = ?,
                   media_type = ?, dirty = ?, cloud_id = ?
               WHERE file_id = ?"#,
        )
        .bind(&row.data)
        .bind(&row.display_name)
        .bind(row.size)
        .bind(row.date_modified)
        .bind(row.media_type)
        .bind(row.dirty)
        .bind(&row.cloud_id)
        .bind(row.file_id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_row(&self, file_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM photos WHERE file_id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_membership(&self, asset_id: i64) -> Result<Vec<AlbumMembershipRow>> {
        let rows = sqlx::query_as::<_, AlbumMembershipRow>(
            "SELECT asset_id, album_id, dirty FROM photo_map WHERE asset_id = ? ORDER BY album_id",
        )
        .bind(asset_id)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows)
    }

    async fn upsert_membership(&self, row: &AlbumMembershipRow) -> Result<()> {
        upsert_membership_query(row).execute(&*self.db).await?;
        Ok(())
    }

    async fn remove_membership(&self, asset_id: i64, album_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM photo_map WHERE asset_id = ? AND album_id = ?")
            .bind(asset_id)
            .bind(album_id)
            .execute(&*self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 在一个事务中提交，任何一步失败都整体回滚
    async fn commit(&self, changes: &[IndexChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        for change in changes {
            match change {
                IndexChange::UpsertRow(row) => {
                    upsert_row_query(row).execute(&mut *tx).await?;
                }
                IndexChange::DeleteRow(file_id) => {
                    sqlx::query("DELETE FROM photos WHERE file_id = ?")
                        .bind(file_id)
                        .execute(&mut *tx)
                        .await?;
                }
                IndexChange::UpsertMembership(row) => {
                    upsert_membership_query(row).execute(&mut *tx).await?;
                }
                IndexChange::RemoveMembership { asset_id, album_id } => {
                    sqlx::query("DELETE FROM photo_map WHERE asset_id = ? AND album_id = ?")
                        .bind(asset_id)
                        .bind(album_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        debug!("提交 {} 条索引变更", changes.len());
        Ok(())
    }
}
