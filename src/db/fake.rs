//! 测试用的内存索引，可注入查询失败

use super::index::LocalIndex;
use super::models::{AlbumMembershipRow, IndexChange, LocalAssetRow};
use crate::error::{MergeError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeIndex {
    pub rows: Mutex<Vec<LocalAssetRow>>,
    pub memberships: Mutex<Vec<AlbumMembershipRow>>,
    /// 路径查询不返回结果集
    pub fail_find_by_path: AtomicBool,
    pub fail_find_membership: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FakeIndex {
    pub fn with_rows(rows: Vec<LocalAssetRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn with_memberships(self, memberships: Vec<AlbumMembershipRow>) -> Self {
        *self.memberships.lock().unwrap() = memberships;
        self
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn memberships_of(&self, asset_id: i64) -> Vec<AlbumMembershipRow> {
        let mut rows: Vec<_> = self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.asset_id == asset_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.album_id);
        rows
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(MergeError::store(format!("{} returned no result set", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalIndex for FakeIndex {
    async fn find_by_path(&self, path: &str) -> Result<Vec<LocalAssetRow>> {
        Self::check(&self.fail_find_by_path, "find_by_path")?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.data.as_deref() == Some(path))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, file_id: i64) -> Result<Option<LocalAssetRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.file_id == file_id)
            .cloned())
    }

    async fn find_by_cloud_id(&self, cloud_id: &str) -> Result<Option<LocalAssetRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.cloud_id.as_deref() == Some(cloud_id))
            .cloned())
    }

    async fn upsert_row(&self, row: &LocalAssetRow) -> Result<()> {
        Self::check(&self.fail_writes, "upsert_row")?;
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| r.file_id != row.file_id);
        rows.push(row.clone());
        Ok(())
    }

    async fn update_row(&self, row: &LocalAssetRow) -> Result<u64> {
        Self::check(&self.fail_writes, "update_row")?;
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.file_id == row.file_id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_row(&self, file_id: i64) -> Result<u64> {
        Self::check(&self.fail_writes, "delete_row")?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.file_id != file_id);
        Ok((before - rows.len()) as u64)
    }

    async fn find_membership(&self, asset_id: i64) -> Result<Vec<AlbumMembershipRow>> {
        Self::check(&self.fail_find_membership, "find_membership")?;
        Ok(self.memberships_of(asset_id))
    }

    async fn upsert_membership(&self, row: &AlbumMembershipRow) -> Result<()> {
        Self::check(&self.fail_writes, "upsert_membership")?;
        let mut memberships = self.memberships.lock().unwrap();
        memberships.retain(|m| !(m.asset_id == row.asset_id && m.album_id == row.album_id));
        memberships.push(row.clone());
        Ok(())
    }

    async fn remove_membership(&self, asset_id: i64, album_id: i64) -> Result<u64> {
        Self::check(&self.fail_writes, "remove_membership")?;
        let mut memberships = self.memberships.lock().unwrap();
        let before = memberships.len();
        memberships.retain(|m| !(m.asset_id == asset_id && m.album_id == album_id));
        Ok((before - memberships.len()) as u64)
    }

    /// 先检查再整体应用，失败时什么都不写
    async fn commit(&self, changes: &[IndexChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        Self::check(&self.fail_writes, "commit")?;

        let mut rows = self.rows.lock().unwrap();
        let mut memberships = self.memberships.lock().unwrap();
        for change in changes {
            match change {
                IndexChange::UpsertRow(row) => {
                    rows.retain(|r| r.file_id != row.file_id);
                    rows.push(row.clone());
                }
                IndexChange::DeleteRow(file_id) => rows.retain(|r| r.file_id != *file_id),
                IndexChange::UpsertMembership(row) => {
                    memberships
                        .retain(|m| !(m.asset_id == row.asset_id && m.album_id == row.album_id));
                    memberships.push(row.clone());
                }
                IndexChange::RemoveMembership { asset_id, album_id } => {
                    memberships.retain(|m| !(m.asset_id == *asset_id && m.album_id == *album_id));
                }
            }
        }
        Ok(())
    }
}
