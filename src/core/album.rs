//! 相册成员关系绑定
//!
//! 先读完一批记录的全部成员关系再统一提交，任何一步失败都不落盘。
//! `plan_*` 只生成变更，调用方可以把它们和资产行的写入放进同一次提交。

use crate::core::record::{CloudRecord, ATTR_FILE_ID};
use crate::db::{AlbumMembershipRow, DirtyState, IndexChange, LocalIndex};
use crate::error::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// 一条记录的成员关系快照
struct MembershipView {
    asset_id: i64,
    cloud_albums: BTreeSet<i64>,
    local: Vec<(i64, DirtyState)>,
}

impl MembershipView {
    fn has_local(&self, album_id: i64) -> bool {
        self.local.iter().any(|(id, _)| *id == album_id)
    }
}

pub struct AlbumBinder {
    index: Arc<dyn LocalIndex>,
}

impl AlbumBinder {
    pub fn new(index: Arc<dyn LocalIndex>) -> Self {
        Self { index }
    }

    async fn load_view(&self, record: &CloudRecord) -> Result<MembershipView> {
        let asset_id = record.attr_int(ATTR_FILE_ID)?;
        let cloud_albums = record.album_ids()?.into_iter().collect();

        let rows = self.index.find_membership(asset_id).await?;
        let local = rows
            .iter()
            .map(|row| row.dirty_state().map(|state| (row.album_id, state)))
            .collect::<Result<Vec<_>>>()?;

        Ok(MembershipView {
            asset_id,
            cloud_albums,
            local,
        })
    }

    async fn load_views(&self, records: &[CloudRecord]) -> Result<Vec<(DirtyState, MembershipView)>> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            views.push((record.dirty, self.load_view(record).await?));
        }
        Ok(views)
    }

    /// 以云端列表为准重建成员关系，保留本地新增未上传的
    pub async fn bind_albums(&self, records: &[CloudRecord]) -> Result<()> {
        let changes = self.plan_albums(records).await?;
        self.index.commit(&changes).await
    }

    /// 按记录的脏状态增删成员关系
    pub async fn bind_album_changes(&self, records: &[CloudRecord]) -> Result<()> {
        let changes = self.plan_album_changes(records).await?;
        self.index.commit(&changes).await
    }

    pub async fn plan_albums(&self, records: &[CloudRecord]) -> Result<Vec<IndexChange>> {
        let views = self.load_views(records).await?;

        let mut changes = Vec::new();
        for (_, view) in &views {
            for &album_id in &view.cloud_albums {
                if !view.has_local(album_id) {
                    changes.push(IndexChange::UpsertMembership(AlbumMembershipRow::new(
                        view.asset_id,
                        album_id,
                        DirtyState::Unchanged,
                    )));
                }
            }
            for &(album_id, state) in &view.local {
                let stale = matches!(state, DirtyState::Unchanged | DirtyState::Deleted);
                if stale && !view.cloud_albums.contains(&album_id) {
                    changes.push(IndexChange::RemoveMembership {
                        asset_id: view.asset_id,
                        album_id,
                    });
                }
            }
        }

        debug!("相册绑定: {} 条记录, {} 条变更", records.len(), changes.len());
        Ok(changes)
    }

    pub async fn plan_album_changes(&self, records: &[CloudRecord]) -> Result<Vec<IndexChange>> {
        let views = self.load_views(records).await?;

        let mut changes = Vec::new();
        for (dirty, view) in &views {
            match dirty {
                DirtyState::New => {
                    for &album_id in &view.cloud_albums {
                        if !view.has_local(album_id) {
                            changes.push(IndexChange::UpsertMembership(AlbumMembershipRow::new(
                                view.asset_id,
                                album_id,
                                DirtyState::Unchanged,
                            )));
                        }
                    }
                }
                DirtyState::Deleted => {
                    // 列表为空时删除全部
                    for &(album_id, _) in &view.local {
                        if view.cloud_albums.is_empty() || view.cloud_albums.contains(&album_id) {
                            changes.push(IndexChange::RemoveMembership {
                                asset_id: view.asset_id,
                                album_id,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        debug!("相册变更: {} 条记录, {} 条变更", records.len(), changes.len());
        Ok(changes)
    }
}
