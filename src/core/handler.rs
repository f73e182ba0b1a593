//! 拉取合并入口
//!
//! 按顺序处理一批云端记录：删除、更新已有资产，或者为新资产做冲突检测并分配身份。

use crate::config::MergeConfig;
use crate::core::album::AlbumBinder;
use crate::core::classifier::classify_media_kind;
use crate::core::conflict::{ConflictReconciler, Resolution};
use crate::core::identity::{AssetIdentityAllocator, Clock, IdAllocator};
use crate::core::record::{
    CloudRecord, ATTR_EDITED_TIME, ATTR_FILE_ID, ATTR_LOCAL_PATH, ATTR_META_MODIFIED,
    FILE_ALBUM_IDS, FILE_NAME, FILE_SIZE,
};
use crate::db::{DirtyState, IndexChange, LocalAssetRow, LocalIndex};
use crate::error::{MergeError, Result};
use crate::storage::AssetStorage;
use serde::Serialize;
use std::slice;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 单条记录的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum PullOutcome {
    Inserted { file_id: i64, conflict: bool },
    /// `pending_upload` 表示本地修改仍待上传
    Merged { file_id: i64, pending_upload: bool },
    Updated { file_id: i64 },
    /// 本地没有对应资产时 `file_id` 为空
    Deleted { file_id: Option<i64> },
}

/// 一批记录的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub merged: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl PullReport {
    fn record(&mut self, outcome: &PullOutcome) {
        match outcome {
            PullOutcome::Inserted { conflict, .. } => {
                self.inserted += 1;
                if *conflict {
                    self.conflicts += 1;
                }
            }
            PullOutcome::Merged { .. } => self.merged += 1,
            PullOutcome::Updated { .. } => self.updated += 1,
            PullOutcome::Deleted { .. } => self.deleted += 1,
        }
    }
}

pub struct FileDataHandler {
    index: Arc<dyn LocalIndex>,
    identity: AssetIdentityAllocator,
    reconciler: ConflictReconciler,
    albums: AlbumBinder,
    /// 冲突检测到写入之间不允许穿插其他记录
    lock: Mutex<()>,
}

impl FileDataHandler {
    pub fn new(
        index: Arc<dyn LocalIndex>,
        ids: Arc<dyn IdAllocator>,
        storage: Arc<dyn AssetStorage>,
        config: &MergeConfig,
    ) -> Self {
        Self {
            identity: AssetIdentityAllocator::new(ids, config.sandbox_root.clone()),
            reconciler: ConflictReconciler::new(
                index.clone(),
                storage,
                config.sandbox_root.clone(),
                config.max_conflict_suffix,
            ),
            albums: AlbumBinder::new(index.clone()),
            index,
            lock: Mutex::new(()),
        }
    }

    pub fn with_clock(self, clock: Clock) -> Self {
        Self {
            identity: self.identity.with_clock(clock),
            ..self
        }
    }

    /// 处理一批拉取到的记录
    ///
    /// 参数错误的记录被跳过并计入 `failed`；索引异常会中止整批。
    pub async fn on_fetch_records(&self, records: &mut [CloudRecord]) -> Result<PullReport> {
        let mut report = PullReport::default();

        for record in records.iter_mut() {
            let _guard = self.lock.lock().await;
            match self.pull_one(record).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) if e.is_store_fault() => {
                    error!("记录 {} 处理失败，中止本批: {}", record.record_id, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("跳过记录 {}: {}", record.record_id, e);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", record.record_id, e));
                }
            }
        }

        info!(
            "拉取完成: 新增 {}, 更新 {}, 删除 {}, 合并 {}, 冲突 {}, 失败 {}",
            report.inserted,
            report.updated,
            report.deleted,
            report.merged,
            report.conflicts,
            report.failed
        );
        Ok(report)
    }

    async fn pull_one(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        if record.dirty == DirtyState::Deleted {
            return self.delete_locked(record).await;
        }
        match self.index.find_by_cloud_id(&record.record_id).await? {
            Some(row) => self.update_locked(record, row).await,
            None => self.insert_locked(record).await,
        }
    }

    /// 新资产入库
    pub async fn pull_insert(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        let _guard = self.lock.lock().await;
        self.insert_locked(record).await
    }

    /// 更新已有资产
    pub async fn pull_update(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        let _guard = self.lock.lock().await;
        let row = self
            .index
            .find_by_cloud_id(&record.record_id)
            .await?
            .ok_or_else(|| {
                MergeError::invalid(format!("no local asset for cloud record {}", record.record_id))
            })?;
        self.update_locked(record, row).await
    }

    /// 删除云端已删除的资产
    pub async fn pull_delete(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        let _guard = self.lock.lock().await;
        self.delete_locked(record).await
    }

    async fn insert_locked(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        let kind = classify_media_kind(record)?;

        let mut conflict = false;
        if record.has_attribute(ATTR_LOCAL_PATH) {
            match self.reconciler.reconcile_detailed(record).await? {
                Resolution::NoConflict => {}
                Resolution::Merged {
                    file_id,
                    pending_upload,
                } => {
                    record.set_attribute(ATTR_FILE_ID, file_id);
                    debug!("记录 {} 与本地资产 {} 合并", record.record_id, file_id);
                    return Ok(PullOutcome::Merged {
                        file_id,
                        pending_upload,
                    });
                }
                Resolution::MovedAside { .. } => conflict = true,
            }
        }

        let size = record.get_int(FILE_SIZE)?;
        let identity = self.identity.allocate(record, kind).await?;
        if self.index.find_by_id(identity.id).await?.is_some() {
            return Err(MergeError::store(format!(
                "allocated id {} is already in use",
                identity.id
            )));
        }

        let path = record
            .attr_string(ATTR_LOCAL_PATH)
            .map(str::to_string)
            .unwrap_or_else(|_| identity.path.clone());
        let display_name = record
            .get_string(FILE_NAME)
            .map(str::to_string)
            .unwrap_or_else(|_| identity.name.clone());
        let modified = record
            .attr_int(ATTR_META_MODIFIED)
            .or_else(|_| record.attr_int(ATTR_EDITED_TIME))
            .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis());

        let row = LocalAssetRow {
            file_id: identity.id,
            data: Some(path),
            display_name: Some(display_name),
            size: Some(size),
            date_modified: Some(modified),
            media_type: Some(kind.code()),
            dirty: Some(DirtyState::Unchanged.code()),
            cloud_id: Some(record.record_id.clone()),
        };
        // 行和成员关系一起提交
        let bound = record.clone().with_attribute(ATTR_FILE_ID, identity.id);
        let mut changes = vec![IndexChange::UpsertRow(row.clone())];
        changes.extend(self.albums.plan_album_changes(slice::from_ref(&bound)).await?);
        self.index.commit(&changes).await?;
        *record = bound;

        debug!("新增资产 {} -> {:?}", identity.id, row.data);
        Ok(PullOutcome::Inserted {
            file_id: identity.id,
            conflict,
        })
    }

    async fn update_locked(
        &self,
        record: &mut CloudRecord,
        row: LocalAssetRow,
    ) -> Result<PullOutcome> {
        let mut updated = row.clone();
        if let Ok(size) = record.get_int(FILE_SIZE) {
            updated.size = Some(size);
        }
        if let Ok(modified) = record.attr_int(ATTR_META_MODIFIED) {
            updated.date_modified = Some(modified);
        }
        if let Ok(name) = record.get_string(FILE_NAME) {
            updated.display_name = Some(name.to_string());
        }
        updated.dirty = Some(DirtyState::Unchanged.code());

        let bound = record.clone().with_attribute(ATTR_FILE_ID, row.file_id);
        let mut changes = Vec::new();
        if updated != row {
            changes.push(IndexChange::UpsertRow(updated));
        }
        changes.extend(self.albums.plan_albums(slice::from_ref(&bound)).await?);
        self.index.commit(&changes).await?;
        *record = bound;

        debug!("更新资产 {} ({})", row.file_id, record.record_id);
        Ok(PullOutcome::Updated {
            file_id: row.file_id,
        })
    }

    async fn delete_locked(&self, record: &mut CloudRecord) -> Result<PullOutcome> {
        let Some(row) = self.index.find_by_cloud_id(&record.record_id).await? else {
            debug!("云端删除的记录 {} 在本地不存在", record.record_id);
            return Ok(PullOutcome::Deleted { file_id: None });
        };

        // 去掉相册列表，删除该资产的全部成员关系，再和行一起提交
        let mut tombstone = record
            .clone()
            .with_attribute(ATTR_FILE_ID, row.file_id)
            .with_dirty(DirtyState::Deleted);
        tombstone.fields.remove(FILE_ALBUM_IDS);
        let mut changes = self
            .albums
            .plan_album_changes(slice::from_ref(&tombstone))
            .await?;
        changes.push(IndexChange::DeleteRow(row.file_id));
        self.index.commit(&changes).await?;

        record.set_attribute(ATTR_FILE_ID, row.file_id);

        info!("删除资产 {} ({})", row.file_id, record.record_id);
        Ok(PullOutcome::Deleted {
            file_id: Some(row.file_id),
        })
    }
}
