//! 路径冲突检测与处理
//!
//! 云端记录声称的本地路径上已经有一行本地资产时：元数据一致就把该行绑定到云端记录，
//! 不一致就把本地文件（连同缩略图目录）挪到 `_1`、`_2` ... 的新名字，让它作为新资产重新上传。

use crate::core::album::AlbumBinder;
use crate::core::record::{
    CloudRecord, ATTR_FILE_ID, ATTR_LOCAL_PATH, ATTR_META_MODIFIED, ATTR_RELATIVE_PATH, FILE_SIZE,
};
use crate::db::{DirtyState, IndexChange, LocalAssetRow, LocalIndex};
use crate::error::{FieldError, MergeError, Result};
use crate::storage::AssetStorage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const THUMB_DIR: &str = ".thumbs";

/// 冲突检测所需的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFields {
    pub full_path: String,
    pub relative_path: String,
    pub meta_modified: i64,
    pub size: i64,
}

/// 冲突处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Resolution {
    /// 本地没有同路径的资产
    NoConflict,
    /// 本地行与云端一致，已绑定；`pending_upload` 表示本地修改仍待上传
    Merged { file_id: i64, pending_upload: bool },
    /// 本地文件已挪开
    MovedAside {
        file_id: i64,
        from: String,
        to: String,
    },
}

impl Resolution {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Resolution::MovedAside { .. })
    }
}

/// 全部检查通过才成立，否则返回第一个失败的
fn all_of(checks: &[Option<&FieldError>]) -> std::result::Result<(), FieldError> {
    match checks.iter().flatten().next() {
        Some(err) => Err((*err).clone()),
        None => Ok(()),
    }
}

/// 读取冲突检测字段，四个字段必须全部存在且类型正确
pub fn extract_conflict_fields(record: &CloudRecord) -> Result<ConflictFields> {
    let full_path = record.attr_string(ATTR_LOCAL_PATH);
    let relative_path = record.attr_string(ATTR_RELATIVE_PATH);
    let meta_modified = record.attr_int(ATTR_META_MODIFIED);
    let size = record.get_int(FILE_SIZE);

    all_of(&[
        full_path.as_ref().err(),
        relative_path.as_ref().err(),
        meta_modified.as_ref().err(),
        size.as_ref().err(),
    ])?;

    Ok(ConflictFields {
        full_path: full_path?.to_string(),
        relative_path: relative_path?.to_string(),
        meta_modified: meta_modified?,
        size: size?,
    })
}

/// 在扩展名前插入 `_n`：`a/test.png` -> `a/test_1.png`
pub fn conflict_path(path: &str, n: u32) -> String {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            format!("{}_{}{}", &path[..split], n, &path[split..])
        }
        _ => format!("{}_{}", path, n),
    }
}

/// 资产的缩略图目录：`<root>/Photo/1/a.jpg` -> `<root>/.thumbs/Photo/1/a.jpg`
///
/// 不在沙箱根目录下的路径没有缩略图。
pub fn thumb_path(sandbox_root: &str, path: &str) -> Option<String> {
    let root = sandbox_root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if !rest.starts_with('/') || rest.len() < 2 {
        return None;
    }
    Some(format!("{}/{}{}", root, THUMB_DIR, rest))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// 合并后的脏状态，本地尚未上传的修改保留
fn merged_dirty(local: Option<DirtyState>) -> DirtyState {
    match local {
        Some(state @ (DirtyState::Mdirty | DirtyState::Fdirty | DirtyState::Retry)) => state,
        _ => DirtyState::Unchanged,
    }
}

/// 冲突处理器
pub struct ConflictReconciler {
    index: Arc<dyn LocalIndex>,
    storage: Arc<dyn AssetStorage>,
    albums: AlbumBinder,
    sandbox_root: String,
    max_suffix: u32,
}

impl ConflictReconciler {
    pub fn new(
        index: Arc<dyn LocalIndex>,
        storage: Arc<dyn AssetStorage>,
        sandbox_root: impl Into<String>,
        max_suffix: u32,
    ) -> Self {
        Self {
            albums: AlbumBinder::new(index.clone()),
            index,
            storage,
            sandbox_root: sandbox_root.into(),
            max_suffix,
        }
    }

    /// 查找同路径的本地行，多于一行说明索引已不一致
    pub async fn find_conflict_candidates(&self, full_path: &str) -> Result<Option<LocalAssetRow>> {
        let mut rows = self.index.find_by_path(full_path).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(MergeError::store(format!(
                "{} local rows share path {}",
                n, full_path
            ))),
        }
    }

    pub async fn compare_and_resolve(
        &self,
        candidate: &LocalAssetRow,
        fields: &ConflictFields,
        record: &CloudRecord,
    ) -> Result<Resolution> {
        let local_path = candidate.path()?.to_string();
        let local_size = candidate.size_value()?;
        let local_modified = candidate.modified_value()?;

        if local_size == fields.size && local_modified == fields.meta_modified {
            self.merge(candidate, record).await
        } else {
            info!(
                "路径冲突: {} (本地 size={} mtime={}, 云端 size={} mtime={})",
                local_path, local_size, local_modified, fields.size, fields.meta_modified
            );
            self.move_aside(candidate, &local_path).await
        }
    }

    /// 行的绑定和相册成员关系在同一次提交里写入
    async fn merge(&self, candidate: &LocalAssetRow, record: &CloudRecord) -> Result<Resolution> {
        let dirty = merged_dirty(candidate.dirty_state());

        let mut row = candidate.clone();
        row.cloud_id = Some(record.record_id.clone());
        row.dirty = Some(dirty.code());

        let bound = record.clone().with_attribute(ATTR_FILE_ID, row.file_id);
        let mut changes = vec![IndexChange::UpsertRow(row.clone())];
        changes.extend(self.albums.plan_albums(std::slice::from_ref(&bound)).await?);
        self.index.commit(&changes).await?;

        debug!(
            "本地资产 {} 绑定云端记录 {} ({:?})",
            row.file_id, record.record_id, dirty
        );
        Ok(Resolution::Merged {
            file_id: row.file_id,
            pending_upload: dirty != DirtyState::Unchanged,
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.storage
            .exists(path)
            .await
            .map_err(|e| MergeError::invalid(format!("cannot stat {}: {:#}", path, e)))
    }

    /// 找一个磁盘和索引里都没有占用的新路径
    async fn free_conflict_path(&self, path: &str) -> Result<String> {
        for n in 1..=self.max_suffix {
            let candidate = conflict_path(path, n);
            if self.exists(&candidate).await? {
                continue;
            }
            if self.index.find_by_path(&candidate).await?.is_empty() {
                return Ok(candidate);
            }
        }
        Err(MergeError::invalid(format!(
            "no free name for {} within {} attempts",
            path, self.max_suffix
        )))
    }

    /// 按相反顺序撤销已完成的重命名
    async fn undo_moves(&self, moves: &[(String, String)]) {
        for (from, to) in moves.iter().rev() {
            if let Err(e) = self.storage.rename(to, from).await {
                error!("撤销重命名失败 {} -> {}: {:#}", to, from, e);
            }
        }
    }

    /// 重命名文件和缩略图，任何一步失败都撤销已完成的部分
    async fn rename_on_disk(&self, local_path: &str, target: &str) -> Result<Vec<(String, String)>> {
        let mut moves = Vec::new();

        if self.exists(local_path).await? {
            self.storage
                .rename(local_path, target)
                .await
                .map_err(|e| MergeError::invalid(format!("move aside failed: {:#}", e)))?;
            moves.push((local_path.to_string(), target.to_string()));

            if !self.storage.exists(target).await.unwrap_or(false) {
                // 目标不存在，无从撤销
                return Err(MergeError::invalid(format!(
                    "{} not found after move aside",
                    target
                )));
            }
        } else {
            warn!("本地文件不存在，仅更新索引: {}", local_path);
        }

        let thumbs = thumb_path(&self.sandbox_root, local_path)
            .zip(thumb_path(&self.sandbox_root, target));
        if let Some((thumb_from, thumb_to)) = thumbs {
            let present = match self.exists(&thumb_from).await {
                Ok(present) => present,
                Err(e) => {
                    self.undo_moves(&moves).await;
                    return Err(e);
                }
            };
            if present {
                if let Err(e) = self.storage.rename(&thumb_from, &thumb_to).await {
                    self.undo_moves(&moves).await;
                    return Err(MergeError::invalid(format!(
                        "thumbnail move aside failed: {:#}",
                        e
                    )));
                }
                moves.push((thumb_from, thumb_to));
            }
        }

        Ok(moves)
    }

    async fn move_aside(&self, candidate: &LocalAssetRow, local_path: &str) -> Result<Resolution> {
        let target = self.free_conflict_path(local_path).await?;
        let moves = self.rename_on_disk(local_path, &target).await?;

        let mut row = candidate.clone();
        row.data = Some(target.clone());
        row.display_name = Some(file_name(&target).to_string());
        row.dirty = Some(DirtyState::New.code());

        // 索引写入失败时把文件放回原处，保持磁盘和索引一致
        let failure = match self.index.update_row(&row).await {
            Ok(0) => Some(format!("row {} vanished while moving aside", row.file_id)),
            Ok(_) => None,
            Err(e) => Some(format!("cannot record move aside of row {}: {}", row.file_id, e)),
        };
        if let Some(reason) = failure {
            self.undo_moves(&moves).await;
            return Err(MergeError::invalid(reason));
        }

        info!("本地文件已挪开: {} -> {}", local_path, target);
        Ok(Resolution::MovedAside {
            file_id: row.file_id,
            from: local_path.to_string(),
            to: target,
        })
    }

    /// 字段读取、候选查找、比较处理，任何一步失败立即返回
    pub async fn reconcile_detailed(&self, record: &CloudRecord) -> Result<Resolution> {
        let fields = extract_conflict_fields(record)?;
        match self.find_conflict_candidates(&fields.full_path).await? {
            None => Ok(Resolution::NoConflict),
            Some(candidate) => {
                self.compare_and_resolve(&candidate, &fields, record)
                    .await
            }
        }
    }

    /// 返回是否发生了冲突
    pub async fn reconcile(&self, record: &CloudRecord) -> Result<bool> {
        Ok(self.reconcile_detailed(record).await?.is_conflict())
    }
}
