use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    File,
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// 数据库中存储的类型码
    pub fn code(self) -> i32 {
        match self {
            MediaKind::File => 0,
            MediaKind::Image => 1,
            MediaKind::Video => 2,
            MediaKind::Audio => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MediaKind::File),
            1 => Some(MediaKind::Image),
            2 => Some(MediaKind::Video),
            3 => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// 只有图片和视频可以分配沙箱路径与文件名
    pub fn is_allocatable(self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::File => write!(f, "file"),
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// 脏状态（本地行与云端记录共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyState {
    #[default]
    Unchanged,
    New,
    Mdirty,
    Fdirty,
    Deleted,
    Retry,
}

impl DirtyState {
    pub fn code(self) -> i32 {
        match self {
            DirtyState::Unchanged => 0,
            DirtyState::New => 1,
            DirtyState::Mdirty => 2,
            DirtyState::Fdirty => 3,
            DirtyState::Deleted => 4,
            DirtyState::Retry => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DirtyState::Unchanged),
            1 => Some(DirtyState::New),
            2 => Some(DirtyState::Mdirty),
            3 => Some(DirtyState::Fdirty),
            4 => Some(DirtyState::Deleted),
            5 => Some(DirtyState::Retry),
            _ => None,
        }
    }
}

/// 本地资产索引中的一行
///
/// 列允许为 NULL，读取时再校验。
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct LocalAssetRow {
    pub file_id: i64,
    /// 沙箱文件路径
    pub data: Option<String>,
    pub display_name: Option<String>,
    pub size: Option<i64>,
    /// 最后修改时间
    pub date_modified: Option<i64>,
    pub media_type: Option<i32>,
    pub dirty: Option<i32>,
    pub cloud_id: Option<String>,
}

impl LocalAssetRow {
    pub fn path(&self) -> Result<&str> {
        self.data
            .as_deref()
            .ok_or_else(|| MergeError::invalid(format!("row {} has no path", self.file_id)))
    }

    pub fn size_value(&self) -> Result<i64> {
        self.size
            .ok_or_else(|| MergeError::invalid(format!("row {} has no size", self.file_id)))
    }

    pub fn modified_value(&self) -> Result<i64> {
        self.date_modified.ok_or_else(|| {
            MergeError::invalid(format!("row {} has no modified time", self.file_id))
        })
    }

    pub fn dirty_state(&self) -> Option<DirtyState> {
        self.dirty.and_then(DirtyState::from_code)
    }
}

/// 相册成员关系行
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AlbumMembershipRow {
    pub asset_id: i64,
    pub album_id: i64,
    pub dirty: Option<i32>,
}

impl AlbumMembershipRow {
    pub fn new(asset_id: i64, album_id: i64, dirty: DirtyState) -> Self {
        Self {
            asset_id,
            album_id,
            dirty: Some(dirty.code()),
        }
    }

    /// 读取脏状态，无法识别的值视为索引损坏
    pub fn dirty_state(&self) -> Result<DirtyState> {
        self.dirty.and_then(DirtyState::from_code).ok_or_else(|| {
            MergeError::store(format!(
                "membership ({}, {}) has unreadable dirty state {:?}",
                self.asset_id, self.album_id, self.dirty
            ))
        })
    }
}

/// 一次提交中的单个写操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    UpsertRow(LocalAssetRow),
    DeleteRow(i64),
    UpsertMembership(AlbumMembershipRow),
    RemoveMembership { asset_id: i64, album_id: i64 },
}
