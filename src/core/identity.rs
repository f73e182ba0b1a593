//! 资产身份分配 - 唯一 id、分桶、沙箱路径和文件名

use crate::core::classifier::extract_file_extension;
use crate::core::record::CloudRecord;
use crate::db::MediaKind;
use crate::error::{MergeError, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 起始分桶数
pub const ASSET_DIR_START_NUM: i64 = 16;
/// 每个分桶容纳的资产数上限
pub const ASSET_IN_BUCKET_NUM_MAX: i64 = 1000;
/// 文件名补位上限，超过后直接使用原数字
pub const ASSET_MAX_COMPLEMENT_ID: i64 = 999;
pub const PHOTO_DIR: &str = "Photo";

const IMAGE_PREFIX: &str = "IMG";
const VIDEO_PREFIX: &str = "VID";

/// 唯一 id 来源
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn next_id(&self, kind: MediaKind) -> Result<i64>;
}

/// 基于 unique_number 表的分配器
pub struct SqliteIdAllocator {
    db: Arc<SqlitePool>,
}

impl SqliteIdAllocator {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdAllocator for SqliteIdAllocator {
    /// 单条语句自增并取回，多个连接同时分配也不会拿到同一个 id
    async fn next_id(&self, kind: MediaKind) -> Result<i64> {
        let next: Option<i64> = sqlx::query_scalar(
            r#"UPDATE unique_number SET unique_number = unique_number + 1
               WHERE name = 'asset'
               RETURNING unique_number"#,
        )
        .fetch_optional(&*self.db)
        .await?;
        let next = next.ok_or_else(|| MergeError::store("asset id counter is missing"))?;

        debug!("分配资产 id {} ({})", next, kind);
        Ok(next)
    }
}

/// 内存顺序分配器，结果完全可预测
pub struct SequenceAllocator {
    next: AtomicI64,
}

impl SequenceAllocator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl IdAllocator for SequenceAllocator {
    async fn next_id(&self, _kind: MediaKind) -> Result<i64> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// 时间来源（毫秒）
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// 新资产的完整身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIdentity {
    pub id: i64,
    pub bucket: i64,
    pub path: String,
    pub name: String,
}

/// 计算 id 对应的分桶号
///
/// 分桶数从 16 开始，资产数超过当前容量后翻倍。
pub fn compute_bucket(id: i64) -> Result<i64> {
    if id < 0 {
        return Err(MergeError::invalid(format!("negative asset id {}", id)));
    }

    let mut start = ASSET_DIR_START_NUM;
    let mut divider = ASSET_DIR_START_NUM;
    while start
        .checked_mul(ASSET_IN_BUCKET_NUM_MAX)
        .is_some_and(|capacity| id > capacity)
    {
        divider = start;
        start <<= 1;
    }

    let remainder = id % divider;
    if remainder == 0 {
        Ok(start)
    } else {
        Ok(start - divider + remainder)
    }
}

fn name_prefix(kind: MediaKind) -> Result<&'static str> {
    match kind {
        MediaKind::Image => Ok(IMAGE_PREFIX),
        MediaKind::Video => Ok(VIDEO_PREFIX),
        other => Err(MergeError::invalid(format!(
            "media kind {} has no naming scheme",
            other
        ))),
    }
}

/// 资产身份分配器
pub struct AssetIdentityAllocator {
    ids: Arc<dyn IdAllocator>,
    sandbox_root: String,
    clock: Clock,
}

impl AssetIdentityAllocator {
    pub fn new(ids: Arc<dyn IdAllocator>, sandbox_root: impl Into<String>) -> Self {
        Self {
            ids,
            sandbox_root: sandbox_root.into(),
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sandbox_root(&self) -> &str {
        &self.sandbox_root
    }

    /// 分配唯一 id
    pub async fn allocate_unique_id(&self, kind: MediaKind) -> Result<i64> {
        if !kind.is_allocatable() {
            return Err(MergeError::invalid(format!(
                "media kind {} cannot allocate an id",
                kind
            )));
        }
        let id = self.ids.next_id(kind).await?;
        if id < 0 {
            return Err(MergeError::invalid(format!("allocator returned negative id {}", id)));
        }
        Ok(id)
    }

    pub fn compute_bucket(&self, id: i64) -> Result<i64> {
        compute_bucket(id)
    }

    /// 生成文件名：`IMG_<时间戳>_<补位 id>.<扩展名>`
    pub fn build_display_name(&self, file_id: i64, kind: MediaKind, extension: &str) -> Result<String> {
        let prefix = name_prefix(kind)?;
        if file_id < 0 {
            return Err(MergeError::invalid(format!("negative file id {}", file_id)));
        }

        let complement = if file_id <= ASSET_MAX_COMPLEMENT_ID {
            format!("{:03}", file_id)
        } else {
            file_id.to_string()
        };

        let mut name = format!("{}_{}_{}", prefix, (self.clock)(), complement);
        if !extension.is_empty() {
            name.push('.');
            name.push_str(extension);
        }
        Ok(name)
    }

    fn path_for(&self, bucket: i64, name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.sandbox_root.trim_end_matches('/'),
            PHOTO_DIR,
            bucket,
            name
        )
    }

    /// 构造沙箱路径
    pub fn build_asset_path(&self, record: &CloudRecord, id: i64, kind: MediaKind) -> Result<String> {
        if id < 0 {
            return Err(MergeError::invalid(format!("negative asset id {}", id)));
        }
        if !kind.is_allocatable() {
            return Err(MergeError::invalid(format!(
                "media kind {} has no sandbox path",
                kind
            )));
        }

        let bucket = compute_bucket(id)?;
        let name = self.build_display_name(id, kind, &extract_file_extension(record))?;
        Ok(self.path_for(bucket, &name))
    }

    /// 一次性分配 id、分桶、路径和文件名
    pub async fn allocate(&self, record: &CloudRecord, kind: MediaKind) -> Result<AssetIdentity> {
        let id = self.allocate_unique_id(kind).await?;
        let bucket = compute_bucket(id)?;
        let name = self.build_display_name(id, kind, &extract_file_extension(record))?;
        let path = self.path_for(bucket, &name);

        debug!("新资产 {} -> {}", record.record_id, path);
        Ok(AssetIdentity {
            id,
            bucket,
            path,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::FILE_NAME;
    use crate::db::{open_memory_pool, open_pool};
    use crate::error::ErrorKind;

    fn allocator() -> AssetIdentityAllocator {
        AssetIdentityAllocator::new(Arc::new(SequenceAllocator::default()), "/storage/cloud/files")
            .with_clock(Arc::new(|| 1700000000000))
    }

    #[test]
    fn test_bucket_rejects_negative() {
        for id in [-1, -2, i64::MIN] {
            assert_eq!(compute_bucket(id).unwrap_err().kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_bucket_values() {
        assert_eq!(compute_bucket(0).unwrap(), 16);
        assert_eq!(compute_bucket(1).unwrap(), 1);
        assert_eq!(compute_bucket(15).unwrap(), 15);
        assert_eq!(compute_bucket(16).unwrap(), 16);
        assert_eq!(compute_bucket(17).unwrap(), 1);
        assert_eq!(compute_bucket(16000).unwrap(), 16);
        // 超过 16 * 1000 后分桶数翻倍
        assert_eq!(compute_bucket(16001).unwrap(), 17);
        assert_eq!(compute_bucket(16016).unwrap(), 32);
        assert!(compute_bucket(i64::MAX).is_ok());
    }

    #[test]
    fn test_bucket_is_deterministic() {
        for id in [0, 1, 999, 123_456] {
            assert_eq!(compute_bucket(id).unwrap(), compute_bucket(id).unwrap());
        }
    }

    #[test]
    fn test_asset_path() {
        let alloc = allocator();
        let record = CloudRecord::new("r").with_field(FILE_NAME, "photo.heic");

        let path = alloc.build_asset_path(&record, 1, MediaKind::Image).unwrap();
        assert_eq!(path, "/storage/cloud/files/Photo/1/IMG_1700000000000_001.heic");

        // 记录内容不影响成功与否
        let empty = CloudRecord::new("r");
        let path = alloc.build_asset_path(&empty, 0, MediaKind::Video).unwrap();
        assert_eq!(path, "/storage/cloud/files/Photo/16/VID_1700000000000_000");
    }

    #[test]
    fn test_asset_path_rejects_bad_input() {
        let alloc = allocator();
        let record = CloudRecord::new("r");

        let err = alloc.build_asset_path(&record, -1, MediaKind::Image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        for kind in [MediaKind::File, MediaKind::Audio] {
            let err = alloc.build_asset_path(&record, 0, kind).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_display_name_complement_bound() {
        let alloc = allocator();
        assert_eq!(
            alloc.build_display_name(998, MediaKind::Image, "jpg").unwrap(),
            "IMG_1700000000000_998.jpg"
        );
        assert_eq!(
            alloc.build_display_name(ASSET_MAX_COMPLEMENT_ID, MediaKind::Image, "jpg").unwrap(),
            "IMG_1700000000000_999.jpg"
        );
        assert_eq!(
            alloc.build_display_name(1000, MediaKind::Video, "mp4").unwrap(),
            "VID_1700000000000_1000.mp4"
        );
        assert_eq!(
            alloc.build_display_name(7, MediaKind::Image, "").unwrap(),
            "IMG_1700000000000_007"
        );
    }

    #[test]
    fn test_display_name_rejects_unsupported_kinds() {
        let alloc = allocator();
        for kind in [MediaKind::Audio, MediaKind::File] {
            let err = alloc.build_display_name(1, kind, "mp3").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_allocate_tuple() {
        let alloc = allocator();
        let record = CloudRecord::new("r").with_field(FILE_NAME, "a.png");

        let first = alloc.allocate(&record, MediaKind::Image).await.unwrap();
        assert_eq!(
            first,
            AssetIdentity {
                id: 1,
                bucket: 1,
                path: "/storage/cloud/files/Photo/1/IMG_1700000000000_001.png".into(),
                name: "IMG_1700000000000_001.png".into(),
            }
        );
        let second = alloc.allocate(&record, MediaKind::Image).await.unwrap();
        assert_eq!(second.id, 2);

        let err = alloc.allocate(&record, MediaKind::Audio).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_sqlite_allocator_counts_up() {
        let pool = Arc::new(open_memory_pool().await.unwrap());
        let ids = SqliteIdAllocator::new(pool);

        assert_eq!(ids.next_id(MediaKind::Image).await.unwrap(), 1);
        assert_eq!(ids.next_id(MediaKind::Video).await.unwrap(), 2);
        assert_eq!(ids.next_id(MediaKind::Image).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_allocator_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ids.db");
        let first = Arc::new(SqliteIdAllocator::new(Arc::new(
            open_pool(&db_path).await.unwrap(),
        )));
        let second = Arc::new(SqliteIdAllocator::new(Arc::new(
            open_pool(&db_path).await.unwrap(),
        )));

        let mut tasks = Vec::new();
        for ids in [first, second] {
            tasks.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..20 {
                    got.push(ids.next_id(MediaKind::Image).await.unwrap());
                }
                got
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=40).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_sqlite_allocator_missing_counter() {
        let pool = Arc::new(open_memory_pool().await.unwrap());
        sqlx::query("DELETE FROM unique_number")
            .execute(&*pool)
            .await
            .unwrap();
        let err = SqliteIdAllocator::new(pool)
            .next_id(MediaKind::Image)
            .await
            .unwrap_err();
        assert!(err.is_store_fault());
    }
}
