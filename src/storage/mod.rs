pub mod local;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;

pub use local::LocalStorage;

/// 沙箱文件系统接口
///
/// 合并引擎只在冲突时把本地文件挪开，不读写文件内容。
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// 沙箱路径上是否存在文件或目录
    async fn exists(&self, path: &str) -> Result<bool>;

    /// 重命名文件或目录，目标目录不存在时创建
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}
