//! 测试用的内存沙箱，可注入重命名失败

use super::AssetStorage;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeStorage {
    pub paths: Mutex<BTreeSet<String>>,
    pub fail_rename: AtomicBool,
    /// 重命名后目标文件不见了
    pub lose_on_rename: AtomicBool,
    /// 只对这些源路径拒绝重命名
    pub refused: Mutex<BTreeSet<String>>,
}

impl FakeStorage {
    pub fn with_paths(paths: &[&str]) -> Self {
        Self {
            paths: Mutex::new(paths.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn refuse_rename_of(&self, path: &str) {
        self.refused.lock().unwrap().insert(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl AssetStorage for FakeStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.contains(path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        if self.fail_rename.load(Ordering::SeqCst) || self.refused.lock().unwrap().contains(from) {
            bail!("rename {} -> {}: permission denied", from, to);
        }
        let mut paths = self.paths.lock().unwrap();
        if !paths.remove(from) {
            bail!("rename {}: no such file", from);
        }
        if !self.lose_on_rename.load(Ordering::SeqCst) {
            paths.insert(to.to_string());
        }
        Ok(())
    }
}
