use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{CacheId, Store};
use crate::errors::Result;
use crate::util;

/// 基于目录的存储，每个条目一个JSON文件
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// 目录不存在时自动创建
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path_of(&self, id: &CacheId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

impl Store for FsStore {
    fn read(&self, id: &CacheId) -> Result<Option<String>> {
        let path = self.path_of(id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write(&self, id: &CacheId, contents: &str) -> Result<()> {
        util::write_atomic(&self.path_of(id), contents)
    }

    fn modified_at(&self, id: &CacheId) -> Result<Option<DateTime<Utc>>> {
        let path = self.path_of(id);
        if !path.exists() {
            return Ok(None);
        }
        let modified = fs::metadata(path)?.modified()?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    fn list(&self, prefix: &str) -> Result<Vec<CacheId>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<CacheId> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.starts_with(prefix) && name.ends_with(".json"))
            .map(CacheId::new)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
