//! 内存中的版本化存储
//!
//! 行为与版本桶一致：每次上传追加新版本，隐藏追加隐藏标记。
//! 仅用于测试。

use super::{RemoteStore, RemoteVersionInfo, VersionStream, SRC_MODIFIED_MILLIS};
use crate::core::file::VersionAction;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredVersion {
    info: RemoteVersionInfo,
    data: Vec<u8>,
}

pub struct MemoryStore {
    name: String,
    /// 对象名 -> 版本列表（从新到旧）
    objects: RwLock<BTreeMap<String, Vec<StoredVersion>>>,
    next_id: AtomicU64,
    /// 下一次写入使用的上传时间（毫秒），每次写入递增
    clock: AtomicI64,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self::with_clock(name, chrono::Utc::now().timestamp_millis())
    }

    /// 指定起始上传时间，便于测试得到确定的时间戳
    pub fn with_clock(name: &str, start_millis: i64) -> Self {
        Self {
            name: format!("memory://{}", name),
            objects: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            clock: AtomicI64::new(start_millis),
        }
    }

    fn next_version_id(&self) -> String {
        format!("v{:06}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// 直接写入一个版本（用于构造历史），返回版本 ID
    pub async fn insert_version(
        &self,
        name: &str,
        action: VersionAction,
        mod_time: i64,
        data: Vec<u8>,
    ) -> String {
        let id = self.next_version_id();
        let info = RemoteVersionInfo {
            id: id.clone(),
            name: name.to_string(),
            action,
            upload_timestamp: mod_time,
            size: data.len() as u64,
            file_info: HashMap::from([(SRC_MODIFIED_MILLIS.to_string(), mod_time.to_string())]),
        };
        self.objects
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(0, StoredVersion { info, data });
        id
    }

    /// 某个对象的全部版本（从新到旧）
    pub async fn versions(&self, name: &str) -> Vec<RemoteVersionInfo> {
        self.objects
            .read()
            .await
            .get(name)
            .map(|versions| versions.iter().map(|v| v.info.clone()).collect())
            .unwrap_or_default()
    }

    /// 当前版本为上传（未被隐藏）的对象名
    pub async fn visible_names(&self) -> Vec<String> {
        self.objects
            .read()
            .await
            .iter()
            .filter(|(_, versions)| {
                versions
                    .first()
                    .is_some_and(|v| v.info.action == VersionAction::Upload)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_versions(&self, prefix: &str) -> Result<VersionStream> {
        let snapshot: Vec<RemoteVersionInfo> = self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(_, versions)| versions.iter().map(|v| v.info.clone()))
            .collect();

        Ok(futures::stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }

    async fn upload(&self, name: &str, data: Vec<u8>, mod_time: i64) -> Result<RemoteVersionInfo> {
        let info = RemoteVersionInfo {
            id: self.next_version_id(),
            name: name.to_string(),
            action: VersionAction::Upload,
            upload_timestamp: self.tick(),
            size: data.len() as u64,
            file_info: HashMap::from([(SRC_MODIFIED_MILLIS.to_string(), mod_time.to_string())]),
        };
        self.objects
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(0, StoredVersion { info: info.clone(), data });
        Ok(info)
    }

    async fn download(&self, name: &str, version_id: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(name)
            .and_then(|versions| versions.iter().find(|v| v.info.id == version_id))
            .filter(|v| v.info.action == VersionAction::Upload)
            .map(|v| v.data.clone())
            .ok_or_else(|| SyncError::Transfer(format!("版本不存在: {} ({})", name, version_id)))
    }

    async fn hide(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let versions = objects
            .get_mut(name)
            .ok_or_else(|| SyncError::Transfer(format!("文件不存在: {}", name)))?;
        let info = RemoteVersionInfo {
            id: self.next_version_id(),
            name: name.to_string(),
            action: VersionAction::Hide,
            upload_timestamp: self.tick(),
            size: 0,
            file_info: HashMap::new(),
        };
        versions.insert(0, StoredVersion { info, data: Vec::new() });
        Ok(())
    }

    async fn delete_version(&self, name: &str, version_id: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let versions = objects
            .get_mut(name)
            .ok_or_else(|| SyncError::Transfer(format!("文件不存在: {}", name)))?;
        let before = versions.len();
        versions.retain(|v| v.info.id != version_id);
        if versions.len() == before {
            return Err(SyncError::Transfer(format!(
                "版本不存在: {} ({})",
                name, version_id
            )));
        }
        if versions.is_empty() {
            objects.remove(name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
