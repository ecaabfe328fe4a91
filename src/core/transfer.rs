//! 动作执行：把同步动作落到远程存储和本地文件系统

use crate::core::action::{ActionDispatcher, SyncAction};
use crate::core::folder::RemoteFolder;
use crate::error::{Result, SyncError};
use crate::storage::{local, RemoteStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// 执行同步动作
///
/// 动作里的远程名称相对于远程文件夹，执行时加上文件夹前缀。
pub struct ActionRunner {
    store: Arc<dyn RemoteStore>,
    prefix: String,
}

impl ActionRunner {
    pub fn new(store: Arc<dyn RemoteStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn for_folder(folder: &RemoteFolder) -> Self {
        Self::new(folder.store().clone(), folder.prefix())
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

#[async_trait]
impl ActionDispatcher for ActionRunner {
    async fn perform(&self, action: &SyncAction) -> Result<()> {
        match action {
            SyncAction::Upload {
                local_path,
                name,
                mod_time,
                ..
            } => {
                let data = local::read_file(local_path).await?;
                let size = data.len();
                let info = self
                    .store
                    .upload(&self.full_name(name), data, *mod_time)
                    .await?;
                info!("上传完成: {} ({} 字节, 版本 {})", name, size, info.id);
            }
            SyncAction::Download {
                name,
                version_id,
                local_path,
                mod_time,
                ..
            } => {
                let data = self
                    .store
                    .download(&self.full_name(name), version_id)
                    .await?;
                let size = data.len();
                local::write_file(local_path, data, *mod_time).await?;
                info!("下载完成: {} ({} 字节)", name, size);
            }
            SyncAction::Hide { name } => {
                self.store.hide(&self.full_name(name)).await?;
                debug!("已隐藏: {}", name);
            }
            SyncAction::Delete { name, version_id } => {
                self.store
                    .delete_version(&self.full_name(name), version_id)
                    .await?;
                debug!("已删除版本: {} ({})", name, version_id);
            }
            SyncAction::LocalDelete { local_path } => {
                local::delete_file(local_path).await.map_err(|e| {
                    SyncError::Transfer(format!("删除本地文件失败 {}: {}", local_path.display(), e))
                })?;
                debug!("已删除本地文件: {}", local_path.display());
            }
        }
        Ok(())
    }
}
