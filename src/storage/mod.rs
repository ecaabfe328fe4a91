pub mod local;
pub mod memory;
pub mod s3;

use crate::core::file::VersionAction;
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

pub use memory::MemoryStore;
pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 上传时记录源文件修改时间（毫秒）的元数据键
pub const SRC_MODIFIED_MILLIS: &str = "src_modified_millis";

/// 远程存储中某个文件的一个版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersionInfo {
    /// 版本 ID
    pub id: String,
    /// 完整对象名（包含文件夹前缀）
    pub name: String,
    pub action: VersionAction,
    /// 存储端记录的上传时间（毫秒）
    pub upload_timestamp: i64,
    pub size: u64,
    /// 上传时附带的自定义元数据
    pub file_info: HashMap<String, String>,
}

impl RemoteVersionInfo {
    /// 版本对应的修改时间：优先使用上传时记录的源文件时间，否则用上传时间
    pub fn mod_time_millis(&self) -> i64 {
        self.file_info
            .get(SRC_MODIFIED_MILLIS)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(self.upload_timestamp)
    }
}

/// 版本列表流
pub type VersionStream = Pin<Box<dyn Stream<Item = Result<RemoteVersionInfo>> + Send>>;

/// 带版本历史的远程存储接口
///
/// `list_versions` 必须按对象名（字节序）排序返回，同名对象的版本从新到旧。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 列出前缀下所有对象的所有版本
    async fn list_versions(&self, prefix: &str) -> Result<VersionStream>;

    /// 上传新版本，`mod_time` 作为源文件修改时间一并保存
    async fn upload(&self, name: &str, data: Vec<u8>, mod_time: i64) -> Result<RemoteVersionInfo>;

    /// 读取指定版本的内容
    async fn download(&self, name: &str, version_id: &str) -> Result<Vec<u8>>;

    /// 隐藏文件（追加一个隐藏标记，不删除历史数据）
    async fn hide(&self, name: &str) -> Result<()>;

    /// 删除指定版本
    async fn delete_version(&self, name: &str, version_id: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
