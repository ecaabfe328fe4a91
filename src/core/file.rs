//! 文件与文件版本模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 一天的毫秒数
pub const ONE_DAY_IN_MS: i64 = 24 * 60 * 60 * 1000;

/// 版本类型：上传产生的真实数据，或远程的隐藏标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionAction {
    Upload,
    Hide,
}

impl fmt::Display for VersionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionAction::Upload => write!(f, "upload"),
            VersionAction::Hide => write!(f, "hide"),
        }
    }
}

/// 文件的一个版本
///
/// `id` 对远程文件是版本 ID，对本地文件是完整路径。
/// 修改时间统一用毫秒，避免和远程毫秒时间比较时的舍入问题。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: String,
    pub mod_time: i64,
    pub action: VersionAction,
    /// 字节数，隐藏标记为 0
    pub size: u64,
}

impl FileVersion {
    pub fn new(id: impl Into<String>, mod_time: i64, action: VersionAction, size: u64) -> Self {
        Self {
            id: id.into(),
            mod_time,
            action,
            size,
        }
    }
}

/// 文件夹中的一个文件
///
/// 名称相对于文件夹，分隔符始终是 `/`。远程文件可能有多个版本，
/// 按从新到旧排列；本地文件只有一个版本。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    versions: Vec<FileVersion>,
}

impl File {
    /// 创建文件，`versions` 不能为空
    pub fn new(name: impl Into<String>, versions: Vec<FileVersion>) -> Self {
        assert!(!versions.is_empty(), "a file needs at least one version");
        Self {
            name: name.into(),
            versions,
        }
    }

    /// 当前（最新）版本
    pub fn latest_version(&self) -> &FileVersion {
        &self.versions[0]
    }

    pub fn versions(&self) -> &[FileVersion] {
        &self.versions
    }

    /// 当前版本的修改时间
    pub fn mod_time(&self) -> i64 {
        self.latest_version().mod_time
    }
}
