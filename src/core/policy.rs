//! 同步策略：根据一对文件和同步选项决定要执行的动作

use crate::core::action::{ActionTask, SyncAction};
use crate::core::file::{File, FileVersion, VersionAction, ONE_DAY_IN_MS};
use crate::core::folder::{Folder, FolderType};
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// 同步选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    /// 删除目标中源已不存在的文件以及旧版本
    pub delete: bool,
    /// 旧版本保留天数
    pub keep_days: Option<i64>,
    /// 目标较新时仍然覆盖
    pub replace_newer: bool,
    /// 目标较新时跳过
    pub skip_newer: bool,
}

impl SyncPolicy {
    /// 检查互斥选项
    pub fn validate(&self) -> Result<()> {
        if self.replace_newer && self.skip_newer {
            return Err(SyncError::ConfigurationConflict(
                "--skip-newer 与 --replace-newer 不能同时使用".to_string(),
            ));
        }
        if self.delete && self.keep_days.is_some() {
            return Err(SyncError::ConfigurationConflict(
                "--delete 与 --keep-days 不能同时使用".to_string(),
            ));
        }
        if let Some(days) = self.keep_days {
            if days < 0 {
                return Err(SyncError::ConfigurationConflict(format!(
                    "--keep-days 不能为负数: {}",
                    days
                )));
            }
        }
        Ok(())
    }
}

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    LocalToRemote,
    RemoteToLocal,
}

impl SyncType {
    /// 必须一边本地、一边远程
    pub fn from_folders(source: FolderType, dest: FolderType) -> Result<Self> {
        match (source, dest) {
            (FolderType::Local, FolderType::Remote) => Ok(SyncType::LocalToRemote),
            (FolderType::Remote, FolderType::Local) => Ok(SyncType::RemoteToLocal),
            _ => Err(SyncError::UnsupportedFolderPairing {
                source_type: source.to_string(),
                dest_type: dest.to_string(),
            }),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::LocalToRemote => write!(f, "local-to-remote"),
            SyncType::RemoteToLocal => write!(f, "remote-to-local"),
        }
    }
}

/// 远程文件的当前版本为隐藏标记时，视为已删除
fn live_source(sync_type: SyncType, source_file: Option<&File>) -> Option<&File> {
    match sync_type {
        SyncType::RemoteToLocal => {
            source_file.filter(|f| f.latest_version().action == VersionAction::Upload)
        }
        SyncType::LocalToRemote => source_file,
    }
}

fn make_transfer_action(
    sync_type: SyncType,
    source_file: &File,
    source_folder: &dyn Folder,
    dest_folder: &dyn Folder,
) -> Result<SyncAction> {
    let version = source_file.latest_version();
    let action = match sync_type {
        SyncType::LocalToRemote => SyncAction::Upload {
            local_path: source_folder.make_full_path(&source_file.name)?,
            name: source_file.name.clone(),
            mod_time: version.mod_time,
            size: version.size,
        },
        SyncType::RemoteToLocal => SyncAction::Download {
            name: source_file.name.clone(),
            version_id: version.id.clone(),
            local_path: dest_folder.make_full_path(&source_file.name)?,
            mod_time: version.mod_time,
            size: version.size,
        },
    };
    Ok(action)
}

fn make_cleanup_action(
    sync_type: SyncType,
    dest_file: &File,
    version: &FileVersion,
    policy: &SyncPolicy,
    now_millis: i64,
) -> Option<SyncAction> {
    match sync_type {
        SyncType::LocalToRemote => {
            let expired = policy.delete
                || policy
                    .keep_days
                    .is_some_and(|days| {
                        let cutoff = now_millis.saturating_sub(days.saturating_mul(ONE_DAY_IN_MS));
                        version.mod_time < cutoff
                    });
            expired.then(|| SyncAction::Delete {
                name: dest_file.name.clone(),
                version_id: version.id.clone(),
            })
        }
        SyncType::RemoteToLocal => policy.delete.then(|| SyncAction::LocalDelete {
            local_path: PathBuf::from(&version.id),
        }),
    }
}

/// 计算一对文件需要的动作，按执行顺序返回
///
/// 清理动作依赖同一文件的传输或隐藏动作（如果有）。
pub fn make_file_sync_actions(
    sync_type: SyncType,
    source_file: Option<&File>,
    dest_file: Option<&File>,
    source_folder: &dyn Folder,
    dest_folder: &dyn Folder,
    policy: &SyncPolicy,
    now_millis: i64,
) -> Result<Vec<Arc<ActionTask>>> {
    let source_file = live_source(sync_type, source_file);
    let source_mod_time = source_file.map(File::mod_time).unwrap_or(0);
    let dest_mod_time = dest_file.map(File::mod_time).unwrap_or(0);

    let mut actions = Vec::new();
    // 默认只清理非当前版本
    let mut candidates: &[FileVersion] = dest_file.map(|f| &f.versions()[1..]).unwrap_or(&[]);

    if let Some(source) = source_file {
        let transfer = if dest_mod_time < source_mod_time {
            true
        } else if dest_mod_time > source_mod_time {
            if policy.replace_newer {
                true
            } else if policy.skip_newer {
                false
            } else {
                return Err(SyncError::DestinationNewer {
                    name: source.name.clone(),
                });
            }
        } else {
            false
        };

        if transfer {
            actions.push(ActionTask::new(
                make_transfer_action(sync_type, source, source_folder, dest_folder)?,
                vec![],
            ));
            // 上传产生新版本，原有版本全部变为旧版本
            if sync_type == SyncType::LocalToRemote {
                if let Some(dest) = dest_file {
                    candidates = dest.versions();
                }
            }
        }
    } else if let Some(dest) = dest_file {
        if sync_type == SyncType::LocalToRemote
            && policy.keep_days.is_some()
            && dest.latest_version().action == VersionAction::Upload
        {
            actions.push(ActionTask::new(
                SyncAction::Hide {
                    name: dest.name.clone(),
                },
                vec![],
            ));
        }
        candidates = dest.versions();
    }

    if let Some(dest) = dest_file {
        let prerequisites: Vec<Arc<ActionTask>> = actions.first().cloned().into_iter().collect();
        for version in candidates {
            if let Some(action) = make_cleanup_action(sync_type, dest, version, policy, now_millis)
            {
                actions.push(ActionTask::new(action, prerequisites.clone()));
            }
        }
    }

    Ok(actions)
}
