//! 同步动作及其依赖
//!
//! 动作本身只携带数据（[`SyncAction`]），执行交给 [`ActionDispatcher`]。
//! [`ActionTask`] 在动作外面包一层前置依赖和完成信号。

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 上传本地文件为远程新版本
    Upload {
        local_path: PathBuf,
        name: String,
        mod_time: i64,
        size: u64,
    },
    /// 隐藏远程文件
    Hide { name: String },
    /// 下载远程版本到本地
    Download {
        name: String,
        version_id: String,
        local_path: PathBuf,
        mod_time: i64,
        size: u64,
    },
    /// 删除远程的一个版本
    Delete { name: String, version_id: String },
    /// 删除本地文件
    LocalDelete { local_path: PathBuf },
}

impl SyncAction {
    /// 传输动作的字节数；非传输动作返回 None
    pub fn transfer_bytes(&self) -> Option<u64> {
        match self {
            SyncAction::Upload { size, .. } | SyncAction::Download { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn is_transfer(&self) -> bool {
        self.transfer_bytes().is_some()
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Upload {
                local_path,
                name,
                mod_time,
                ..
            } => write!(f, "upload({}, {}, {})", local_path.display(), name, mod_time),
            SyncAction::Hide { name } => write!(f, "hide({})", name),
            SyncAction::Download {
                name,
                version_id,
                local_path,
                mod_time,
                ..
            } => write!(
                f,
                "download({}, {}, {}, {})",
                name,
                version_id,
                local_path.display(),
                mod_time
            ),
            SyncAction::Delete { name, version_id } => write!(f, "delete({}, {})", name, version_id),
            SyncAction::LocalDelete { local_path } => {
                write!(f, "local_delete({})", local_path.display())
            }
        }
    }
}

/// 真正执行动作的一方（远程传输、本地文件操作）
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn perform(&self, action: &SyncAction) -> Result<()>;
}

/// 动作的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Running,
    Done,
    Failed,
}

impl ActionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ActionState::Done | ActionState::Failed)
    }
}

/// 带前置依赖的动作
///
/// 依赖图必须无环，且前置动作必须先于依赖它的动作提交执行。
pub struct ActionTask {
    action: SyncAction,
    prerequisites: Vec<Arc<ActionTask>>,
    started: AtomicBool,
    state: watch::Sender<ActionState>,
}

impl ActionTask {
    pub fn new(action: SyncAction, prerequisites: Vec<Arc<ActionTask>>) -> Arc<Self> {
        let (state, _) = watch::channel(ActionState::Pending);
        Arc::new(Self {
            action,
            prerequisites,
            started: AtomicBool::new(false),
            state,
        })
    }

    pub fn action(&self) -> &SyncAction {
        &self.action
    }

    pub fn prerequisites(&self) -> &[Arc<ActionTask>] {
        &self.prerequisites
    }

    pub fn state(&self) -> ActionState {
        *self.state.borrow()
    }

    /// 等待动作结束；动作失败时返回错误
    pub async fn wait_until_done(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(ActionState::is_finished)
            .await
            .map_err(|_| SyncError::PrerequisiteFailed(self.action.to_string()))?;
        match state {
            ActionState::Done => Ok(()),
            _ => Err(SyncError::PrerequisiteFailed(self.action.to_string())),
        }
    }

    /// 等待所有前置动作完成后执行
    ///
    /// 每个动作最多执行一次，重复调用直接返回。
    pub async fn run(&self, dispatcher: &dyn ActionDispatcher) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for prereq in &self.prerequisites {
            if let Err(e) = prereq.wait_until_done().await {
                self.state.send_replace(ActionState::Failed);
                return Err(e);
            }
        }

        self.state.send_replace(ActionState::Running);
        match dispatcher.perform(&self.action).await {
            Ok(()) => {
                self.state.send_replace(ActionState::Done);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ActionState::Failed);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for ActionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTask")
            .field("action", &self.action)
            .field("prerequisites", &self.prerequisites.len())
            .field("state", &self.state())
            .finish()
    }
}
