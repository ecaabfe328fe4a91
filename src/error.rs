//! 同步核心的错误类型

use thiserror::Error;

/// 同步核心的 Result 别名
pub type Result<T> = std::result::Result<T, SyncError>;

/// 同步过程中可能出现的错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 互斥的选项被同时指定（skipNewer/replaceNewer，delete/keepDays）
    #[error("配置冲突: {0}")]
    ConfigurationConflict(String),

    /// 文件夹组合不受支持（必须一个本地、一个远程）
    #[error("不支持的同步方向: {source_type} -> {dest_type}")]
    UnsupportedFolderPairing {
        source_type: String,
        dest_type: String,
    },

    /// 目标文件比源文件新，且未指定 replaceNewer / skipNewer
    #[error("destination file is newer: {name}")]
    DestinationNewer { name: String },

    /// 在不支持的文件夹类型上调用了操作
    #[error("不支持的操作: {0}")]
    UnsupportedOperation(String),

    /// 本地文件名无法映射为远程名称
    #[error("无效的文件名 {name:?} (目录 {dir})")]
    InvalidFileName { name: String, dir: String },

    /// 进度报告器在错误的阶段被调用
    #[error("进度状态错误: {operation} 不能在 {state} 阶段调用")]
    InvalidReportState {
        operation: &'static str,
        state: &'static str,
    },

    /// 前置动作失败，依赖它的动作不会执行
    #[error("前置动作失败: {0}")]
    PrerequisiteFailed(String),

    /// 传输协作方返回的错误
    #[error("传输失败: {0}")]
    Transfer(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("存储错误: {0}")]
    Storage(#[from] opendal::Error),

    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
}
