use crate::core::action::{ActionDispatcher, ActionTask};
use crate::core::executor::{SyncExecutor, DEFAULT_MAX_WORKERS};
use crate::core::folder::Folder;
use crate::core::policy::{make_file_sync_actions, SyncPolicy, SyncType};
use crate::core::report::SyncReport;
use crate::core::zip::zip_folders;
use crate::error::{Result, SyncError};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub policy: SyncPolicy,
    /// 最大并发动作数
    pub max_workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: SyncPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

/// 同步结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub files_compared: u64,
    pub actions_planned: u64,
    pub transfer_files: u64,
    pub transfer_bytes: u64,
    /// 只列出了动作，没有执行
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
    reporter: Arc<SyncReport>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_reporter(config, Arc::new(SyncReport::new()))
    }

    pub fn with_reporter(config: SyncConfig, reporter: Arc<SyncReport>) -> Self {
        Self { config, reporter }
    }

    pub fn reporter(&self) -> &Arc<SyncReport> {
        &self.reporter
    }

    /// 把 source 同步到 dest
    ///
    /// `dispatcher` 为 None 时只列出动作（预演），不做任何修改。
    /// `now_millis` 用于计算旧版本的保留期限。
    pub async fn run_sync(
        &self,
        source: Arc<dyn Folder>,
        dest: Arc<dyn Folder>,
        dispatcher: Option<Arc<dyn ActionDispatcher>>,
        now_millis: i64,
    ) -> Result<SyncSummary> {
        // 选项和方向在处理任何文件之前检查
        self.config.policy.validate()?;
        let sync_type = SyncType::from_folders(source.folder_type(), dest.folder_type())?;

        info!("开始同步: {} -> {} ({})", source, dest, sync_type);
        let start = Instant::now();

        let result = self
            .run_inner(sync_type, source, dest, dispatcher, now_millis)
            .await;
        self.reporter.close();

        match result {
            Ok(mut summary) => {
                summary.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "同步完成: 比较 {} 个文件, {} 个动作, 传输 {} 个文件 ({} 字节), 耗时 {}ms",
                    summary.files_compared,
                    summary.actions_planned,
                    summary.transfer_files,
                    summary.transfer_bytes,
                    summary.duration_ms
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("同步失败: {}", e);
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        sync_type: SyncType,
        source: Arc<dyn Folder>,
        dest: Arc<dyn Folder>,
        dispatcher: Option<Arc<dyn ActionDispatcher>>,
        now_millis: i64,
    ) -> Result<SyncSummary> {
        let mut executor = SyncExecutor::new(self.config.max_workers);

        // 后台统计本地文件数，只用于进度显示
        let local_folder = match sync_type {
            SyncType::LocalToRemote => source.clone(),
            SyncType::RemoteToLocal => dest.clone(),
        };
        let counting = executor
            .spawn_handle(count_files(local_folder, self.reporter.clone()))
            .await?;

        let planned = self
            .plan(sync_type, &source, &dest, dispatcher, now_millis, &mut executor)
            .await;
        let summary = match planned {
            Ok(summary) => summary,
            Err(e) => {
                counting.abort();
                executor.abort();
                return Err(e);
            }
        };

        // 统计任务结束后才能进入传输阶段
        if let Err(e) = counting.await.map_err(SyncError::from).and_then(|r| r) {
            executor.abort();
            return Err(e);
        }
        self.reporter
            .end_compare(summary.transfer_files, summary.transfer_bytes)?;

        executor.shutdown().await?;
        Ok(summary)
    }

    /// 遍历文件对，生成并提交动作
    async fn plan(
        &self,
        sync_type: SyncType,
        source: &Arc<dyn Folder>,
        dest: &Arc<dyn Folder>,
        dispatcher: Option<Arc<dyn ActionDispatcher>>,
        now_millis: i64,
        executor: &mut SyncExecutor,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            dry_run: dispatcher.is_none(),
            ..Default::default()
        };

        let mut pairs = zip_folders(source.as_ref(), dest.as_ref()).await?;
        while let Some((source_file, dest_file)) = pairs.try_next().await? {
            self.reporter.update_compare(1);
            summary.files_compared += 1;

            let actions = make_file_sync_actions(
                sync_type,
                source_file.as_ref(),
                dest_file.as_ref(),
                source.as_ref(),
                dest.as_ref(),
                &self.config.policy,
                now_millis,
            )?;

            for task in actions {
                self.submit_action(task, &dispatcher, executor, &mut summary)
                    .await?;
            }

            if executor.has_failed() {
                debug!("已有动作失败，停止比较");
                break;
            }
        }

        Ok(summary)
    }

    async fn submit_action(
        &self,
        task: Arc<ActionTask>,
        dispatcher: &Option<Arc<dyn ActionDispatcher>>,
        executor: &mut SyncExecutor,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let action = task.action();
        debug!("计划动作: {}", action);
        self.reporter.print_completion(&action.to_string());

        summary.actions_planned += 1;
        if let Some(bytes) = action.transfer_bytes() {
            summary.transfer_files += 1;
            summary.transfer_bytes += bytes;
        }

        if let Some(dispatcher) = dispatcher {
            executor
                .submit(task.clone(), dispatcher.clone(), self.reporter.clone())
                .await?;
        }
        Ok(())
    }
}

/// 统计本地文件数量
async fn count_files(folder: Arc<dyn Folder>, reporter: Arc<SyncReport>) -> Result<()> {
    let mut files = folder.all_files().await?;
    while files.try_next().await?.is_some() {
        reporter.update_local(1)?;
    }
    reporter.end_local()
}
