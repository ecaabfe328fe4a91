//! 固定宽度的并发执行器

use crate::core::action::{ActionDispatcher, ActionTask};
use crate::core::report::SyncReport;
use crate::error::{Result, SyncError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 默认并发数
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// 同步执行器
///
/// 提交时先占用一个并发槽位，占满时提交会等待。槽位按提交顺序发放，
/// 所以先提交的前置动作总能拿到槽位。
pub struct SyncExecutor {
    semaphore: Arc<Semaphore>,
    handles: Vec<JoinHandle<Result<()>>>,
    failed: Arc<AtomicBool>,
}

impl SyncExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            handles: Vec::new(),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 是否已有任务失败
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// 在执行器中运行一个后台任务
    pub async fn spawn<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = self.spawn_handle(task).await?;
        self.handles.push(handle);
        Ok(())
    }

    /// 同样占用一个并发槽位，但由调用方等待任务结果
    pub async fn spawn_handle<F>(&self, task: F) -> Result<JoinHandle<Result<()>>>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SyncError::Transfer(format!("执行器已关闭: {}", e)))?;
        let failed = self.failed.clone();

        Ok(tokio::spawn(async move {
            let result = task.await;
            drop(permit);
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            result
        }))
    }

    /// 提交一个动作，传输完成后更新进度
    pub async fn submit(
        &mut self,
        task: Arc<ActionTask>,
        dispatcher: Arc<dyn ActionDispatcher>,
        reporter: Arc<SyncReport>,
    ) -> Result<()> {
        self.spawn(async move {
            let action = task.action();
            match task.run(dispatcher.as_ref()).await {
                Ok(()) => {
                    debug!("完成: {}", action);
                    if let Some(bytes) = action.transfer_bytes() {
                        reporter.update_transfer(1, bytes);
                    }
                    Ok(())
                }
                Err(e) => {
                    warn!("执行失败: {} - {}", action, e);
                    Err(e)
                }
            }
        })
        .await
    }

    /// 等待所有任务结束，返回第一个错误
    pub async fn shutdown(self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::from(e)),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 放弃尚未完成的任务
    pub fn abort(self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::SyncAction;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SlowRecorder {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionDispatcher for SlowRecorder {
        async fn perform(&self, action: &SyncAction) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if let SyncAction::Hide { name } = action {
                if name.starts_with("bad") {
                    return Err(SyncError::Transfer(name.clone()));
                }
            }
            self.order.lock().unwrap().push(action.to_string());
            Ok(())
        }
    }

    fn hide(name: &str) -> SyncAction {
        SyncAction::Hide {
            name: name.to_string(),
        }
    }

    fn quiet_reporter() -> Arc<SyncReport> {
        Arc::new(SyncReport::with_writer(Box::new(std::io::sink())))
    }

    #[tokio::test]
    async fn test_width_is_respected() {
        let recorder = Arc::new(SlowRecorder::default());
        let reporter = quiet_reporter();
        let mut executor = SyncExecutor::new(2);

        for i in 0..8 {
            let task = ActionTask::new(hide(&format!("f{}", i)), vec![]);
            executor
                .submit(task, recorder.clone(), reporter.clone())
                .await
                .unwrap();
        }
        executor.shutdown().await.unwrap();

        assert_eq!(recorder.order.lock().unwrap().len(), 8);
        assert!(recorder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_prerequisites_run_first_with_single_worker() {
        let recorder = Arc::new(SlowRecorder::default());
        let reporter = quiet_reporter();
        let mut executor = SyncExecutor::new(1);

        let first = ActionTask::new(hide("first"), vec![]);
        let second = ActionTask::new(hide("second"), vec![first.clone()]);
        executor
            .submit(first, recorder.clone(), reporter.clone())
            .await
            .unwrap();
        executor
            .submit(second, recorder.clone(), reporter.clone())
            .await
            .unwrap();
        executor.shutdown().await.unwrap();

        assert_eq!(
            *recorder.order.lock().unwrap(),
            vec!["hide(first)", "hide(second)"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_reports_first_failure() {
        let recorder = Arc::new(SlowRecorder::default());
        let reporter = quiet_reporter();
        let mut executor = SyncExecutor::default();

        let bad = ActionTask::new(hide("bad"), vec![]);
        let dependent = ActionTask::new(hide("after-bad"), vec![bad.clone()]);
        let ok = ActionTask::new(hide("ok"), vec![]);
        for task in [bad, dependent, ok] {
            executor
                .submit(task, recorder.clone(), reporter.clone())
                .await
                .unwrap();
        }

        let err = executor.shutdown().await.unwrap_err();
        assert!(matches!(err, SyncError::Transfer(ref name) if name == "bad"));
        assert_eq!(*recorder.order.lock().unwrap(), vec!["hide(ok)"]);
    }

    #[tokio::test]
    async fn test_spawn_background_task() {
        let mut executor = SyncExecutor::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        executor
            .spawn(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        executor.shutdown().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_handle_returns_task_error() {
        let executor = SyncExecutor::new(1);
        let handle = executor
            .spawn_handle(async { Err(SyncError::Transfer("scan".to_string())) })
            .await
            .unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SyncError::Transfer(ref m)) if m == "scan"));
        assert!(executor.has_failed());
    }
}
