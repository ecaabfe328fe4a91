//! bucketsync 命令行入口
//!
//! 用法: bucketsync <SOURCE> <DEST> [选项]

use anyhow::{bail, Context};
use bucketsync::config::{self, AppConfig, RemoteConfig};
use bucketsync::core::{
    ActionDispatcher, ActionRunner, Folder, FolderSpec, LocalFolder, RemoteFolder,
};
use bucketsync::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use bucketsync::storage::S3Store;
use bucketsync::{SyncConfig, SyncEngine, SyncPolicy};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "bucketsync")]
#[command(about = "One-way sync between a local directory and a versioned bucket")]
struct Args {
    /// Source folder: a local path or remote://bucket[/prefix]
    source: String,

    /// Destination folder: a local path or remote://bucket[/prefix]
    dest: String,

    /// Delete destination files missing from the source, and old versions
    #[arg(long)]
    delete: bool,

    /// Keep old versions for this many days
    #[arg(long, value_name = "DAYS")]
    keep_days: Option<i64>,

    /// Overwrite destination files that are newer than the source
    #[arg(long)]
    replace_newer: bool,

    /// Skip destination files that are newer than the source
    #[arg(long)]
    skip_newer: bool,

    /// Only print the planned actions
    #[arg(long)]
    dry_run: bool,

    /// Number of concurrent actions
    #[arg(long, env = "BUCKETSYNC_THREADS")]
    threads: Option<usize>,
}

/// 初始化日志系统，日志只写入文件
fn init_logging(config: &LogConfig) {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into())
        .add_directive("opendal=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    match SizeRotatingWriter::new(&get_log_dir(), config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        Err(e) => {
            // 进度行占用标准输出，日志文件不可用时只提示一次
            eprintln!("无法创建日志文件: {}", e);
        }
    }
}

/// 远程文件夹需要的存储连接
fn open_store(bucket: &str, remote: &RemoteConfig) -> anyhow::Result<Arc<S3Store>> {
    if remote.access_key.is_empty() || remote.secret_key.is_empty() {
        bail!(
            "缺少远程存储凭据，请在 {} 中配置 remote 节或设置 BUCKETSYNC_ACCESS_KEY / BUCKETSYNC_SECRET_KEY",
            config::config_dir().join(config::CONFIG_FILE).display()
        );
    }
    let store = S3Store::new(
        bucket,
        &remote.region,
        &remote.access_key,
        &remote.secret_key,
        remote.endpoint.clone(),
    )
    .with_context(|| format!("连接存储桶失败: {}", bucket))?;
    Ok(Arc::new(store))
}

enum OpenedFolder {
    Local(Arc<LocalFolder>),
    Remote(Arc<RemoteFolder>),
}

impl OpenedFolder {
    fn open(address: &str, remote: &RemoteConfig) -> anyhow::Result<Self> {
        match FolderSpec::parse(address) {
            FolderSpec::Local(path) => Ok(Self::Local(Arc::new(LocalFolder::new(path)?))),
            FolderSpec::Remote { bucket, prefix } => {
                let store = open_store(&bucket, remote)?;
                Ok(Self::Remote(Arc::new(RemoteFolder::new(&bucket, &prefix, store))))
            }
        }
    }

    fn as_folder(&self) -> Arc<dyn Folder> {
        match self {
            Self::Local(folder) => folder.clone(),
            Self::Remote(folder) => folder.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_dir = config::config_dir();
    let app_config = AppConfig::load(&config_dir);
    init_logging(&app_config.log);

    let source = OpenedFolder::open(&args.source, &app_config.remote)?;
    let dest = OpenedFolder::open(&args.dest, &app_config.remote)?;

    let remote_folder = match (&source, &dest) {
        (OpenedFolder::Local(_), OpenedFolder::Remote(remote)) => Some(remote.clone()),
        (OpenedFolder::Remote(remote), OpenedFolder::Local(local)) => {
            // 下载目标目录不存在时自动创建
            tokio::fs::create_dir_all(local.root())
                .await
                .with_context(|| format!("创建目录失败: {}", local.root().display()))?;
            Some(remote.clone())
        }
        // 同类文件夹由引擎报告错误
        _ => None,
    };
    let dispatcher = match remote_folder {
        Some(remote) if !args.dry_run => {
            let runner: Arc<dyn ActionDispatcher> = Arc::new(ActionRunner::for_folder(&remote));
            Some(runner)
        }
        _ => None,
    };

    let sync_config = SyncConfig {
        policy: SyncPolicy {
            delete: args.delete,
            keep_days: args.keep_days,
            replace_newer: args.replace_newer,
            skip_newer: args.skip_newer,
        },
        max_workers: args.threads.unwrap_or(app_config.sync.threads),
    };

    let engine = SyncEngine::new(sync_config);
    let now_millis = chrono::Utc::now().timestamp_millis();
    let summary = engine
        .run_sync(source.as_folder(), dest.as_folder(), dispatcher, now_millis)
        .await?;

    info!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
