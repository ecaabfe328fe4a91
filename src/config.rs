//! 应用配置模块
//!
//! 所有配置保存在配置目录下的 `config.json`，按节（`log`、`remote`、`sync`）读取，
//! 缺失或格式错误时使用默认值。

use crate::core::DEFAULT_MAX_WORKERS;
use crate::logging::LogConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 配置目录：`<系统配置目录>/bucketsync`
pub fn config_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join("bucketsync"))
        .unwrap_or_else(|| PathBuf::from(".bucketsync"))
}

/// 读取 config.json 中的某一节
fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, key: &str) -> T {
    fs::read_to_string(config_dir.join(CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get(key).cloned())
        .and_then(|section| serde_json::from_value::<T>(section).ok())
        .unwrap_or_default()
}

/// 远程存储（S3 兼容）连接配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// 自定义端点（MinIO、B2 等 S3 兼容服务）
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl RemoteConfig {
    pub fn load(config_dir: &Path) -> Self {
        let mut config: Self = load_section(config_dir, "remote");
        if config.region.is_empty() {
            config.region = default_region();
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// 环境变量优先于配置文件
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(region) = var("BUCKETSYNC_REGION") {
            self.region = region;
        }
        if let Some(endpoint) = var("BUCKETSYNC_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(access_key) = var("BUCKETSYNC_ACCESS_KEY") {
            self.access_key = access_key;
        }
        if let Some(secret_key) = var("BUCKETSYNC_SECRET_KEY") {
            self.secret_key = secret_key;
        }
    }
}

/// 同步默认参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 并发动作数
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_threads() -> usize {
    DEFAULT_MAX_WORKERS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

impl SyncSettings {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "sync")
    }
}

/// 完整的应用配置
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn load(config_dir: &Path) -> Self {
        Self {
            log: LogConfig::load(config_dir),
            remote: RemoteConfig::load(config_dir),
            sync: SyncSettings::load(config_dir),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "log")
    }
}
