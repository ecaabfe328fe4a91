//! 文件夹抽象：本地目录或远程存储中的一个前缀
//!
//! 两种实现都必须按远程存储使用的顺序（路径字节序，目录按 `名称/` 参与排序）
//! 产出文件，合并比较依赖这一点。

use crate::core::file::{File, FileVersion, VersionAction};
use crate::error::{Result, SyncError};
use crate::storage::local::modified_millis;
use crate::storage::{RemoteStore, RemoteVersionInfo, VersionStream};
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// 远程文件夹地址前缀
pub const REMOTE_SCHEME: &str = "remote://";

/// 本地遍历结果通道容量
const WALK_CHANNEL_CAPACITY: usize = 256;

/// 文件流
pub type FileStream = Pin<Box<dyn Stream<Item = Result<File>> + Send>>;

/// 文件夹类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    Local,
    Remote,
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderType::Local => write!(f, "local"),
            FolderType::Remote => write!(f, "remote"),
        }
    }
}

/// 文件夹接口
#[async_trait]
pub trait Folder: Send + Sync + fmt::Display {
    /// 按远程存储的顺序惰性产出所有文件，名称始终以 `/` 分隔
    ///
    /// 每次调用返回一个新的流，流只能消费一次。
    async fn all_files(&self) -> Result<FileStream>;

    fn folder_type(&self) -> FolderType;

    /// 文件在本地的完整路径，仅本地文件夹支持
    fn make_full_path(&self, file_name: &str) -> Result<PathBuf>;
}

/// 同步命令行中的文件夹地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderSpec {
    Local(PathBuf),
    Remote { bucket: String, prefix: String },
}

impl FolderSpec {
    /// `remote://bucketName[/prefix]` 为远程文件夹，其余均视为本地路径
    pub fn parse(folder_name: &str) -> Self {
        match folder_name.strip_prefix(REMOTE_SCHEME) {
            Some(bucket_and_path) => match bucket_and_path.split_once('/') {
                Some((bucket, prefix)) => FolderSpec::Remote {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                },
                None => FolderSpec::Remote {
                    bucket: bucket_and_path.to_string(),
                    prefix: String::new(),
                },
            },
            None => FolderSpec::Local(PathBuf::from(folder_name)),
        }
    }
}

// ============ 本地文件夹 ============

/// 本地目录
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 排序键：目录名带上 `/`，与远程扁平化后的顺序一致
    fn sort_key(entry: &DirEntry) -> String {
        let mut key = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().is_dir() {
            key.push('/');
        }
        key
    }

    /// 在阻塞线程中遍历目录，结果逐个送入通道
    fn walk(root: PathBuf, tx: mpsc::Sender<Result<File>>) {
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by(|a, b| Self::sort_key(a).cmp(&Self::sort_key(b)));

        for entry in walker {
            let item = match entry {
                Ok(entry) if entry.depth() == 0 => continue,
                Ok(entry) => match Self::make_file(&root, &entry) {
                    Ok(Some(file)) => Ok(file),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
                Err(e) => Err(SyncError::Io(e.into())),
            };

            let failed = item.is_err();
            if tx.blocking_send(item).is_err() {
                debug!("文件流已被丢弃，停止遍历: {}", root.display());
                return;
            }
            if failed {
                return;
            }
        }
    }

    /// 目录返回 None；符号链接只在指向普通文件时收录，不跟随目录链接
    fn make_file(root: &Path, entry: &DirEntry) -> Result<Option<File>> {
        let name = entry.file_name();
        let dir = entry
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let name = name.to_str().ok_or_else(|| SyncError::InvalidFileName {
            name: name.to_string_lossy().into_owned(),
            dir: dir.clone(),
        })?;
        if name.contains('/') {
            return Err(SyncError::InvalidFileName {
                name: name.to_string(),
                dir,
            });
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            return Ok(None);
        }
        let metadata = if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => meta,
                _ => return Ok(None),
            }
        } else if file_type.is_file() {
            entry.metadata().map_err(|e| SyncError::Io(e.into()))?
        } else {
            return Ok(None);
        };

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let mut parts = Vec::new();
        for component in relative.iter() {
            let part = component.to_str().ok_or_else(|| SyncError::InvalidFileName {
                name: component.to_string_lossy().into_owned(),
                dir: dir.clone(),
            })?;
            parts.push(part);
        }

        let version = FileVersion::new(
            entry.path().display().to_string(),
            modified_millis(&metadata)?,
            VersionAction::Upload,
            metadata.len(),
        );
        Ok(Some(File::new(parts.join("/"), vec![version])))
    }
}

#[async_trait]
impl Folder for LocalFolder {
    async fn all_files(&self) -> Result<FileStream> {
        let (tx, rx) = mpsc::channel(WALK_CHANNEL_CAPACITY);
        let root = self.root.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || Self::walk(root, tx));

        Ok(ReceiverStream::new(rx).boxed())
    }

    fn folder_type(&self) -> FolderType {
        FolderType::Local
    }

    fn make_full_path(&self, file_name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        path.extend(file_name.split('/'));
        Ok(path)
    }
}

impl fmt::Display for LocalFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalFolder({})", self.root.display())
    }
}

// ============ 远程文件夹 ============

/// 远程存储中的一个"文件夹"（桶 + 前缀）
pub struct RemoteFolder {
    bucket_name: String,
    folder_name: String,
    store: Arc<dyn RemoteStore>,
}

impl RemoteFolder {
    pub fn new(bucket_name: &str, folder_name: &str, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            bucket_name: bucket_name.to_string(),
            folder_name: folder_name.trim_matches('/').to_string(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// 列表前缀（非空时带结尾 `/`）
    pub fn prefix(&self) -> String {
        if self.folder_name.is_empty() {
            String::new()
        } else {
            format!("{}/", self.folder_name)
        }
    }

    /// 文件在存储中的完整对象名
    pub fn full_name(&self, file_name: &str) -> String {
        format!("{}{}", self.prefix(), file_name)
    }

    fn to_file_version(info: &RemoteVersionInfo) -> FileVersion {
        FileVersion::new(info.id.clone(), info.mod_time_millis(), info.action, info.size)
    }

    /// 把同名的连续版本合并为一个文件
    fn group_versions(versions: VersionStream, prefix_len: usize) -> FileStream {
        let versions = versions
            .try_filter(move |v| futures::future::ready(v.name.len() > prefix_len))
            .boxed();

        futures::stream::unfold(
            (versions, None::<RemoteVersionInfo>, false),
            move |(mut inner, mut pending, finished)| async move {
                if finished {
                    return None;
                }
                let first = match pending.take() {
                    Some(v) => v,
                    None => match inner.next().await? {
                        Ok(v) => v,
                        Err(e) => return Some((Err(e), (inner, None, true))),
                    },
                };

                let name = first.name[prefix_len..].to_string();
                let mut file_versions = vec![Self::to_file_version(&first)];
                loop {
                    match inner.next().await {
                        None => break,
                        Some(Err(e)) => return Some((Err(e), (inner, None, true))),
                        Some(Ok(v)) if v.name == first.name => {
                            file_versions.push(Self::to_file_version(&v));
                        }
                        Some(Ok(v)) => {
                            pending = Some(v);
                            break;
                        }
                    }
                }

                Some((Ok(File::new(name, file_versions)), (inner, pending, false)))
            },
        )
        .boxed()
    }
}

#[async_trait]
impl Folder for RemoteFolder {
    async fn all_files(&self) -> Result<FileStream> {
        let prefix = self.prefix();
        let versions = self.store.list_versions(&prefix).await?;
        Ok(Self::group_versions(versions, prefix.len()))
    }

    fn folder_type(&self) -> FolderType {
        FolderType::Remote
    }

    fn make_full_path(&self, _file_name: &str) -> Result<PathBuf> {
        Err(SyncError::UnsupportedOperation(format!(
            "远程文件夹没有本地路径: {}",
            self
        )))
    }
}

impl fmt::Display for RemoteFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteFolder({}{}/{})", REMOTE_SCHEME, self.bucket_name, self.folder_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn collect(folder: &dyn Folder) -> Vec<File> {
        folder
            .all_files()
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    fn names(files: &[File]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_parse_folder_spec() {
        assert_eq!(
            FolderSpec::parse("remote://bucket/photos/2020"),
            FolderSpec::Remote {
                bucket: "bucket".to_string(),
                prefix: "photos/2020".to_string()
            }
        );
        assert_eq!(
            FolderSpec::parse("remote://bucket"),
            FolderSpec::Remote {
                bucket: "bucket".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            FolderSpec::parse("/home/me/photos"),
            FolderSpec::Local(PathBuf::from("/home/me/photos"))
        );
    }

    #[tokio::test]
    async fn test_local_order_matches_flattened_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for path in ["a.txt", "a/b.txt", "a-b", "a0", "b/c/d.txt", "b/a"] {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, path).unwrap();
        }

        let folder = LocalFolder::new(root).unwrap();
        let files = collect(&folder).await;

        let mut expected = vec!["a.txt", "a/b.txt", "a-b", "a0", "b/c/d.txt", "b/a"];
        expected.sort();
        assert_eq!(names(&files), expected);

        let file = files.iter().find(|f| f.name == "a.txt").unwrap();
        assert_eq!(file.versions().len(), 1);
        assert_eq!(file.latest_version().action, VersionAction::Upload);
        assert_eq!(file.latest_version().size, 5);
        assert_eq!(
            PathBuf::from(&file.latest_version().id),
            folder.make_full_path("a.txt").unwrap()
        );
    }

    #[tokio::test]
    async fn test_local_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let folder = LocalFolder::new(dir.path()).unwrap();
        assert!(collect(&folder).await.is_empty());
    }

    #[test]
    fn test_local_make_full_path() {
        let folder = LocalFolder::new("/data/root").unwrap();
        assert_eq!(
            folder.make_full_path("a/b/c.txt").unwrap(),
            PathBuf::from("/data/root").join("a").join("b").join("c.txt")
        );
    }

    #[tokio::test]
    async fn test_remote_groups_versions_and_strips_prefix() {
        let store = Arc::new(MemoryStore::with_clock("bucket", 1_000));
        store.insert_version("photos/a.jpg", VersionAction::Upload, 100, b"1".to_vec()).await;
        store.insert_version("photos/a.jpg", VersionAction::Upload, 200, b"22".to_vec()).await;
        store.insert_version("photos/b/c.jpg", VersionAction::Upload, 300, b"3".to_vec()).await;
        store.insert_version("photos/b/c.jpg", VersionAction::Hide, 400, Vec::new()).await;
        store.insert_version("other/x.jpg", VersionAction::Upload, 500, b"x".to_vec()).await;

        let folder = RemoteFolder::new("bucket", "photos", store);
        let files = collect(&folder).await;

        assert_eq!(names(&files), vec!["a.jpg", "b/c.jpg"]);
        let mod_times: Vec<_> = files[0].versions().iter().map(|v| v.mod_time).collect();
        assert_eq!(mod_times, vec![200, 100]);
        assert_eq!(files[1].latest_version().action, VersionAction::Hide);
    }

    #[test]
    fn test_remote_has_no_local_path() {
        let folder = RemoteFolder::new("bucket", "", Arc::new(MemoryStore::new("bucket")));
        let err = folder.make_full_path("a.txt").unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedOperation(_)));
        assert_eq!(folder.prefix(), "");
    }
}
