use super::{
    RemoteStore, RemoteVersionInfo, VersionStream, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
    SRC_MODIFIED_MILLIS,
};
use crate::core::file::VersionAction;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use opendal::{layers::TimeoutLayer, ErrorKind, Metakey, Operator};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// 合成隐藏标记使用的版本 ID
///
/// opendal 的版本列表不返回 S3 删除标记，隐藏状态通过不带版本号的 stat 推断。
pub const DELETE_MARKER_ID: &str = "delete-marker";

/// 基于 opendal 的 S3 兼容存储（需要开启版本控制的桶）
pub struct S3Store {
    operator: Operator,
    name: String,
}

impl S3Store {
    pub fn new(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<String>,
    ) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key)
            .enable_versioning(true);

        if let Some(ref ep) = endpoint {
            builder = builder.endpoint(ep);
        }

        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(Self {
            operator,
            name: format!("s3://{}", bucket),
        })
    }

    /// 对象没有版本 ID 时用对象名代替
    fn version_or_name(version: Option<&str>, name: &str) -> String {
        version.map_or_else(|| name.to_string(), str::to_string)
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list_versions(&self, prefix: &str) -> Result<VersionStream> {
        let lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .version(true)
            .metakey(
                Metakey::ContentLength | Metakey::LastModified | Metakey::Mode | Metakey::Version,
            )
            .await?;

        let operator = self.operator.clone();
        let stream = lister
            .map_err(SyncError::from)
            .try_filter(|entry| futures::future::ready(!entry.metadata().is_dir()))
            .and_then(move |entry| {
                let operator = operator.clone();
                async move {
                    let path = entry.path().trim_start_matches('/').to_string();
                    let meta = entry.metadata();
                    let id = Self::version_or_name(meta.version(), &path);

                    // 列表接口不返回自定义元数据，需要逐个 stat
                    let mut stat = operator.stat_with(&path);
                    if let Some(version) = meta.version() {
                        stat = stat.version(version);
                    }
                    let file_info = stat
                        .await?
                        .user_metadata()
                        .cloned()
                        .unwrap_or_default();

                    Ok::<_, SyncError>(RemoteVersionInfo {
                        id,
                        name: path,
                        action: VersionAction::Upload,
                        upload_timestamp: meta.last_modified().map_or(0, |t| t.timestamp_millis()),
                        size: meta.content_length(),
                        file_info,
                    })
                }
            });

        let operator = self.operator.clone();
        Ok(mark_hidden(stream.boxed(), move |name| {
            let operator = operator.clone();
            async move {
                match operator.stat(&name).await {
                    Ok(_) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        }))
    }

    async fn upload(&self, name: &str, data: Vec<u8>, mod_time: i64) -> Result<RemoteVersionInfo> {
        let size = data.len() as u64;
        let file_info = HashMap::from([(SRC_MODIFIED_MILLIS.to_string(), mod_time.to_string())]);

        self.operator
            .write_with(name, data)
            .user_metadata(file_info.clone())
            .await?;

        let meta = self.operator.stat(name).await?;
        Ok(RemoteVersionInfo {
            id: Self::version_or_name(meta.version(), name),
            name: name.to_string(),
            action: VersionAction::Upload,
            upload_timestamp: meta.last_modified().map_or(0, |t| t.timestamp_millis()),
            size,
            file_info,
        })
    }

    async fn download(&self, name: &str, version_id: &str) -> Result<Vec<u8>> {
        let data = if version_id == name {
            self.operator.read(name).await?
        } else {
            self.operator.read_with(name).version(version_id).await?
        };
        Ok(data.to_vec())
    }

    async fn hide(&self, name: &str) -> Result<()> {
        // 版本桶上不带版本号的删除只会追加删除标记
        self.operator.delete(name).await?;
        Ok(())
    }

    async fn delete_version(&self, name: &str, version_id: &str) -> Result<()> {
        if version_id == DELETE_MARKER_ID {
            // 新版本上传后删除标记已不是当前版本，列表中也不会再出现
            debug!("跳过合成的隐藏标记: {}", name);
            return Ok(());
        }
        if version_id == name {
            self.operator.delete(name).await?;
        } else {
            self.operator.delete_with(name).version(version_id).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 对当前版本不可见的对象，在其版本列表最前面补一个隐藏标记
///
/// `is_live` 判断对象名当前是否可见（不带版本号的 stat）。
fn mark_hidden<F, Fut>(versions: VersionStream, is_live: F) -> VersionStream
where
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    futures::stream::unfold(
        (versions, None::<RemoteVersionInfo>, false, is_live),
        |(mut inner, mut pending, finished, is_live)| async move {
            if finished {
                return None;
            }
            let first = match pending.take() {
                Some(v) => v,
                None => match inner.next().await? {
                    Ok(v) => v,
                    Err(e) => return Some((Err(e), (inner, None, true, is_live))),
                },
            };

            let mut group = vec![first];
            loop {
                match inner.next().await {
                    None => break,
                    Some(Err(e)) => return Some((Err(e), (inner, None, true, is_live))),
                    Some(Ok(v)) if v.name == group[0].name => group.push(v),
                    Some(Ok(v)) => {
                        pending = Some(v);
                        break;
                    }
                }
            }

            match is_live(group[0].name.clone()).await {
                Ok(true) => {}
                Ok(false) => {
                    let hidden_at = group.iter().map(|v| v.upload_timestamp).max().unwrap_or(0);
                    let marker = RemoteVersionInfo {
                        id: DELETE_MARKER_ID.to_string(),
                        name: group[0].name.clone(),
                        action: VersionAction::Hide,
                        upload_timestamp: hidden_at,
                        size: 0,
                        file_info: HashMap::new(),
                    };
                    group.insert(0, marker);
                }
                Err(e) => return Some((Err(e), (inner, None, true, is_live))),
            }

            Some((Ok(group), (inner, pending, false, is_live)))
        },
    )
    .map_ok(|group| futures::stream::iter(group.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
