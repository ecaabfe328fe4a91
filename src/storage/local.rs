//! 本地文件操作（下载落盘、读取上传内容、本地删除）

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

/// 文件修改时间（毫秒，四舍五入）
pub fn modified_millis(metadata: &std::fs::Metadata) -> io::Result<i64> {
    let nanos = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    Ok(((nanos + 500_000) / 1_000_000) as i64)
}

fn millis_to_system_time(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

/// 临时文件与目标文件同目录，保证重命名是原子的
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bucketsync.tmp");
    path.with_file_name(name)
}

/// 读取整个本地文件
pub async fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path).await
}

/// 写入本地文件并设置修改时间
///
/// 先写临时文件再重命名，避免中途失败留下半个文件。
pub async fn write_file(path: &Path, data: Vec<u8>, mod_time: i64) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, data).await?;

    let file = fs::OpenOptions::new().write(true).open(&temp_path).await?;
    let std_file = file.into_std().await;
    let mtime = millis_to_system_time(mod_time);
    tokio::task::spawn_blocking(move || std_file.set_modified(mtime))
        .await
        .map_err(io::Error::other)??;

    fs::rename(&temp_path, path).await
}

/// 删除本地文件，文件已不存在时视为成功
pub async fn delete_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
