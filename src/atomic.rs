//! 暂存写入与原子替换的辅助方法。

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::storage::StorageError;

/// 暂存文件名前缀，后台清理只处理带此前缀的文件。
pub const STAGING_PREFIX: &str = ".staged.";

/// A hidden staging file that is renamed over its destination once complete.
pub struct AtomicFile {
    temp_path: PathBuf,
    file: File,
    written: u64,
    limit: u64,
}

impl AtomicFile {
    /// 在暂存目录中创建临时文件；`limit` 为 0 表示不限制大小。
    pub async fn create_in(dir: &Path, limit: u64) -> Result<Self, StorageError> {
        let temp_path = dir.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            temp_path,
            file,
            written: 0,
            limit,
        })
    }

    /// 追加一段数据，超过上限时拒绝写入。
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let next = self.written.saturating_add(chunk.len() as u64);
        if self.limit > 0 && next > self.limit {
            return Err(StorageError::TooLarge(self.limit));
        }
        self.file.write_all(chunk).await?;
        self.written = next;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步数据并替换目标文件，返回写入字节数。
    pub async fn persist(self, target: &Path) -> Result<u64, StorageError> {
        let Self {
            temp_path,
            mut file,
            written,
            ..
        } = self;

        let flushed = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = flushed {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        if let Err(err) = replace(&temp_path, target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        if let Some(parent) = target.parent() {
            let _ = sync_dir(parent).await;
        }
        Ok(written)
    }
}

async fn replace(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        // The staging directory may sit on another filesystem.
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await
        }
        #[cfg(windows)]
        Err(_) => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        #[cfg(not(windows))]
        Err(err) => Err(err),
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn persist_replaces_existing_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("file.txt");
        std::fs::write(&target, b"old contents").expect("seed target");

        let mut atomic = AtomicFile::create_in(temp.path(), 0)
            .await
            .expect("create staging file");
        atomic.write_chunk(b"new").await.expect("write");
        let staged = atomic.temp_path().to_path_buf();
        let written = atomic.persist(&target).await.expect("persist");

        assert_eq!(written, 3);
        assert_eq!(std::fs::read(&target).expect("read"), b"new");
        assert!(!staged.exists(), "staging file should be renamed away");
    }

    #[tokio::test]
    async fn write_past_limit_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let mut atomic = AtomicFile::create_in(temp.path(), 4)
            .await
            .expect("create staging file");
        atomic.write_chunk(b"abcd").await.expect("within limit");

        let result = atomic.write_chunk(b"e").await;
        assert!(matches!(result, Err(StorageError::TooLarge(4))));
        assert_eq!(atomic.written(), 4);

        let staged = atomic.temp_path().to_path_buf();
        atomic.cleanup().await;
        assert!(!staged.exists());
    }
}
