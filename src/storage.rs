use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::ErrorKind;
use tracing::{info, warn};

use crate::atomic::{AtomicFile, STAGING_PREFIX};
use crate::resolver::{self, ResolvedPath};

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    staging: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf, staging: PathBuf) -> Self {
        Self { root, staging }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        fs::create_dir_all(&self.staging).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Resolves an upload destination and checks that no existing component
    /// on the way is a symlink or a regular file.
    pub async fn resolve_destination(
        &self,
        relative_path: &str,
        filename: &str,
    ) -> Result<ResolvedPath, StorageError> {
        let resolved = resolver::resolve(&self.root, relative_path, filename)?;
        self.ensure_no_symlink_components(&resolved.absolute, true)
            .await?;
        Ok(resolved)
    }

    pub async fn resolve_path_checked(
        &self,
        key: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        let target = resolver::resolve_key(&self.root, key)?;
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    async fn ensure_no_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath("path escapes the upload root"))?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath("path crosses a symlink"));
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath("path crosses a regular file"));
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return if allow_missing_leaf {
                        Ok(())
                    } else {
                        Err(StorageError::NotFound)
                    };
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// 在暂存目录中开启一次写入。
    pub async fn begin_write(&self, limit: u64) -> Result<AtomicFile, StorageError> {
        AtomicFile::create_in(&self.staging, limit).await
    }

    /// 创建目标目录（含父级）并把暂存文件替换到目标位置。
    pub async fn commit(
        &self,
        staged: AtomicFile,
        target: &ResolvedPath,
    ) -> Result<u64, StorageError> {
        if let Some(parent) = target.absolute.parent()
            && let Err(err) = fs::create_dir_all(parent).await
        {
            staged.cleanup().await;
            return Err(err.into());
        }
        if fs::metadata(&target.absolute)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            staged.cleanup().await;
            return Err(StorageError::InvalidPath("destination is a directory"));
        }
        staged.persist(&target.absolute).await
    }

    /// 打开已存储的文件，目录或不存在的路径视为 NotFound。
    pub async fn open_stored(&self, key: &str) -> Result<(File, Metadata), StorageError> {
        let target = self.resolve_path_checked(key, false).await?;
        let metadata = match fs::metadata(&target).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(err) => return Err(err.into()),
        };
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        let file = File::open(&target).await?;
        Ok((file, metadata))
    }

    /// 清理超过 `ttl` 的遗留暂存文件，返回删除数量。
    pub async fn sweep_staging(&self, ttl: Duration) -> io::Result<usize> {
        if ttl.is_zero() {
            return Ok(0);
        }
        let mut dir = match fs::read_dir(&self.staging).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            if !entry
                .file_name()
                .to_string_lossy()
                .starts_with(STAGING_PREFIX)
            {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(age) = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
            else {
                continue;
            };
            if age < ttl {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = ?path, "removed stale staging file");
                    removed += 1;
                }
                Err(err) => warn!(path = ?path, error = %err, "failed to remove stale staging file"),
            }
        }

        Ok(removed)
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath(&'static str),
    TooLarge(u64),
    NotFound,
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidPath(reason) => write!(f, "invalid path: {reason}"),
            StorageError::TooLarge(limit) => write!(f, "file exceeds the {limit} byte limit"),
            StorageError::NotFound => f.write_str("file not found"),
            StorageError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
