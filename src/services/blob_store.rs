use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

/// Bytes written to the staging area but not yet visible under their stored name.
#[derive(Debug)]
pub struct StagedBlob {
    pub path: PathBuf,
    pub size: i64,
}

pub struct BlobReader {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `reader` into a fresh staging file and report its byte length.
    async fn stage<'a>(&self, reader: Box<dyn AsyncRead + Unpin + Send + 'a>)
    -> Result<StagedBlob>;
    /// Atomically move a staged blob under `stored_name`. Never overwrites.
    async fn publish(&self, staged: &StagedBlob, stored_name: &str) -> Result<()>;
    async fn discard(&self, staged: StagedBlob) -> Result<()>;
    async fn exists(&self, stored_name: &str) -> Result<bool>;
    async fn open(&self, stored_name: &str) -> Result<BlobReader>;
    async fn remove(&self, stored_name: &str) -> Result<()>;
    /// Delete everything left in the staging area. Returns the number of files removed.
    async fn sweep_staging(&self) -> Result<usize>;
}

pub struct LocalBlobStore {
    root: PathBuf,
    staging: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, staging: PathBuf) -> Self {
        Self { root, staging }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::create_dir_all(&self.staging).await?;
        Ok(())
    }

    /// Resolve a stored name to its path, refusing anything that is not a
    /// single plain file name inside the blob directory.
    fn blob_path(&self, stored_name: &str) -> Result<PathBuf> {
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !stored_name.contains('\\') => {
                Ok(self.root.join(stored_name))
            }
            _ => Err(anyhow!("Invalid blob key: {:?}", stored_name)),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn stage<'a>(
        &self,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedBlob> {
        let path = self.staging.join(format!("{}.part", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&path).await?;

        let written = async {
            let n = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(n)
        }
        .await;

        match written {
            Ok(n) => Ok(StagedBlob {
                path,
                size: n as i64,
            }),
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    async fn publish(&self, staged: &StagedBlob, stored_name: &str) -> Result<()> {
        let dest = self.blob_path(stored_name)?;
        // A hard link fails on an existing target, unlike rename
        match tokio::fs::hard_link(&staged.path, &dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(anyhow!("Blob key already taken: {}", stored_name));
            }
            Err(e) => return Err(e.into()),
        }
        // Published either way; a stray staged copy is swept at next startup
        if let Err(e) = tokio::fs::remove_file(&staged.path).await {
            tracing::warn!("Published {} but kept staged copy: {}", stored_name, e);
        }
        Ok(())
    }

    async fn discard(&self, staged: StagedBlob) -> Result<()> {
        match tokio::fs::remove_file(&staged.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, stored_name: &str) -> Result<bool> {
        let path = match self.blob_path(stored_name) {
            Ok(p) => p,
            Err(_) => return Ok(false),
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, stored_name: &str) -> Result<BlobReader> {
        let path = self.blob_path(stored_name)?;
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        Ok(BlobReader {
            reader: Box::new(file),
            size,
        })
    }

    async fn remove(&self, stored_name: &str) -> Result<()> {
        let path = self.blob_path(stored_name)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    async fn sweep_staging(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        "Failed to remove staged file {}: {}",
                        entry.path().display(),
                        e
                    ),
                }
            }
        }
        Ok(removed)
    }
}
