//! Item-level I/O across any pair of backends.
//!
//! Local paths are handled with `tokio::fs` and the blocking pool; every other
//! backend goes through its registered [`RemoteTransport`]. Transfers between
//! two non-local backends are staged through an anonymous local temp file.

use std::fs;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use ferry_core::{Backend, Locator, TransferError};
use indexmap::IndexSet;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::transport::{RemoteTransport, TransportRegistry};

/// Size and type of an existing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub size: u64,
    pub is_dir: bool,
}

/// Byte progress callback; receives cumulative bytes for the current item.
pub type ByteProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

#[derive(Debug, Clone)]
pub struct Endpoints {
    registry: Arc<TransportRegistry>,
    chunk_size: usize,
}

impl Endpoints {
    pub fn new(registry: Arc<TransportRegistry>, chunk_size: usize) -> Self {
        Self {
            registry,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    fn transport(&self, locator: &Locator) -> Result<Arc<dyn RemoteTransport>, TransferError> {
        self.registry.transport(locator.backend())
    }

    /// Metadata for `locator`, or `None` if it does not exist.
    pub async fn stat(&self, locator: &Locator) -> Result<Option<EntryInfo>, TransferError> {
        match locator.to_path() {
            Some(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(Some(EntryInfo {
                    size: meta.len(),
                    is_dir: meta.is_dir(),
                })),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(TransferError::io(locator, err)),
            },
            None => {
                let transport = self.transport(locator)?;
                let _permit = self.registry.acquire(locator).await?;
                Ok(transport.stat(locator).await?.map(|entry| EntryInfo {
                    size: entry.size,
                    is_dir: entry.is_dir,
                }))
            }
        }
    }

    pub async fn exists(&self, locator: &Locator) -> Result<bool, TransferError> {
        Ok(self.stat(locator).await?.is_some())
    }

    /// Total bytes behind `sources`; unreadable items count as zero.
    pub async fn total_size(&self, sources: &[Locator]) -> u64 {
        let mut total = 0u64;
        for source in sources {
            match self.stat(source).await {
                Ok(Some(info)) if info.is_dir => {
                    if let Some(path) = source.to_path() {
                        total += tokio::task::spawn_blocking(move || dir_size(&path))
                            .await
                            .unwrap_or(0);
                    }
                }
                Ok(Some(info)) => total += info.size,
                _ => {}
            }
        }
        total
    }

    /// Make sure a local destination directory exists.
    pub async fn prepare_directory(&self, destination: &Locator) -> Result<(), TransferError> {
        if let Some(path) = destination.to_path() {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| TransferError::io(destination, e))?;
        }
        Ok(())
    }

    /// Authorize every non-local source backend with the stored credentials.
    pub async fn authorize(
        &self,
        sources: &[Locator],
        credentials_id: &str,
    ) -> Result<(), TransferError> {
        let backends: IndexSet<Backend> = sources
            .iter()
            .map(Locator::backend)
            .filter(|backend| *backend != Backend::Local)
            .collect();
        let Some(first) = backends.first() else {
            return Ok(());
        };

        let credentials = self.registry.credentials(credentials_id).ok_or_else(|| {
            TransferError::AuthenticationRequired {
                provider: first.to_string(),
                message: format!("no stored credentials for '{}'", credentials_id),
            }
        })?;
        for backend in backends {
            self.registry
                .transport(backend)?
                .authorize(&credentials)
                .await?;
        }
        Ok(())
    }

    /// Copy one item to `target`, returning the bytes moved.
    ///
    /// With `overwrite` false the target is created exclusively, so an
    /// existing target is never written to.
    pub async fn copy(
        &self,
        source: &Locator,
        target: &Locator,
        overwrite: bool,
        progress: ByteProgress<'_>,
    ) -> Result<u64, TransferError> {
        match (source.to_path(), target.to_path()) {
            (Some(from), Some(to)) => {
                self.copy_local(source, &from, target, &to, overwrite, progress)
                    .await
            }
            (Some(from), None) => self.upload_local(source, &from, target, progress).await,
            (None, Some(to)) => self.download_local(source, target, &to, overwrite, progress).await,
            (None, None) => self.copy_staged(source, target, progress).await,
        }
    }

    async fn copy_local(
        &self,
        source: &Locator,
        from: &Path,
        target: &Locator,
        to: &Path,
        overwrite: bool,
        progress: ByteProgress<'_>,
    ) -> Result<u64, TransferError> {
        let meta = tokio::fs::metadata(from)
            .await
            .map_err(|e| TransferError::io(source, e))?;

        if meta.is_dir() {
            let (from, to) = (from.to_path_buf(), to.to_path_buf());
            let bytes = tokio::task::spawn_blocking(move || {
                if overwrite && to.exists() {
                    remove_path(&to)?;
                } else if to.exists() {
                    return Err(TransferError::already_exists(to.display()));
                }
                copy_dir_recursive(&from, &to)
            })
            .await
            .map_err(|e| TransferError::other(format!("Task failed: {}", e)))??;
            progress(bytes);
            return Ok(bytes);
        }

        let mut reader = tokio::fs::File::open(from)
            .await
            .map_err(|e| TransferError::io(source, e))?;
        let mut writer = open_target(to, overwrite)
            .await
            .map_err(|e| TransferError::io(target, e))?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut copied = 0u64;
        let result: Result<(), std::io::Error> = async {
            loop {
                let read = reader.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                writer.write_all(&buffer[..read]).await?;
                copied += read as u64;
                progress(copied);
            }
            writer.flush().await
        }
        .await;

        if let Err(err) = result {
            drop(writer);
            let _ = tokio::fs::remove_file(to).await;
            return Err(TransferError::io(target, err));
        }
        Ok(copied)
    }

    async fn upload_local(
        &self,
        source: &Locator,
        from: &Path,
        target: &Locator,
        progress: ByteProgress<'_>,
    ) -> Result<u64, TransferError> {
        let transport = self.transport(target)?;
        let meta = tokio::fs::metadata(from)
            .await
            .map_err(|e| TransferError::io(source, e))?;
        if meta.is_dir() {
            return Err(TransferError::Unsupported {
                backend: target.backend(),
                operation: "Directory upload",
            });
        }

        let mut file = tokio::fs::File::open(from)
            .await
            .map_err(|e| TransferError::io(source, e))?;
        let _permit = self.registry.acquire(target).await?;
        transport
            .upload(target, &mut file, meta.len(), progress)
            .await?;
        Ok(meta.len())
    }

    async fn download_local(
        &self,
        source: &Locator,
        target: &Locator,
        to: &Path,
        overwrite: bool,
        progress: ByteProgress<'_>,
    ) -> Result<u64, TransferError> {
        let transport = self.transport(source)?;
        let mut file = open_target(to, overwrite)
            .await
            .map_err(|e| TransferError::io(target, e))?;

        let _permit = self.registry.acquire(source).await?;
        let result = async {
            let bytes = transport.download(source, &mut file, progress).await?;
            file.flush()
                .await
                .map_err(|e| TransferError::io(target, e))?;
            Ok::<u64, TransferError>(bytes)
        }
        .await;

        if result.is_err() {
            drop(file);
            let _ = tokio::fs::remove_file(to).await;
        }
        result
    }

    /// Download into a temp file, then upload from it.
    async fn copy_staged(
        &self,
        source: &Locator,
        target: &Locator,
        progress: ByteProgress<'_>,
    ) -> Result<u64, TransferError> {
        let from = self.transport(source)?;
        let to = self.transport(target)?;
        debug!(%source, %target, "staging transfer through a local temp file");

        let staged = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(|e| TransferError::other(format!("Task failed: {}", e)))?
            .map_err(|e| TransferError::io("staging file", e))?;
        let mut staged = tokio::fs::File::from_std(staged);

        // each phase covers half of the item so the figure never runs past its size
        let download_progress = |bytes: u64| progress(bytes / 2);
        let downloaded = {
            let _permit = self.registry.acquire(source).await?;
            from.download(source, &mut staged, &download_progress)
                .await?
        };
        staged
            .flush()
            .await
            .map_err(|e| TransferError::io("staging file", e))?;
        staged
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| TransferError::io("staging file", e))?;

        let upload_progress = |bytes: u64| progress(downloaded / 2 + bytes.min(downloaded) / 2);
        let _permit = self.registry.acquire(target).await?;
        to.upload(target, &mut staged, downloaded, &upload_progress)
            .await?;
        Ok(downloaded)
    }

    /// Remove one item.
    pub async fn remove(&self, locator: &Locator) -> Result<(), TransferError> {
        match locator.to_path() {
            Some(path) => tokio::task::spawn_blocking(move || remove_path(&path))
                .await
                .map_err(|e| TransferError::other(format!("Task failed: {}", e)))?,
            None => {
                let transport = self.transport(locator)?;
                let _permit = self.registry.acquire(locator).await?;
                transport.delete(locator).await
            }
        }
    }

    /// Rename within one backend.
    pub async fn rename(&self, from: &Locator, to: &Locator) -> Result<(), TransferError> {
        match (from.to_path(), to.to_path()) {
            (Some(src), Some(dst)) => tokio::fs::rename(&src, &dst)
                .await
                .map_err(|e| TransferError::io(from, e)),
            _ if from.backend() == to.backend() => {
                let transport = self.transport(from)?;
                let _permit = self.registry.acquire(from).await?;
                transport.rename(from, to).await
            }
            _ => Err(TransferError::Unsupported {
                backend: to.backend(),
                operation: "Rename across backends",
            }),
        }
    }
}

async fn open_target(path: &Path, overwrite: bool) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).await
}

/// Remove a file or a directory tree.
pub(crate) fn remove_path(path: &Path) -> Result<(), TransferError> {
    let meta = fs::symlink_metadata(path).map_err(|e| TransferError::io(path.display(), e))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| TransferError::io(path.display(), e))
}

/// Copy a file or directory tree, returning the bytes copied.
pub(crate) fn copy_path(source: &Path, dest: &Path) -> Result<u64, TransferError> {
    if source.is_dir() {
        copy_dir_recursive(source, dest)
    } else {
        fs::copy(source, dest).map_err(|e| TransferError::io(source.display(), e))
    }
}

/// Recursively copy a directory.
pub(crate) fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<u64, TransferError> {
    fs::create_dir_all(dest).map_err(|e| TransferError::io(dest.display(), e))?;

    let mut total_bytes = 0u64;
    let entries = fs::read_dir(source).map_err(|e| TransferError::io(source.display(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| TransferError::io(source.display(), e))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            total_bytes += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_bytes +=
                fs::copy(&path, &dest_path).map_err(|e| TransferError::io(path.display(), e))?;
        }
    }

    Ok(total_bytes)
}

/// Get the total size of a directory.
fn dir_size(dir: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }
    size
}
