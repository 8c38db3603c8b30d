//! Backend transports and the shared registry that owns them.
//!
//! The engine never speaks a wire protocol itself. SMB, SFTP, FTP, cloud and
//! scoped-storage clients plug in through [`RemoteTransport`] and are looked up
//! by backend in a [`TransportRegistry`] created by the composition root.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ferry_core::{Backend, ErrorKind, Locator, TransferError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A directory entry reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub locator: Locator,
    pub size: u64,
    pub is_dir: bool,
}

/// Credentials handed to a transport before it touches a protected source.
#[derive(Clone)]
pub struct Credentials {
    /// Provider label surfaced in authentication errors.
    pub provider: String,
    pub username: String,
    secret: String,
}

impl Credentials {
    pub fn new(
        provider: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Lookup of stored credentials by opaque identifier.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, id: &str) -> Option<Credentials>;
}

/// A credential store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    entries: DashMap<String, Credentials>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, credentials: Credentials) {
        self.entries.insert(id.into(), credentials);
    }
}

impl CredentialStore for InMemoryCredentials {
    fn lookup(&self, id: &str) -> Option<Credentials> {
        self.entries.get(id).map(|entry| entry.clone())
    }
}

/// Narrow I/O primitives a backend client must provide.
///
/// `progress` receives the cumulative number of bytes moved for the current
/// call. Implementations own their timeouts and report failures as
/// [`TransferError`]s; busy/locked conditions should map to
/// [`TransferError::TransientIo`] so deletes can retry them.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Write `size` bytes read from `source` to `destination`, replacing it.
    async fn upload(
        &self,
        destination: &Locator,
        source: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), TransferError>;

    /// Stream `source` into `destination`, returning the byte count.
    async fn download(
        &self,
        source: &Locator,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, TransferError>;

    async fn delete(&self, locator: &Locator) -> Result<(), TransferError>;

    async fn list(&self, directory: &Locator) -> Result<Vec<RemoteEntry>, TransferError>;

    /// Server-side rename within this backend.
    async fn rename(&self, from: &Locator, _to: &Locator) -> Result<(), TransferError> {
        Err(TransferError::Unsupported {
            backend: from.backend(),
            operation: "Rename",
        })
    }

    /// Look up one entry; the default scans the parent listing.
    async fn stat(&self, locator: &Locator) -> Result<Option<RemoteEntry>, TransferError> {
        let Some(parent) = locator.parent() else {
            return Ok(None);
        };
        let name = locator.file_name();
        match self.list(&parent).await {
            Ok(entries) => Ok(entries.into_iter().find(|entry| entry.name == name)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Apply credentials before accessing protected paths.
    async fn authorize(&self, _credentials: &Credentials) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Registry of transports plus per-host connection limits.
///
/// Shared by every handler; the composition root creates one and injects it.
pub struct TransportRegistry {
    transports: DashMap<Backend, Arc<dyn RemoteTransport>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    limits: DashMap<(Backend, String), Arc<Semaphore>>,
    max_per_host: usize,
}

impl TransportRegistry {
    /// Create an empty registry allowing `max_per_host` concurrent calls per host.
    pub fn new(max_per_host: usize) -> Self {
        Self {
            transports: DashMap::new(),
            credentials: None,
            limits: DashMap::new(),
            max_per_host: max_per_host.max(1),
        }
    }

    /// Attach a credential store.
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Register (or replace) the transport for a backend.
    pub fn register(&self, backend: Backend, transport: Arc<dyn RemoteTransport>) {
        self.transports.insert(backend, transport);
    }

    /// Transport for `backend`.
    pub fn transport(&self, backend: Backend) -> Result<Arc<dyn RemoteTransport>, TransferError> {
        self.transports
            .get(&backend)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransferError::NoTransport { backend })
    }

    /// Stored credentials for `id`.
    pub fn credentials(&self, id: &str) -> Option<Credentials> {
        self.credentials.as_ref().and_then(|store| store.lookup(id))
    }

    /// Wait for a connection slot on the host owning `locator`.
    pub async fn acquire(&self, locator: &Locator) -> Result<OwnedSemaphorePermit, TransferError> {
        let key = (locator.backend(), host_key(locator).to_string());
        let semaphore = self
            .limits
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|_| TransferError::other("connection pool closed"))
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new(4)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backends: Vec<Backend> = self.transports.iter().map(|entry| *entry.key()).collect();
        f.debug_struct("TransportRegistry")
            .field("backends", &backends)
            .field("hosts", &self.limits.len())
            .field("max_per_host", &self.max_per_host)
            .finish()
    }
}

/// Authority part of a locator (`user@host:port` in `smb://user@host:port/share`).
fn host_key(locator: &Locator) -> &str {
    let raw = locator.as_str();
    let body = raw.find("://").map(|i| &raw[i + 3..]).unwrap_or(raw);
    body.split('/').next().unwrap_or_default()
}
