use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::error::CredentialStoreError;
use crate::schema::{CredentialRecord, CREDENTIAL_RECORD_VERSION};

/// Holds at most one credential. Setting overwrites; clearing empties.
///
/// The in-memory cell is the source of truth. When a [`FileBackend`] is
/// attached, every mutation is mirrored to disk on a best-effort basis.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: Mutex<Option<Credential>>,
    backend: Option<FileBackend>,
}

impl CredentialStore {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a file-backed store, loading any credential already persisted at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialStoreError> {
        let backend = FileBackend::new(path);
        let current = backend.load()?;
        debug!(
            path = %backend.path().display(),
            loaded = current.is_some(),
            "opened credential store"
        );

        Ok(Self {
            current: Mutex::new(current),
            backend: Some(backend),
        })
    }

    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        lock_unpoisoned(&self.current).clone()
    }

    /// The backend write happens under the cell lock so the file always
    /// matches the last mutation to win.
    pub fn set(&self, credential: Credential) {
        let mut current = lock_unpoisoned(&self.current);
        if let Some(backend) = &self.backend {
            if let Err(error) = backend.save(&credential) {
                warn!(%error, "failed to persist credential");
            }
        }
        *current = Some(credential);
    }

    pub fn clear(&self) {
        let mut current = lock_unpoisoned(&self.current);
        if let Some(backend) = &self.backend {
            if let Err(error) = backend.remove() {
                warn!(%error, "failed to remove persisted credential");
            }
        }
        *current = None;
    }

    /// Empties the in-memory cell without touching the backend.
    pub fn reset(&self) {
        *lock_unpoisoned(&self.current) = None;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        lock_unpoisoned(&self.current).is_some()
    }

    #[must_use]
    pub fn backend(&self) -> Option<&FileBackend> {
        self.backend.as_ref()
    }
}

/// Single-record JSON file holding the persisted credential.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means nothing has been persisted yet.
    pub fn load(&self) -> Result<Option<Credential>, CredentialStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialStoreError::io(
                    "reading credential file",
                    &self.path,
                    source,
                ))
            }
        };

        let record = serde_json::from_str::<CredentialRecord>(&raw)
            .map_err(|source| CredentialStoreError::json_parse(&self.path, source))?;
        validate_record(&self.path, &record)?;

        Ok(Some(Credential::new(record.access_token)))
    }

    pub fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let saved_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(CredentialStoreError::ClockFormat)?;
        let record = CredentialRecord::v1(credential.as_str(), saved_at);
        let encoded = serde_json::to_vec(&record)
            .map_err(|source| CredentialStoreError::json_serialize(&self.path, source))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                CredentialStoreError::io("creating credential directory", parent, source)
            })?;
        }

        let staging = self.path.with_extension("json.tmp");
        let mut file = open_private(&staging).map_err(|source| {
            CredentialStoreError::io("creating credential staging file", &staging, source)
        })?;
        file.write_all(&encoded)
            .and_then(|()| file.sync_all())
            .map_err(|source| {
                CredentialStoreError::io("writing credential staging file", &staging, source)
            })?;
        fs::rename(&staging, &self.path).map_err(|source| {
            CredentialStoreError::io("replacing credential file", &self.path, source)
        })?;

        Ok(())
    }

    pub fn remove(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CredentialStoreError::io(
                "removing credential file",
                &self.path,
                source,
            )),
        }
    }
}

fn validate_record(path: &Path, record: &CredentialRecord) -> Result<(), CredentialStoreError> {
    if record.version != CREDENTIAL_RECORD_VERSION {
        return Err(CredentialStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: record.version,
        });
    }

    if record.access_token.trim().is_empty() {
        return Err(CredentialStoreError::EmptyToken {
            path: path.to_path_buf(),
        });
    }

    if OffsetDateTime::parse(&record.saved_at, &Rfc3339).is_err() {
        return Err(CredentialStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            field: "saved_at",
            value: record.saved_at.clone(),
        });
    }

    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
