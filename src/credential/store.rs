//! Credential persistence
//!
//! The credential is kept as the raw token text in a single file. The
//! file's modification time is the only record of when the token was
//! issued, so [`StoredCredential::age_days`] is derived from it.
//!
//! The bytes are stored and returned as is. Loading never fails: an
//! absent, unreadable or empty file is "no credential".
//! Saving writes a sibling temporary file and renames it over the target,
//! so readers see either the old token or the new one.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::credential::Credential;
use crate::error::Result;

/// Default credential file name inside the state directory.
pub const DEFAULT_FILE_NAME: &str = "tesla_bearer_token";

// ---------------------------------------------------------------------------
// StoredCredential
// ---------------------------------------------------------------------------

/// Result of loading the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredential {
    /// The token, empty when nothing usable was found.
    pub credential: Credential,
    /// Whole days since the credential was written, 0 when absent.
    pub age_days: i64,
    /// When the credential was written, if known.
    pub modified: Option<DateTime<Utc>>,
}

impl StoredCredential {
    /// A load result that carries no credential.
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Persistence seam for the credential.
pub trait CredentialStore: Send + Sync {
    /// Reads the stored credential. Never fails.
    fn load(&self) -> StoredCredential;

    /// Durably replaces the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential could not be written; the
    /// previous credential is left in place.
    fn save(&self, credential: &Credential) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// File-backed [`CredentialStore`].
///
/// # Examples
///
/// ```
/// use powerwall::credential::{Credential, CredentialStore, FileCredentialStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileCredentialStore::in_dir(dir.path());
/// assert!(store.load().credential.is_empty());
///
/// store.save(&Credential::new("token")).unwrap();
/// let loaded = store.load();
/// assert_eq!(loaded.credential.as_str(), "token");
/// assert_eq!(loaded.age_days, 0);
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store for an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store for [`DEFAULT_FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_FILE_NAME))
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> StoredCredential {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!("No credential loaded from {}: {}", self.path.display(), e);
                return StoredCredential::absent();
            }
        };

        if contents.is_empty() {
            return StoredCredential::absent();
        }

        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        let age_days = modified.map(age_in_days).unwrap_or(0);

        StoredCredential {
            credential: Credential::new(contents),
            age_days,
            modified,
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(dir)?;

        // Created 0600 and removed on drop unless persisted.
        let mut tmp = tempfile::Builder::new()
            .prefix(".tesla_bearer_token")
            .suffix(".new")
            .tempfile_in(dir)?;
        tmp.write_all(credential.as_str().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!("Saved credential to {}", self.path.display());
        Ok(())
    }
}

/// Whole days elapsed since `modified`, truncated and never negative.
fn age_in_days(modified: DateTime<Utc>) -> i64 {
    let now = DateTime::<Utc>::from(SystemTime::now());
    (now - modified).num_days().max(0)
}
