//! Credential persistence.
//!
//! The engine never owns credentials; it reads and writes them through a
//! [`CredentialStore`]. [`MemoryCredentialStore`] suits hosts that persist
//! elsewhere and tests; [`FileCredentialStore`] keeps a JSON file on disk.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::account::CredentialBundle;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Where credential bundles are read from and written back to.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Returns the stored bundle for `account_id`, if any.
    fn get_credential<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Option<CredentialBundle>>>;

    /// Replaces the bundle for `account_id`.
    fn update_credential<'a>(
        &'a self,
        account_id: &'a str,
        bundle: CredentialBundle,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    bundles: RwLock<HashMap<String, CredentialBundle>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with bundles.
    pub fn with_bundles(
        bundles: impl IntoIterator<Item = (impl Into<String>, CredentialBundle)>,
    ) -> Self {
        Self {
            bundles: RwLock::new(bundles.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credential<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Option<CredentialBundle>>> {
        Box::pin(async move { Ok(self.bundles.read().await.get(account_id).cloned()) })
    }

    fn update_credential<'a>(
        &'a self,
        account_id: &'a str,
        bundle: CredentialBundle,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.bundles
                .write()
                .await
                .insert(account_id.to_string(), bundle);
            Ok(())
        })
    }
}

/// Credential store backed by a JSON file.
///
/// The whole map is rewritten on every update through a temporary file and
/// a rename. On Unix the file is readable by the owner only.
#[derive(Debug)]
pub struct FileCredentialStore {
    /// Path to the credentials file.
    path: PathBuf,

    /// In-memory copy of the file contents.
    bundles: RwLock<HashMap<String, CredentialBundle>>,
}

impl FileCredentialStore {
    /// Opens the store at `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        let bundles = load(&path)?;
        Ok(Self {
            path,
            bundles: RwLock::new(bundles),
        })
    }

    /// Returns the credentials file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load(path: &Path) -> ProviderResult<HashMap<String, CredentialBundle>> {
    if !path.exists() {
        debug!(path = %path.display(), "no credentials file");
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ProviderError::credential_store(format!("failed to read credentials file: {}", e))
            .with_source(e)
    })?;

    let bundles: HashMap<String, CredentialBundle> =
        serde_json::from_str(&content).map_err(|e| {
            ProviderError::credential_store(format!("failed to parse credentials file: {}", e))
                .with_source(e)
        })?;

    info!(path = %path.display(), count = bundles.len(), "loaded credentials");
    Ok(bundles)
}

fn save(path: &Path, bundles: &HashMap<String, CredentialBundle>) -> ProviderResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            ProviderError::credential_store(format!(
                "failed to create credentials directory: {}",
                e
            ))
        })?;
    }

    let temp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(bundles).map_err(|e| {
        ProviderError::credential_store(format!("failed to serialize credentials: {}", e))
    })?;

    fs::write(&temp_path, &content).map_err(|e| {
        ProviderError::credential_store(format!("failed to write credentials file: {}", e))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&temp_path, perms).map_err(|e| {
            ProviderError::credential_store(format!("failed to restrict credentials file: {}", e))
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        ProviderError::credential_store(format!("failed to rename credentials file: {}", e))
    })?;

    debug!(path = %path.display(), "saved credentials");
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get_credential<'a>(
        &'a self,
        account_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Option<CredentialBundle>>> {
        Box::pin(async move { Ok(self.bundles.read().await.get(account_id).cloned()) })
    }

    fn update_credential<'a>(
        &'a self,
        account_id: &'a str,
        bundle: CredentialBundle,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let mut bundles = self.bundles.write().await;
            let previous = bundles.insert(account_id.to_string(), bundle);
            if let Err(e) = save(&self.path, &bundles) {
                // Keep memory and disk in agreement.
                match previous {
                    Some(previous) => bundles.insert(account_id.to_string(), previous),
                    None => bundles.remove(account_id),
                };
                return Err(e);
            }
            Ok(())
        })
    }
}
