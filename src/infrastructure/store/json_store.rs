use crate::domain::{Credential, CredentialStore, Registry, StoreError};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Creates a JSON file-backed credential store at `path`.
pub fn create_json_store(path: impl Into<PathBuf>) -> JsonFileStore {
    // ---
    JsonFileStore::new(path)
}

/// Registry persisted as a pretty-printed JSON array (the `users.json` layout).
pub struct JsonFileStore {
    // ---
    path: PathBuf,
}

impl JsonFileStore {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(&self, bytes: &[u8]) -> Registry {
        // ---
        let values: Vec<serde_json::Value> = match serde_json::from_slice(bytes) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(
                    "{} is not a JSON array ({}); treating registry as empty",
                    self.path.display(),
                    err
                );
                return Registry::default();
            }
        };

        values
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match serde_json::from_value::<Credential>(value) {
                Ok(c) if !c.username.is_empty() => Some(c),
                Ok(_) => {
                    tracing::warn!("skipping entry {} without a username", idx);
                    None
                }
                Err(err) => {
                    tracing::warn!("skipping unreadable entry {}: {}", idx, err);
                    None
                }
            })
            .collect()
    }
}

/// Serialized form written to disk. Deterministic for a given registry.
pub(crate) fn encode(registry: &Registry) -> Result<Vec<u8>, serde_json::Error> {
    // ---
    let mut bytes = serde_json::to_vec_pretty(registry)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes `bytes` next to `path` and renames it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // ---
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait::async_trait]
impl CredentialStore for JsonFileStore {
    // ---
    async fn load(&self) -> Registry {
        // ---
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self.decode(&bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} does not exist yet", self.path.display());
                Registry::default()
            }
            Err(err) => {
                tracing::warn!(
                    "cannot read {} ({}); treating registry as empty",
                    self.path.display(),
                    err
                );
                Registry::default()
            }
        }
    }

    async fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        // ---
        let bytes = encode(registry)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await?
            .map_err(|source| StoreError::Write {
                path: self.path.display().to_string(),
                source,
            })?;

        tracing::debug!("saved {} credentials to {}", registry.len(), self.path.display());
        Ok(())
    }
}
