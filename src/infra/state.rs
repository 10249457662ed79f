//! Infrastructure implementation of the `StateStore` port.
//!
//! `FileStateStore` keeps one JSON blob per aggregate under
//! `~/.cirrus/state/`, using `tokio::task::spawn_blocking` with atomic
//! writes (temp file + rename) to prevent state corruption.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::StateStore;

/// File-backed state store, one `<aggregate-id>.json` per aggregate.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store at the default location (`~/.cirrus/state`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_dir(home.join(".cirrus").join("state")))
    }

    /// Create a store at an explicit directory (used in tests).
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, aggregate_id: &str) -> PathBuf {
        self.dir.join(format!("{aggregate_id}.json"))
    }

    fn load_sync(&self, aggregate_id: &str) -> Result<Option<String>> {
        let path = self.path(aggregate_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        Ok(Some(content))
    }

    fn save_sync(&self, aggregate_id: &str, blob: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating directory {}", self.dir.display()))?;
        let path = self.path(aggregate_id);

        // Atomic write via temp file then rename.
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, blob)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }

    fn clear_sync(&self, aggregate_id: &str) -> Result<()> {
        let path = self.path(aggregate_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing state file {}", path.display()))?;
        }
        Ok(())
    }

    fn list_sync(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            if let Some(id) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl StateStore for FileStateStore {
    async fn load(&self, aggregate_id: &str) -> Result<Option<String>> {
        let dir = self.dir.clone();
        let aggregate_id = aggregate_id.to_string();
        tokio::task::spawn_blocking(move || FileStateStore::with_dir(dir).load_sync(&aggregate_id))
            .await
            .context("state load task panicked")?
    }

    async fn save(&self, aggregate_id: &str, blob: &str) -> Result<()> {
        let dir = self.dir.clone();
        let aggregate_id = aggregate_id.to_string();
        let blob = blob.to_string();
        tokio::task::spawn_blocking(move || {
            FileStateStore::with_dir(dir).save_sync(&aggregate_id, &blob)
        })
        .await
        .context("state save task panicked")?
    }

    async fn clear(&self, aggregate_id: &str) -> Result<()> {
        let dir = self.dir.clone();
        let aggregate_id = aggregate_id.to_string();
        tokio::task::spawn_blocking(move || FileStateStore::with_dir(dir).clear_sync(&aggregate_id))
            .await
            .context("state clear task panicked")?
    }

    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || FileStateStore::with_dir(dir).list_sync())
            .await
            .context("state list task panicked")?
    }
}
