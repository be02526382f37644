//! Run archive: one JSON document per finished run.

use super::DeploymentRun;
use crate::errors::StackflowError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Archives finished runs under a directory as `<run_id>.json`.
#[derive(Debug, Clone)]
pub struct RunJournal {
    dir: PathBuf,
}

impl RunJournal {
    /// Creates a journal writing to `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the archive directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Writes a run to the archive and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn archive(&self, run: &DeploymentRun) -> Result<PathBuf, StackflowError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(run.run_id);
        let tmp = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&serde_json::to_vec_pretty(run)?).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        Ok(path)
    }

    /// Loads an archived run.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not archived or cannot be parsed.
    pub async fn load(&self, run_id: Uuid) -> Result<DeploymentRun, StackflowError> {
        let bytes = tokio::fs::read(self.path_for(run_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Lists archived run ids, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn list(&self) -> Result<Vec<Uuid>, StackflowError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        // v7 ids sort by creation time
        ids.sort();
        Ok(ids)
    }

    /// Loads the most recent archived run, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    pub async fn latest(&self) -> Result<Option<DeploymentRun>, StackflowError> {
        match self.list().await?.last() {
            Some(id) => Ok(Some(self.load(*id).await?)),
            None => Ok(None),
        }
    }
}
