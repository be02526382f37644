//! JSON file backed output registry.
//!
//! The whole history is rewritten on every commit: serialized to a uniquely
//! named temporary file, fsynced, then renamed over the registry file. A crash
//! leaves either the previous or the new file, never a torn one.
//!
//! Commits hold an exclusive lock on a sidecar `.lock` file and re-read the
//! registry under it, so several processes deploying disjoint stacks can share
//! one registry without losing each other's writes. Reads refresh from disk.

use super::state::{OutputSnapshot, RegistryState};
use super::OutputRegistry;
use crate::core::OutputRecord;
use crate::errors::StackflowError;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    format_version: u32,
    records: Vec<OutputRecord>,
}

/// Output registry persisted to a JSON file.
#[derive(Debug)]
pub struct FileOutputRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl FileOutputRegistry {
    /// Opens the registry at `path`, loading existing records.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StackflowError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let state = load_state(&path).await?;

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Returns the registry file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads the cached state from disk. A file that cannot be read keeps
    /// the last good state.
    async fn current(&self) -> MutexGuard<'_, RegistryState> {
        let mut state = self.state.lock().await;
        match load_state(&self.path).await {
            Ok(fresh) => *state = fresh,
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to refresh output registry, serving cached state"
            ),
        }
        state
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("json.lock")
}

fn parse_document(path: &Path, bytes: &[u8]) -> Result<RegistryState, StackflowError> {
    let doc: RegistryDocument = serde_json::from_slice(bytes)?;
    if doc.format_version != FORMAT_VERSION {
        return Err(StackflowError::Serialization(format!(
            "unsupported registry format version {} in {}",
            doc.format_version,
            path.display()
        )));
    }
    Ok(RegistryState::from_records(doc.records))
}

async fn load_state(path: &Path) -> Result<RegistryState, StackflowError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => parse_document(path, &bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryState::default()),
        Err(e) => Err(e.into()),
    }
}

/// Appends one commit under the registry lock and returns the new state.
fn commit(
    path: &Path,
    stack: &str,
    outputs: &BTreeMap<String, String>,
    run_id: Option<Uuid>,
) -> Result<(RegistryState, BTreeMap<String, u64>), StackflowError> {
    let lock = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    lock.lock_exclusive()?;

    let mut state = match std::fs::read(path) {
        Ok(bytes) => parse_document(path, &bytes)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
        Err(e) => return Err(e.into()),
    };
    let versions = state.append(stack, outputs, run_id)?;

    let doc = RegistryDocument {
        format_version: FORMAT_VERSION,
        records: state.all_records(),
    };
    let bytes = serde_json::to_vec_pretty(&doc)?;

    let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    Ok((state, versions))
}

#[async_trait]
impl OutputRegistry for FileOutputRegistry {
    async fn put_all(
        &self,
        stack: &str,
        outputs: &BTreeMap<String, String>,
        run_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, StackflowError> {
        let mut state = self.state.lock().await;

        let path = self.path.clone();
        let owned_stack = stack.to_string();
        let owned_outputs = outputs.clone();
        let (next, versions) =
            tokio::task::spawn_blocking(move || commit(&path, &owned_stack, &owned_outputs, run_id))
                .await
                .map_err(|e| StackflowError::Internal(format!("registry commit task failed: {e}")))??;
        *state = next;

        debug!(stack = %stack, keys = outputs.len(), "Persisted stack outputs");
        Ok(versions)
    }

    async fn record(&self, stack: &str, key: &str) -> Option<OutputRecord> {
        self.current().await.latest(stack, key).cloned()
    }

    async fn history(&self, stack: &str, key: &str) -> Vec<OutputRecord> {
        self.current().await.history(stack, key)
    }

    async fn outputs_of(&self, stack: &str) -> Vec<OutputRecord> {
        self.current().await.outputs_of(stack)
    }

    async fn snapshot(&self) -> OutputSnapshot {
        self.current().await.snapshot()
    }
}
