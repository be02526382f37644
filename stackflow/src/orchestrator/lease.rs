//! Stack leases: at most one active run per overlapping stack set.
//!
//! A run leases every stack it will apply before the first driver call.
//! Acquisition is all-or-nothing and the returned [`LeaseGuard`] releases the
//! leases when dropped, including on error paths.

use crate::errors::{ConcurrentDeploymentError, StackflowError};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Who holds a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Run holding the lease.
    pub run_id: Uuid,
    /// Process id of the holder.
    pub pid: u32,
    /// When the lease was taken.
    pub acquired_at: DateTime<Utc>,
}

impl LeaseInfo {
    /// Creates lease info for `run_id` in the current process.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Backend holding stack leases.
pub trait LeaseStore: Send + Sync + Debug {
    /// Leases every stack for `run_id`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::ConcurrentDeployment`] if any stack is held.
    fn acquire(&self, run_id: Uuid, stacks: &[String]) -> Result<(), StackflowError>;

    /// Releases the stacks held by `run_id`. Leases held by other runs are kept.
    fn release(&self, run_id: Uuid, stacks: &[String]);

    /// Returns the current holder of a stack's lease.
    fn holder(&self, stack: &str) -> Option<LeaseInfo>;

    /// Removes a lease whoever holds it. Returns true if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease could not be removed.
    fn force_release(&self, stack: &str) -> Result<bool, StackflowError>;
}

fn conflict(conflicting: Vec<String>, holder: Option<&LeaseInfo>) -> StackflowError {
    warn!(stacks = ?conflicting, holder = ?holder.map(|h| h.run_id), "Lease conflict");
    ConcurrentDeploymentError::new(conflicting, holder.map(|h| h.run_id.to_string())).into()
}

/// Leases held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<String, LeaseInfo>,
}

impl InMemoryLeaseStore {
    /// Creates an empty lease store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn acquire(&self, run_id: Uuid, stacks: &[String]) -> Result<(), StackflowError> {
        let mut acquired = Vec::new();
        let mut conflicting = Vec::new();
        let mut holder = None;

        for stack in stacks {
            match self.leases.entry(stack.clone()) {
                Entry::Occupied(existing) => {
                    holder.get_or_insert_with(|| existing.get().clone());
                    conflicting.push(stack.clone());
                }
                Entry::Vacant(slot) => {
                    slot.insert(LeaseInfo::new(run_id));
                    acquired.push(stack.clone());
                }
            }
        }

        if conflicting.is_empty() {
            Ok(())
        } else {
            self.release(run_id, &acquired);
            Err(conflict(conflicting, holder.as_ref()))
        }
    }

    fn release(&self, run_id: Uuid, stacks: &[String]) {
        for stack in stacks {
            self.leases.remove_if(stack, |_, info| info.run_id == run_id);
        }
    }

    fn holder(&self, stack: &str) -> Option<LeaseInfo> {
        self.leases.get(stack).map(|info| info.clone())
    }

    fn force_release(&self, stack: &str) -> Result<bool, StackflowError> {
        Ok(self.leases.remove(stack).is_some())
    }
}

/// One lease file per stack under a directory.
///
/// Files are created with exclusive create, so two processes sharing the
/// directory cannot both hold a stack.
#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    dir: PathBuf,
}

impl FileLeaseStore {
    /// Creates a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StackflowError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the lease directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, stack: &str) -> PathBuf {
        self.dir.join(format!("{stack}.lease"))
    }

    fn try_create(&self, stack: &str, info: &LeaseInfo) -> std::io::Result<bool> {
        let body = serde_json::to_vec_pretty(info).map_err(std::io::Error::other)?;
        self.create_with(stack, |file| {
            file.write_all(&body)?;
            file.sync_all()
        })
    }

    /// Exclusively creates the lease file and fills it. A file that could not
    /// be filled is removed again so it never blocks the stack.
    fn create_with(&self, stack: &str, fill: impl FnOnce(&mut File) -> std::io::Result<()>) -> std::io::Result<bool> {
        let path = self.path_for(stack);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e),
        };

        if let Err(e) = fill(&mut file) {
            drop(file);
            if let Err(cleanup) = std::fs::remove_file(&path) {
                warn!(stack = %stack, error = %cleanup, "Failed to remove partial lease file");
            }
            return Err(e);
        }
        Ok(true)
    }
}

impl LeaseStore for FileLeaseStore {
    fn acquire(&self, run_id: Uuid, stacks: &[String]) -> Result<(), StackflowError> {
        let info = LeaseInfo::new(run_id);
        let mut acquired = Vec::new();
        let mut conflicting = Vec::new();

        for stack in stacks {
            match self.try_create(stack, &info) {
                Ok(true) => acquired.push(stack.clone()),
                Ok(false) => conflicting.push(stack.clone()),
                Err(e) => {
                    self.release(run_id, &acquired);
                    return Err(e.into());
                }
            }
        }

        if conflicting.is_empty() {
            debug!(run_id = %run_id, stacks = ?acquired, "Acquired stack leases");
            Ok(())
        } else {
            self.release(run_id, &acquired);
            let holder = self.holder(&conflicting[0]);
            Err(conflict(conflicting, holder.as_ref()))
        }
    }

    fn release(&self, run_id: Uuid, stacks: &[String]) {
        for stack in stacks {
            if self.holder(stack).is_some_and(|h| h.run_id == run_id) {
                if let Err(e) = std::fs::remove_file(self.path_for(stack)) {
                    warn!(stack = %stack, error = %e, "Failed to remove lease file");
                }
            }
        }
    }

    fn holder(&self, stack: &str) -> Option<LeaseInfo> {
        let bytes = std::fs::read(self.path_for(stack)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn force_release(&self, stack: &str) -> Result<bool, StackflowError> {
        match std::fs::remove_file(self.path_for(stack)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Leases held by one run; released on drop.
#[derive(Debug)]
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    run_id: Uuid,
    stacks: Vec<String>,
}

impl LeaseGuard {
    /// Acquires leases on `stacks` for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::ConcurrentDeployment`] if any stack is held.
    pub fn acquire(store: Arc<dyn LeaseStore>, run_id: Uuid, stacks: Vec<String>) -> Result<Self, StackflowError> {
        store.acquire(run_id, &stacks)?;
        Ok(Self { store, run_id, stacks })
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.store.release(self.run_id, &self.stacks);
    }
}
