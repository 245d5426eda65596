//! Engine Checkpointing
//!
//! Two independent JSON files per engine name: the session snapshot
//! (`<name>.json`) and the value-network weights (`<name>_network.json`).
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written checkpoint behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{GemError, Result};
use crate::rl::core::TradeOutcome;
use crate::rl::networks::QNetwork;

/// Durable part of an engine session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default)]
    pub performance_history: Vec<TradeOutcome>,
    #[serde(default)]
    pub learning_episode_count: u64,
    pub epsilon: f64,
    pub environment_balance: f64,
    pub saved_at: DateTime<Utc>,
}

/// Checkpointer for one engine name inside a directory
#[derive(Debug, Clone)]
pub struct Checkpointer {
    /// Directory for checkpoints
    dir: PathBuf,
    name: String,
}

impl Checkpointer {
    pub fn new<P: AsRef<Path>>(dir: P, name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.into(),
        }
    }

    /// Same engine name in another directory
    pub fn relocated<P: AsRef<Path>>(&self, dir: P) -> Self {
        Self::new(dir, self.name.clone())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    pub fn network_path(&self) -> PathBuf {
        self.dir.join(format!("{}_network.json", self.name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<PathBuf> {
        let path = self.snapshot_path();
        write_atomic(&path, &serde_json::to_vec_pretty(snapshot)?)?;
        info!(path = %path.display(), trades = snapshot.performance_history.len(), "saved engine snapshot");
        Ok(path)
    }

    pub fn save_network(&self, network: &QNetwork) -> Result<PathBuf> {
        let path = self.network_path();
        write_atomic(&path, &serde_json::to_vec(network)?)?;
        info!(path = %path.display(), "saved network weights");
        Ok(path)
    }

    /// `Ok(None)` when no snapshot was ever saved
    pub fn load_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let snapshot: EngineSnapshot = serde_json::from_str(&content).map_err(|e| {
            GemError::Persistence(format!("corrupt snapshot {}: {e}", path.display()))
        })?;
        Ok(Some(snapshot))
    }

    /// `Ok(None)` when no weights were ever saved
    pub fn load_network(&self) -> Result<Option<QNetwork>> {
        let path = self.network_path();
        if !path.exists() {
            return Ok(None);
        }
        QNetwork::from_file(&path).map(Some)
    }

    /// Check if a snapshot exists
    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        warn!(error = %e, path = %path.display(), "rename failed");
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
