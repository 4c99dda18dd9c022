//! Durable weight checkpoints with a JSON manifest and integrity hashes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::ModelWeights;

const MANIFEST_NAME: &str = "checkpoints.json";

/// Manifest entry for one saved weight file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub epoch: usize,
    pub val_loss: f32,
    pub path: PathBuf,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Saves weight snapshots under a base directory, keeping at most
/// `max_retained` of them (oldest dropped first).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    base_dir: PathBuf,
    max_retained: usize,
}

impl CheckpointStore {
    pub fn new(base_dir: impl Into<PathBuf>, max_retained: usize) -> Result<Self, PipelineError> {
        if max_retained == 0 {
            return Err(PipelineError::config("max_retained must be at least 1"));
        }
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            max_retained,
        })
    }

    /// Serializes `weights` to disk and records it in the manifest.
    pub fn save(
        &self,
        experiment_id: Uuid,
        epoch: usize,
        val_loss: f32,
        weights: &ModelWeights,
    ) -> Result<Checkpoint, PipelineError> {
        let id = Uuid::new_v4();
        let bytes = serde_json::to_vec(weights)?;
        let hash = hex_digest(&bytes);
        let path = self.base_dir.join(format!("{id}.weights.json"));
        write_atomic(&path, &bytes)?;

        let checkpoint = Checkpoint {
            id,
            experiment_id,
            epoch,
            val_loss,
            path: path.clone(),
            hash,
            created_at: Utc::now(),
        };
        let mut manifest = self.list()?;
        manifest.push(checkpoint.clone());
        while manifest.len() > self.max_retained {
            let dropped = manifest.remove(0);
            debug!(id = %dropped.id, "dropping oldest checkpoint");
            if dropped.path.exists() {
                fs::remove_file(&dropped.path)?;
            }
        }
        self.write_manifest(&manifest)?;
        info!(id = %id, epoch, val_loss, path = %path.display(), "checkpoint saved");
        Ok(checkpoint)
    }

    /// All manifest entries, oldest first.
    pub fn list(&self) -> Result<Vec<Checkpoint>, PipelineError> {
        let manifest_path = self.base_dir.join(MANIFEST_NAME);
        if !manifest_path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&manifest_path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The retained checkpoint with the lowest validation loss.
    pub fn best(&self) -> Result<Option<Checkpoint>, PipelineError> {
        let manifest = self.list()?;
        Ok(manifest.into_iter().min_by(|a, b| {
            a.val_loss
                .partial_cmp(&b.val_loss)
                .unwrap_or(std::cmp::Ordering::Equal)
        }))
    }

    /// Reads a checkpoint's weights back, verifying the stored hash.
    pub fn load(&self, checkpoint: &Checkpoint) -> Result<ModelWeights, PipelineError> {
        let bytes = fs::read(&checkpoint.path).map_err(|e| {
            PipelineError::not_found(format!(
                "checkpoint file {} unreadable: {e}",
                checkpoint.path.display()
            ))
        })?;
        let hash = hex_digest(&bytes);
        if hash != checkpoint.hash {
            return Err(PipelineError::config(format!(
                "checkpoint {} failed its integrity check",
                checkpoint.id
            )));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_manifest(&self, manifest: &[Checkpoint]) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.base_dir.join(MANIFEST_NAME), &bytes)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
