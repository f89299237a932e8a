/*!
 * Checkpoint persistence for resumable jobs.
 *
 * Each job has at most one checkpoint, stored as `<dir>/<job id>.json`.
 * Writes go to a temporary file in the same directory which is then renamed
 * over the old checkpoint, so a crash never leaves a torn record behind.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::database::data_dir;

use super::models::{Checkpoint, JobIdentity};

/// Checkpoint directory name under the data directory
const CHECKPOINT_DIRNAME: &str = "checkpoints";

/// Stores and reloads job checkpoints
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Directory holding one JSON file per job
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager storing checkpoints in `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Create a manager at the default location
    pub fn new_default() -> Result<Self> {
        Ok(Self::new(Self::default_dir()?))
    }

    /// Default checkpoint directory
    pub fn default_dir() -> Result<PathBuf> {
        Ok(data_dir()?.join(CHECKPOINT_DIRNAME))
    }

    /// Directory holding the checkpoints
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File the checkpoint for `job_id` lives in
    pub fn path_for(&self, job_id: &JobIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    /// Atomically replace the checkpoint for `job_id`
    pub fn save(&self, job_id: &JobIdentity, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create checkpoint directory: {:?}", self.dir))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temporary checkpoint in {:?}", self.dir))?;
        serde_json::to_writer(&mut tmp, checkpoint).context("Failed to serialize checkpoint")?;
        tmp.flush().context("Failed to flush checkpoint")?;
        tmp.as_file().sync_all().context("Failed to sync checkpoint")?;

        let path = self.path_for(job_id);
        tmp.persist(&path)
            .with_context(|| format!("Failed to move checkpoint into place: {:?}", path))?;

        debug!(
            "Checkpoint for job {} saved ({}/{} windows)",
            job_id, checkpoint.completed_windows, checkpoint.total_windows
        );
        Ok(())
    }

    /// Load the checkpoint for `job_id`, if one exists
    pub fn load(&self, job_id: &JobIdentity) -> Result<Option<Checkpoint>> {
        let path = self.path_for(job_id);
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path).with_context(|| format!("Failed to open checkpoint: {:?}", path))?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse checkpoint: {:?}", path))?;

        info!(
            "Found checkpoint for job {} ({}/{} windows, saved {})",
            job_id,
            checkpoint.completed_windows,
            checkpoint.total_windows,
            checkpoint.updated_at().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint for `job_id`; a missing file is not an error
    pub fn delete(&self, job_id: &JobIdentity) -> Result<()> {
        let path = self.path_for(job_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Checkpoint for job {} deleted", job_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete checkpoint: {:?}", path)),
        }
    }
}
