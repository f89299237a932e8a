/*!
 * Checkpoint records and job identity.
 */

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::language_utils::LanguagePair;
use crate::translation::window::{TranslatedUnit, TranslationUnit};

/// Hex chars kept from the derived job hash
const JOB_ID_HEX_LEN: usize = 16;

/// Stable name of a job, used as the checkpoint file stem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobIdentity(String);

impl JobIdentity {
    /// Accept a caller supplied id; it must be usable as a file name
    pub fn parse(id: &str) -> Result<Self> {
        let valid = !id.is_empty()
            && id.len() <= 128
            && !id.starts_with('.')
            && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(anyhow!(
                "Invalid job id '{}': use 1-128 ASCII letters, digits, '-', '_' or '.'",
                id
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// Derive an id from everything that determines the job's output
    pub fn derive(pair: &LanguagePair, window_size: usize, units: &[TranslationUnit]) -> Self {
        let digest = content_digest(pair, window_size, units);
        Self(digest[..JOB_ID_HEX_LEN].to_string())
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// SHA-256 hex over the language pair, window size and every unit's id and text
pub fn content_digest(pair: &LanguagePair, window_size: usize, units: &[TranslationUnit]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pair.key().as_bytes());
    hasher.update([0u8]);
    hasher.update((window_size as u64).to_le_bytes());
    for unit in units {
        hasher.update(unit.id.to_le_bytes());
        hasher.update((unit.text.len() as u64).to_le_bytes());
        hasher.update(unit.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted progress of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Job this checkpoint belongs to
    pub job_id: String,
    /// Top-level windows fully translated
    pub completed_windows: usize,
    /// Top-level windows in the job
    pub total_windows: usize,
    /// Output of the completed windows, in order
    pub accumulated_results: Vec<TranslatedUnit>,
    /// Last update in unix milliseconds
    pub timestamp: i64,
    /// Language pair key the job runs under
    pub language_pair: String,
    /// Window size the job was partitioned with
    pub window_size: usize,
    /// `content_digest` of the job's input; empty when unknown
    #[serde(default)]
    pub content_digest: String,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time
    pub fn new(
        job_id: &JobIdentity,
        completed_windows: usize,
        total_windows: usize,
        accumulated_results: Vec<TranslatedUnit>,
        pair: &LanguagePair,
        window_size: usize,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            completed_windows,
            total_windows,
            accumulated_results,
            timestamp: Utc::now().timestamp_millis(),
            language_pair: pair.key(),
            window_size,
            content_digest: String::new(),
        }
    }

    /// Bind the checkpoint to the input it was computed from
    pub fn with_content_digest(mut self, digest: impl Into<String>) -> Self {
        self.content_digest = digest.into();
        self
    }

    /// Last update as a date
    pub fn updated_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    /// Why this checkpoint cannot be applied to the described job, if it cannot
    pub fn mismatch(
        &self,
        job_id: &JobIdentity,
        total_windows: usize,
        window_size: usize,
        pair: &LanguagePair,
        content_digest: &str,
    ) -> Option<String> {
        if self.job_id != job_id.as_str() {
            Some(format!("job id {} != {}", self.job_id, job_id))
        } else if self.total_windows != total_windows {
            Some(format!("total windows {} != {}", self.total_windows, total_windows))
        } else if self.window_size != window_size {
            Some(format!("window size {} != {}", self.window_size, window_size))
        } else if self.language_pair != pair.key() {
            Some(format!("language pair {} != {}", self.language_pair, pair.key()))
        } else if self.content_digest != content_digest {
            Some("input text changed since the checkpoint was written".to_string())
        } else if self.completed_windows > self.total_windows {
            Some(format!(
                "completed windows {} exceed total {}",
                self.completed_windows, self.total_windows
            ))
        } else {
            None
        }
    }
}
