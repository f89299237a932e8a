/*!
 * Job checkpointing.
 *
 * This module provides:
 * - Job identity derivation
 * - Atomic checkpoint persistence after each completed window
 * - Reloading checkpoints to resume interrupted jobs
 */

pub mod manager;
pub mod models;

// Re-export main types
pub use manager::CheckpointManager;
pub use models::{Checkpoint, JobIdentity, content_digest};
