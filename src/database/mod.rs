/*!
 * Database module for the persistent translation cache.
 *
 * SQLite storage with a single serialized writer and pooled readers.
 * The cache semantics themselves live in `translation::cache`.
 */

pub mod connection;
pub mod schema;

// Re-export main types
pub use connection::{DatabaseConnection, data_dir};
