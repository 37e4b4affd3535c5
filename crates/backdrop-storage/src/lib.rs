//! Artifact storage and result cache.
//!
//! Processed videos live in a single output directory. This crate owns that
//! directory: naming artifacts, mapping (source, effect) pairs to them, and
//! resolving download requests safely.

pub mod error;
pub mod key;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use key::{artifact_filename, normalize_source, parse_artifact_filename, CacheKey};
pub use store::{validate_filename, ArtifactInfo, CacheEntry, CacheStats, CacheStore, INDEX_FILE};
