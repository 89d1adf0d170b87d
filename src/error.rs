//! Failure classes a streaming job can end in.

use std::path::PathBuf;

/// Errors raised while preparing or streaming a job.
///
/// Every failure is attributed to one of these classes so callers can tell
/// bad input apart from infrastructure trouble.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The G-code input cannot be turned into drawable geometry.
    #[error("G-code input: {0}")]
    Input(String),

    /// A per-layer artifact could not be read or written.
    #[error("artifact {}: {}", path.display(), source)]
    Artifact {
        /// Path of the artifact involved.
        path: PathBuf,
        /// The underlying filesystem error.
        source: std::io::Error,
    },

    /// A per-layer artifact exists but does not hold a point list.
    #[error("artifact {}: {}", path.display(), source)]
    ArtifactFormat {
        /// Path of the artifact involved.
        path: PathBuf,
        /// The underlying decode error.
        source: serde_json::Error,
    },

    /// Geometry could not be encoded into frames.
    #[error("frame encoding: {0}")]
    Encoding(String),

    /// The broadcast socket could not be set up.
    #[error("transport: {0}")]
    Transport(String),

    /// Another job is already streaming.
    #[error("a job is already in flight")]
    Busy,

    /// The job task stopped without reporting an outcome.
    #[error("job task aborted: {0}")]
    Aborted(String),
}
