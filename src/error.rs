use std::fmt;
use std::path::PathBuf;

/// Failures that end a snapzap run.
///
/// Unrecognised listing blocks and failed deletions are not errors: the
/// first are skipped by the parser, the second come back as `false` from
/// [`crate::manager::SnapshotManager::purge`].
#[derive(Debug)]
pub enum SnapError {
    /// Bad or missing command line arguments.
    Usage(String),
    VolumeNotFound {
        path: PathBuf,
        available: Vec<String>,
    },
    /// The external program could not be started at all.
    ExternalTool {
        command: String,
        source: std::io::Error,
    },
    /// Purge-all found a hole in the working index while descending.
    InternalConsistency { index: usize, size: usize },
}

impl fmt::Display for SnapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapError::Usage(msg) => write!(f, "{}", msg),
            SnapError::VolumeNotFound { path, available } => {
                write!(f, "Volume does not exist: {}", path.display())?;
                if !available.is_empty() {
                    write!(f, "\nAvailable volumes: {}", available.join(", "))?;
                }
                Ok(())
            }
            SnapError::ExternalTool { command, source } => {
                write!(f, "Failed to run `{}`: {}", command, source)
            }
            SnapError::InternalConsistency { index, size } => write!(
                f,
                "There was a missing snapshot at index: {}\nThe working set size is: {}\n\
                 Please report this as a bug, no further snapshots were touched",
                index, size
            ),
        }
    }
}

impl std::error::Error for SnapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapError::ExternalTool { source, .. } => Some(source),
            _ => None,
        }
    }
}
