//! Crate-wide error type.
//!
//! Config/lookup failures, scratch-file IO failures, malformed CSV input,
//! and internal invariant violations are each their own variant so callers
//! can distinguish "bad input" from "bug".

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transcript '{0}' not found in exon coordinate file")]
    ConfigMissing(String),

    #[error("io error on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed exon coordinate row: {0}")]
    MalformedInput(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
