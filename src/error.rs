//! Typed failures of a linking pass.
//!
//! Public operations return `anyhow::Result`; these errors travel inside it and can be
//! recovered with `err.downcast_ref::<LinkError>()`.

use std::fmt;
use std::path::PathBuf;

use crate::model::ComponentId;

/// A dependency edge whose target location could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub dependent: ComponentId,
    pub dependency: ComponentId,
    pub specifier: String,
    pub reason: String,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ('{}'): {}",
            self.dependent, self.dependency, self.specifier, self.reason
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to resolve {} dependency link(s): {}", .failures.len(), join(.failures))]
    Resolution { failures: Vec<ResolutionFailure> },

    #[error("no manifest for component {id}: {reason}")]
    ManifestNotFound { id: ComponentId, reason: String },

    #[error("malformed manifest at {path:?}: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("nothing to link: no components are tracked")]
    NothingToLink,

    #[error("invalid link request: {0}")]
    InvalidRequest(String),

    #[error("invalid component id '{id}': {reason}")]
    InvalidComponentId { id: String, reason: String },
}

fn join(failures: &[ResolutionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
