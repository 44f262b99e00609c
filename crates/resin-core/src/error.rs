// SPDX-License-Identifier: Apache-2.0
//! Error classification for failed computations.
//!
//! Failures never raise: they become error *content* (see
//! [`ComputationResult::from_error`]) and cache like any other value. This
//! module only classifies them at the boundary where a computation wraps a
//! failure into content; the content itself carries the description alone.

use crate::content::ComputationResult;

/// Why a computation produced error content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unclassified failure.
    Unknown,
    /// The computation itself reported an error.
    User,
    /// A dependency resolved to error content, so the computation
    /// short-circuited.
    MissingDependency,
    /// The computation panicked or failed externally and the caller wrapped
    /// the failure.
    Exception,
}

impl ErrorKind {
    /// Stable lowercase name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::User => "user",
            Self::MissingDependency => "missing_dependency",
            Self::Exception => "exception",
        }
    }
}

/// A classified computation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    kind: ErrorKind,
    description: String,
}

impl ResourceError {
    /// A failure reported by the computation itself.
    #[must_use]
    pub fn from_user(description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            description: description.into(),
        }
    }

    /// A wrapped external failure (panic, I/O, ...).
    #[must_use]
    pub fn from_exception(description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Exception,
            description: description.into(),
        }
    }

    /// The canonical short-circuit error for a computation whose input
    /// resolved to error content.
    #[must_use]
    pub fn missing_dependency() -> Self {
        Self {
            kind: ErrorKind::MissingDependency,
            description: "at least one dependency had an error".to_owned(),
        }
    }

    /// The failure classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable description (this is what error content carries).
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl From<ResourceError> for ComputationResult {
    fn from(error: ResourceError) -> Self {
        ComputationResult::from_error(error.description)
    }
}
