//! Error types for the `domain` layer.
//!
//! Errors are modeled as a root [`Error`] holding a tree of `error_kind`
//! enums, with the original failure (if any) preserved in `source`. The
//! `web` layer translates these kinds into HTTP status codes and the
//! machine-readable reason tokens clients see; nothing below `web` knows
//! about HTTP statuses.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Access(AccessErrorKind),
    Internal(InternalErrorKind),
}

/// Authentication and authorization failures.
#[derive(Debug, PartialEq)]
pub enum AccessErrorKind {
    /// The principal resolver refused the request's identity material.
    Unauthenticated,
    /// The publishing service's token, declared name, and target channel
    /// did not line up.
    UnauthorizedService,
}

#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Config,
    Other(String),
}

impl Error {
    pub fn unauthenticated() -> Self {
        Self {
            source: None,
            error_kind: DomainErrorKind::Access(AccessErrorKind::Unauthenticated),
        }
    }

    pub fn unauthorized_service() -> Self {
        Self {
            source: None,
            error_kind: DomainErrorKind::Access(AccessErrorKind::UnauthorizedService),
        }
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(description.into())),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
