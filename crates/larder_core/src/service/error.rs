//! Error taxonomy surfaced by reconciliation services.
//!
//! # Invariants
//! - `Validation` is raised before any write.
//! - `Transaction` means the unit of work rolled back in full.
//! - `PartiallyApplied` means the primary write committed and a follow-up
//!   bulk statement (propagation, usage sync) failed.

use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug)]
pub enum ReconcileError {
    /// Missing or invalid input attributes.
    Validation(String),
    /// A referenced record does not exist for the household.
    NotFound { entity: &'static str, id: Uuid },
    /// Storage failure inside a unit of work; nothing was committed.
    Transaction(RepoError),
    /// The primary record `committed_id` is durable; the follow-up failed.
    PartiallyApplied {
        committed_id: Uuid,
        source: RepoError,
    },
}

impl ReconcileError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Transaction(_) => "transaction",
            Self::PartiallyApplied { .. } => "partially_applied",
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Transaction(err) => write!(f, "transaction rolled back: {err}"),
            Self::PartiallyApplied {
                committed_id,
                source,
            } => write!(
                f,
                "{committed_id} committed but follow-up update failed: {source}"
            ),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transaction(err) => Some(err),
            Self::PartiallyApplied { source, .. } => Some(source),
            Self::Validation(_) | Self::NotFound { .. } => None,
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Transaction(other),
        }
    }
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Transaction(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::ReconcileError;
    use crate::repo::RepoError;
    use std::error::Error;
    use uuid::Uuid;

    #[test]
    fn repo_not_found_maps_to_not_found() {
        let id = Uuid::new_v4();
        let err = ReconcileError::from(RepoError::NotFound { entity: "stop", id });
        assert!(matches!(err, ReconcileError::NotFound { entity: "stop", id: found } if found == id));
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn invalid_data_maps_to_transaction_with_source() {
        let err = ReconcileError::from(RepoError::InvalidData("bad".to_string()));
        assert_eq!(err.code(), "transaction");
        assert!(err.source().is_some());
    }
}
