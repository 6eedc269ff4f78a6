use thiserror::Error;

use crate::draft::ValidationErrors;
use crate::persistence::PersistenceError;

/// Errors returned to callers of the editing session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("post has not been saved yet")]
    NoPostId,

    #[error("save was superseded by loading another post")]
    Superseded,

    #[error("editing session has shut down")]
    Closed,
}
