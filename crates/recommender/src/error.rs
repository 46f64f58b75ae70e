//! Error types for the recommender crate.

use thiserror::Error;

/// Errors produced by the recommendation engine.
#[derive(Error, Debug)]
pub enum RecommendError {
    /// An id that is not part of the trained id sequences
    #[error("Unknown {kind} with id {id}")]
    UnknownEntity { kind: EntityKind, id: u32 },

    /// A stored model whose structure does not match its declared shape.
    /// The model has to be retrained.
    #[error("Corrupt model: {0}")]
    CorruptModel(String),

    /// Training was requested on a matrix without a single observed rating
    #[error("No observed ratings in a {users}x{books} matrix; predictions would be meaningless")]
    EmptyInput { users: usize, books: usize },

    /// Hyperparameters or inputs outside their valid domain
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the rating store backend
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Which id space an [`RecommendError::UnknownEntity`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Book,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Book => write!(f, "book"),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, RecommendError>;
