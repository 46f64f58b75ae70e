//! # Recommender Crate
//!
//! Book recommendations from reviewer ratings.
//!
//! ## Components
//!
//! ### Rating Matrix
//! [`RatingMatrixBuilder`] turns a [`RatingStore`] into a dense user x book
//! [`RatingMatrix`]. Unrated cells are `None`, never a magic zero.
//!
//! ### Factorization
//! [`MatrixFactorizer`] learns non-negative user and book factors with
//! stochastic gradient descent over the observed cells only.
//!
//! ### Model
//! [`RecommenderModel`] holds a matrix and a [`FactorizationConfig`];
//! [`RecommenderModel::build`] trains it into an immutable [`TrainedModel`]
//! that answers predictions and top-pick queries and can be saved to disk.
//!
//! ### Similarity
//! [`SimilarityEngine`] compares critics directly on the books they both
//! rated (inverse Euclidean distance, absolute Pearson correlation) and
//! ranks everyone else against one critic.
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use recommender::{FactorizationConfig, RecommenderModel, SimilarityEngine};
//!
//! let index = DataIndex::load_from_files(Path::new("data/books"))?;
//!
//! let model = RecommenderModel::from_store(&index, None, None, FactorizationConfig::default())?;
//! let trained = model.build()?;
//! let picks = trained.top_picks(42, 10, false)?;
//!
//! let engine = SimilarityEngine::for_store(&index);
//! let neighbours = engine.pearson_rank(42)?;
//! ```

pub mod config;
pub mod error;
pub mod factorization;
pub mod matrix;
pub mod model;
pub mod persistence;
pub mod similarity;
pub mod store;

// Re-export main types
pub use config::FactorizationConfig;
pub use error::{EntityKind, RecommendError, Result};
pub use factorization::{Factorization, MatrixFactorizer};
pub use matrix::{RatingMatrix, RatingMatrixBuilder};
pub use model::{RecommenderModel, TrainedModel, TrainingSummary};
pub use similarity::{
    CriticScore, Metric, ReviewerPreferences, SharedPreferenceSource, SharedPreferences,
    SimilarityEngine, euclidean_similarity, pearson_similarity,
};
pub use store::RatingStore;
