//! # Data Loader Crate
//!
//! This crate handles loading and indexing the book-review dataset that
//! feeds the recommender.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (User, Book, Review, DataIndex)
//! - **parser**: Parse .dat files into Rust structs
//! - **index**: Build indices, per-book statistics and validation
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! // Load the entire dataset
//! let index = DataIndex::load_from_files(Path::new("data/books"))?;
//!
//! // Query data
//! let user = index.get_user(1).unwrap();
//! let book = index.get_book(42).unwrap();
//! let reviews = index.get_user_reviews(1);
//!
//! println!("{} reviewed {} books", user.name, reviews.len());
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod parser;
pub mod index;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use types::{
    // Type aliases
    UserId,
    BookId,
    // Core types
    User,
    Book,
    Review,
    BookStats,
    DataIndex,
    MAX_RATING,
};
