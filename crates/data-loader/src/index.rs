//! DataIndex building and indexing logic.
//!
//! - Parse the three data files in parallel
//! - Build the per-user and per-book review indices
//! - Compute per-book statistics
//! - Validate referential integrity

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

impl DataIndex {
    /// Load the entire dataset from a directory containing
    /// `users.dat`, `books.dat` and `reviews.dat`.
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        info!("Loading book-review dataset from {:?}", data_dir);

        let users_path = data_dir.join("users.dat");
        let books_path = data_dir.join("books.dat");
        let reviews_path = data_dir.join("reviews.dat");

        // Nested joins give three-way parallelism
        let ((users, books), reviews) = rayon::join(
            || {
                rayon::join(
                    || parser::parse_users(&users_path),
                    || parser::parse_books(&books_path),
                )
            },
            || parser::parse_reviews(&reviews_path),
        );

        let users = users?;
        let books = books?;
        let reviews = reviews?;

        info!(
            "Parsed {} users, {} books, {} reviews",
            users.len(),
            books.len(),
            reviews.len()
        );

        let mut index = DataIndex::new();
        for user in users {
            index.insert_user(user);
        }
        for book in books {
            index.insert_book(book);
        }
        for review in reviews {
            index.insert_review(review);
        }

        index.compute_book_stats();
        index.validate()?;

        info!("DataIndex successfully built and validated");
        Ok(index)
    }

    /// Compute average rating and rating count for every reviewed book.
    ///
    /// Reviews without a score are ignored; a book whose reviews are all
    /// unscored gets no entry.
    pub fn compute_book_stats(&mut self) {
        self.book_stats = self
            .book_reviews
            .par_iter()
            .filter_map(|(&book_id, reviews)| {
                let rated: Vec<f32> = reviews
                    .iter()
                    .filter(|r| r.is_rated())
                    .map(|r| r.rating as f32)
                    .collect();
                if rated.is_empty() {
                    return None;
                }
                let rating_count = rated.len() as u32;
                let avg_rating = rated.iter().sum::<f32>() / rating_count as f32;
                Some((
                    book_id,
                    BookStats {
                        avg_rating,
                        rating_count,
                    },
                ))
            })
            .collect();
    }

    /// Validate data integrity
    ///
    /// Check that:
    /// - Every review references a known user
    /// - Every review references a known book
    /// - Ratings are on the 0-5 scale
    pub fn validate(&self) -> Result<()> {
        for reviews in self.user_reviews.values() {
            for review in reviews {
                if !self.users.contains_key(&review.user_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "User".to_string(),
                        id: review.user_id,
                    });
                }
                if !self.books.contains_key(&review.book_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Book".to_string(),
                        id: review.book_id,
                    });
                }
                if review.rating > MAX_RATING {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: review.rating.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
