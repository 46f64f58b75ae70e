//! Dense user-by-book rating matrix.
//!
//! Every cell is an `Option<f64>`: `None` marks a book the user never
//! scored, so a missing rating can never be mistaken for a low one.

use crate::error::{RecommendError, Result};
use crate::store::RatingStore;
use data_loader::{BookId, UserId};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// An immutable N x M rating snapshot.
///
/// Rows follow `user_ids`, columns follow `book_ids`. Rebuilding requires
/// going back to the store through [`RatingMatrixBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RatingMatrix {
    user_ids: Vec<UserId>,
    book_ids: Vec<BookId>,
    cells: Array2<Option<f64>>,
    user_index: HashMap<UserId, usize>,
    book_index: HashMap<BookId, usize>,
}

impl RatingMatrix {
    /// Assemble a matrix from id sequences and cells.
    ///
    /// Fails if either id sequence has duplicates or if the cell shape is
    /// not `user_ids.len() x book_ids.len()`.
    pub fn new(
        user_ids: Vec<UserId>,
        book_ids: Vec<BookId>,
        cells: Array2<Option<f64>>,
    ) -> Result<Self> {
        if cells.dim() != (user_ids.len(), book_ids.len()) {
            return Err(RecommendError::Configuration(format!(
                "cells are {:?} but there are {} users and {} books",
                cells.dim(),
                user_ids.len(),
                book_ids.len()
            )));
        }
        let user_index = position_index(&user_ids, "user")?;
        let book_index = position_index(&book_ids, "book")?;

        Ok(Self {
            user_ids,
            book_ids,
            cells,
            user_index,
            book_index,
        })
    }

    /// Build a matrix from plain rows where `0.0` means "unrated".
    ///
    /// Only positive values are observations; negatives and NaN are
    /// treated as unrated too.
    ///
    /// User and book ids are the row and column positions.
    pub fn from_dense(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        let m = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().position(|r| r.len() != m) {
            return Err(RecommendError::Configuration(format!(
                "row {} has {} columns, expected {}",
                bad,
                rows[bad].len(),
                m
            )));
        }

        let cells = Array2::from_shape_fn((n, m), |(i, j)| {
            let value = rows[i][j];
            (value > 0.0).then_some(value)
        });

        Self::new((0..n as u32).collect(), (0..m as u32).collect(), cells)
    }

    /// (users, books)
    pub fn shape(&self) -> (usize, usize) {
        self.cells.dim()
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn book_ids(&self) -> &[BookId] {
        &self.book_ids
    }

    /// Row position of a user id
    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.user_index.get(&user_id).copied()
    }

    /// Column position of a book id
    pub fn book_index(&self, book_id: BookId) -> Option<usize> {
        self.book_index.get(&book_id).copied()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get((row, col)).copied().flatten()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, Option<f64>> {
        self.cells.row(row)
    }

    pub fn cells(&self) -> &Array2<Option<f64>> {
        &self.cells
    }

    /// Observed cells as `(row, col, rating)` in row-major order
    pub fn observed(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.cells
            .indexed_iter()
            .filter_map(|((i, j), cell)| cell.map(|value| (i, j, value)))
    }

    pub fn observed_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Fraction of cells holding a rating. An empty matrix has density 0.
    pub fn density(&self) -> f64 {
        let total = self.cells.len();
        if total == 0 {
            return 0.0;
        }
        self.observed_count() as f64 / total as f64
    }

    /// Fraction of cells without a rating
    pub fn sparsity(&self) -> f64 {
        1.0 - self.density()
    }
}

fn position_index(ids: &[u32], kind: &str) -> Result<HashMap<u32, usize>> {
    let mut index = HashMap::with_capacity(ids.len());
    for (pos, &id) in ids.iter().enumerate() {
        if index.insert(id, pos).is_some() {
            return Err(RecommendError::Configuration(format!(
                "duplicate {} id {}",
                kind, id
            )));
        }
    }
    Ok(index)
}

/// Builds a [`RatingMatrix`] from a [`RatingStore`].
///
/// ## Usage
/// ```ignore
/// let matrix = RatingMatrixBuilder::new(&index)
///     .with_users(vec![1, 2, 3])
///     .with_books(vec![10, 11])
///     .build()?;
/// ```
///
/// Leaving out either id list makes the builder ask the store for every
/// known id, i.e. all users x all books. That is expensive on real data.
pub struct RatingMatrixBuilder<'a, S: RatingStore + ?Sized> {
    store: &'a S,
    users: Option<Vec<UserId>>,
    books: Option<Vec<BookId>>,
}

impl<'a, S: RatingStore + ?Sized> RatingMatrixBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            users: None,
            books: None,
        }
    }

    /// Restrict rows to these users, in this order
    pub fn with_users(mut self, users: Vec<UserId>) -> Self {
        self.users = Some(users);
        self
    }

    /// Restrict columns to these books, in this order
    pub fn with_books(mut self, books: Vec<BookId>) -> Self {
        self.books = Some(books);
        self
    }

    /// Query the store and fill the matrix.
    ///
    /// Ratings of 0 and ratings of books outside the column set are skipped.
    #[instrument(skip(self))]
    pub fn build(self) -> Result<RatingMatrix> {
        let store = self.store;
        let user_ids = match self.users {
            Some(users) => users,
            None => {
                warn!("No user ids given, building rows for every known user");
                store.user_ids()?
            }
        };
        let book_ids = match self.books {
            Some(books) => books,
            None => {
                warn!("No book ids given, building columns for every known book");
                store.book_ids()?
            }
        };
        let user_index = position_index(&user_ids, "user")?;
        let book_index = position_index(&book_ids, "book")?;

        let rows = user_ids
            .par_iter()
            .map(|&user_id| store.ratings_for_user(user_id))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut cells = Array2::from_elem((user_ids.len(), book_ids.len()), None);
        for (row, ratings) in rows.into_iter().enumerate() {
            for (book_id, rating) in ratings {
                if rating == 0 {
                    continue;
                }
                if let Some(&col) = book_index.get(&book_id) {
                    cells[[row, col]] = Some(f64::from(rating));
                }
            }
        }

        let matrix = RatingMatrix {
            user_ids,
            book_ids,
            cells,
            user_index,
            book_index,
        };
        info!(
            "Built {}x{} rating matrix ({} observed, density {:.4})",
            matrix.shape().0,
            matrix.shape().1,
            matrix.observed_count(),
            matrix.density()
        );
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{Book, DataIndex, Review, User};

    fn create_test_index() -> DataIndex {
        let mut index = DataIndex::new();
        for (id, name) in [(1, "Ada"), (2, "Grace"), (3, "Barbara")] {
            index.insert_user(User { id, name: name.to_string() });
        }
        for id in [10, 20, 30] {
            index.insert_book(Book {
                id,
                title: format!("Book {id}"),
                author: None,
                published: None,
            });
        }
        index.insert_review(Review::new(1, 10, 5));
        index.insert_review(Review::new(1, 30, 2));
        index.insert_review(Review::new(2, 20, 0));
        index.insert_review(Review::new(3, 20, 4));
        index
    }

    #[test]
    fn test_build_from_store() {
        let index = create_test_index();
        let matrix = RatingMatrixBuilder::new(&index).build().unwrap();

        assert_eq!(matrix.shape(), (3, 3));
        assert_eq!(matrix.user_ids(), &[1, 2, 3]);
        assert_eq!(matrix.get(0, 0), Some(5.0));
        assert_eq!(matrix.get(0, 1), None);
        assert_eq!(matrix.get(0, 2), Some(2.0));
        // An unscored review is not an observation
        assert_eq!(matrix.get(1, 1), None);
        assert_eq!(matrix.get(2, 1), Some(4.0));
        assert_eq!(matrix.observed_count(), 3);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let index = create_test_index();
        let first = RatingMatrixBuilder::new(&index)
            .with_users(vec![3, 1])
            .with_books(vec![20, 10])
            .build()
            .unwrap();
        let second = RatingMatrixBuilder::new(&index)
            .with_users(vec![3, 1])
            .with_books(vec![20, 10])
            .build()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get(0, 0), Some(4.0));
        assert_eq!(first.get(1, 1), Some(5.0));
    }

    #[test]
    fn test_books_outside_columns_are_ignored() {
        let index = create_test_index();
        let matrix = RatingMatrixBuilder::new(&index)
            .with_books(vec![10])
            .build()
            .unwrap();

        assert_eq!(matrix.shape(), (3, 1));
        assert_eq!(matrix.observed_count(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let index = create_test_index();
        let result = RatingMatrixBuilder::new(&index)
            .with_users(vec![1, 2, 1])
            .build();

        assert!(matches!(result, Err(RecommendError::Configuration(_))));
    }

    #[test]
    fn test_from_dense_density() {
        let matrix = RatingMatrix::from_dense(&[vec![5.0, 0.0], vec![0.0, 0.0]]).unwrap();

        assert_eq!(matrix.observed_count(), 1);
        assert!((matrix.density() - 0.25).abs() < 1e-12);
        assert!((matrix.sparsity() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_from_dense_ignores_non_positive_values() {
        let matrix = RatingMatrix::from_dense(&[vec![-1.0, 2.0, f64::NAN]]).unwrap();

        assert_eq!(matrix.observed_count(), 1);
        assert_eq!(matrix.get(0, 0), None);
        assert_eq!(matrix.get(0, 1), Some(2.0));
        assert_eq!(matrix.get(0, 2), None);
    }

    #[test]
    fn test_from_dense_rejects_ragged_rows() {
        let result = RatingMatrix::from_dense(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_observed_is_row_major() {
        let matrix = RatingMatrix::from_dense(&[vec![0.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let cells: Vec<_> = matrix.observed().collect();
        assert_eq!(cells, vec![(0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0)]);
    }

    #[test]
    fn test_empty_matrix_density() {
        let matrix = RatingMatrix::from_dense(&[]).unwrap();
        assert_eq!(matrix.density(), 0.0);
    }
}
