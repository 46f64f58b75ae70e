//! The recommender model.
//!
//! The lifecycle is expressed in types:
//! - [`RecommenderModel`] holds a rating snapshot and hyperparameters but no
//!   factors (unbuilt)
//! - [`RecommenderModel::build`] trains and returns a [`TrainedModel`], an
//!   immutable snapshot that answers prediction queries
//! - a [`TrainedModel`] can be saved and loaded back (see `persistence`)
//!
//! Retraining produces a brand-new `TrainedModel`, so readers holding the
//! old one are never disturbed.

use crate::config::FactorizationConfig;
use crate::error::{EntityKind, RecommendError, Result};
use crate::factorization::MatrixFactorizer;
use crate::matrix::{RatingMatrix, RatingMatrixBuilder};
use crate::store::RatingStore;
use data_loader::{Book, BookId, UserId};
use ndarray::Array2;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, instrument};

/// An untrained model: a rating snapshot plus the settings to train on it.
pub struct RecommenderModel {
    matrix: Arc<RatingMatrix>,
    config: FactorizationConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl RecommenderModel {
    /// Wrap an already built rating matrix.
    pub fn new(matrix: RatingMatrix, config: FactorizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matrix: Arc::new(matrix),
            config,
            cancel: None,
        })
    }

    /// Build the rating matrix from a store and wrap it.
    ///
    /// `None` for either id list means every known user/book, which gets
    /// expensive quickly on real data.
    pub fn from_store<S: RatingStore + ?Sized>(
        store: &S,
        users: Option<Vec<UserId>>,
        books: Option<Vec<BookId>>,
        config: FactorizationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut builder = RatingMatrixBuilder::new(store);
        if let Some(users) = users {
            builder = builder.with_users(users);
        }
        if let Some(books) = books {
            builder = builder.with_books(books);
        }
        Self::new(builder.build()?, config)
    }

    /// Allow a running `build` to be stopped between passes.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.config
    }

    pub fn density(&self) -> f64 {
        self.matrix.density()
    }

    pub fn sparsity(&self) -> f64 {
        self.matrix.sparsity()
    }

    /// Train from scratch. This can take a long time on real data.
    ///
    /// Fails with [`RecommendError::EmptyInput`] when the matrix has no
    /// observed rating at all.
    #[instrument(skip(self))]
    pub fn build(&self) -> Result<TrainedModel> {
        let (users, books) = self.matrix.shape();
        if self.matrix.observed_count() == 0 {
            return Err(RecommendError::EmptyInput { users, books });
        }

        let mut factorizer = MatrixFactorizer::new(self.config.clone())?;
        if let Some(flag) = &self.cancel {
            factorizer = factorizer.with_cancel_flag(flag.clone());
        }

        let start = Instant::now();
        let factorization = factorizer.factorize(&self.matrix)?;
        let build_duration = start.elapsed();

        info!(
            "Model for {} users x {} books built in {:?}",
            users, books, build_duration
        );

        Ok(TrainedModel {
            matrix: self.matrix.clone(),
            p: factorization.p,
            q: factorization.q,
            training: TrainingSummary {
                build_duration,
                built_at: unix_now(),
                passes: factorization.passes,
                final_loss: factorization.final_loss,
                converged: factorization.converged,
            },
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// How a [`TrainedModel`] came to be.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    /// Wall-clock time spent factorizing
    pub build_duration: Duration,
    /// Unix seconds when training finished
    pub built_at: u64,
    pub passes: usize,
    pub final_loss: f64,
    pub converged: bool,
}

/// A trained, read-only model.
///
/// All queries take `&self`; the type is `Send + Sync` and can be shared
/// behind an `Arc` by any number of readers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub(crate) matrix: Arc<RatingMatrix>,
    pub(crate) p: Array2<f64>,
    pub(crate) q: Array2<f64>,
    pub(crate) training: TrainingSummary,
}

impl TrainedModel {
    /// Assemble a model from a matrix and factors, checking that the
    /// factors match the matrix (P is N x K, Q is M x K, K >= 1).
    pub fn from_factors(
        matrix: RatingMatrix,
        p: Array2<f64>,
        q: Array2<f64>,
        training: TrainingSummary,
    ) -> Result<Self> {
        let (n, m) = matrix.shape();
        let k = p.ncols();
        if k == 0 {
            return Err(RecommendError::Configuration(
                "factors need at least one latent feature".to_string(),
            ));
        }
        if p.nrows() != n || q.dim() != (m, k) {
            return Err(RecommendError::Configuration(format!(
                "factors {:?} and {:?} do not fit a {}x{} matrix",
                p.dim(),
                q.dim(),
                n,
                m
            )));
        }
        Ok(Self {
            matrix: Arc::new(matrix),
            p,
            q,
            training,
        })
    }

    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    pub fn user_ids(&self) -> &[UserId] {
        self.matrix.user_ids()
    }

    pub fn book_ids(&self) -> &[BookId] {
        self.matrix.book_ids()
    }

    /// User factors (N x K)
    pub fn user_factors(&self) -> &Array2<f64> {
        &self.p
    }

    /// Book factors (M x K)
    pub fn book_factors(&self) -> &Array2<f64> {
        &self.q
    }

    pub fn latent_features(&self) -> usize {
        self.p.ncols()
    }

    pub fn training(&self) -> &TrainingSummary {
        &self.training
    }

    pub fn build_duration(&self) -> Duration {
        self.training.build_duration
    }

    /// Unix seconds when training finished
    pub fn built_at(&self) -> u64 {
        self.training.built_at
    }

    pub fn final_loss(&self) -> f64 {
        self.training.final_loss
    }

    pub fn density(&self) -> f64 {
        self.matrix.density()
    }

    pub fn sparsity(&self) -> f64 {
        self.matrix.sparsity()
    }

    /// The full reconstructed rating surface P·Qᵗ
    pub fn predictions(&self) -> Array2<f64> {
        self.p.dot(&self.q.t())
    }

    /// Predicted rating of a book for a user. Not clamped to the rating scale.
    pub fn predict(&self, user_id: UserId, book_id: BookId) -> Result<f64> {
        let row = self.user_row(user_id)?;
        let col = self
            .matrix
            .book_index(book_id)
            .ok_or(RecommendError::UnknownEntity {
                kind: EntityKind::Book,
                id: book_id,
            })?;
        Ok(self.cell(row, col))
    }

    /// Predictions for every book the user has not rated, in column order.
    ///
    /// The iterator is lazy; call again to rescan the row.
    pub fn unrated_predictions(
        &self,
        user_id: UserId,
    ) -> Result<impl Iterator<Item = (BookId, f64)> + '_> {
        let row = self.user_row(user_id)?;
        Ok(self
            .matrix
            .row(row)
            .into_iter()
            .zip(self.matrix.book_ids())
            .enumerate()
            .filter(|(_, (cell, _))| cell.is_none())
            .map(move |(col, (_, &book_id))| (book_id, self.cell(row, col))))
    }

    /// The `n` unrated books with the highest predicted rating, best first.
    ///
    /// With `reverse` the `n` lowest are returned instead, worst first.
    /// Equal predictions are ordered by ascending book id.
    pub fn top_picks(&self, user_id: UserId, n: usize, reverse: bool) -> Result<Vec<(BookId, f64)>> {
        Ok(select_best(self.unrated_predictions(user_id)?, n, reverse))
    }

    /// Like [`top_picks`](Self::top_picks) with book records resolved for display.
    pub fn top_picks_with_books<S: RatingStore + ?Sized>(
        &self,
        store: &S,
        user_id: UserId,
        n: usize,
        reverse: bool,
    ) -> Result<Vec<(Book, f64)>> {
        self.top_picks(user_id, n, reverse)?
            .into_iter()
            .map(|(book_id, rating)| -> Result<(Book, f64)> {
                let book = store.lookup_book(book_id)?.ok_or(RecommendError::UnknownEntity {
                    kind: EntityKind::Book,
                    id: book_id,
                })?;
                Ok((book, rating))
            })
            .collect()
    }

    fn user_row(&self, user_id: UserId) -> Result<usize> {
        self.matrix
            .user_index(user_id)
            .ok_or(RecommendError::UnknownEntity {
                kind: EntityKind::User,
                id: user_id,
            })
    }

    fn cell(&self, row: usize, col: usize) -> f64 {
        self.p.row(row).dot(&self.q.row(col))
    }
}

/// Heap entry ordered so that "greater" means "better pick".
#[derive(Debug, Clone, Copy)]
struct Ranked {
    key: f64,
    book_id: BookId,
    rating: f64,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| other.book_id.cmp(&self.book_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Bounded-heap selection of the `n` best predictions, O(M log n).
fn select_best(
    predictions: impl Iterator<Item = (BookId, f64)>,
    n: usize,
    reverse: bool,
) -> Vec<(BookId, f64)> {
    if n == 0 {
        return Vec::new();
    }

    // Min-heap of the best n seen so far; the root is the weakest keeper
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(n + 1);
    for (book_id, rating) in predictions {
        let key = if reverse { -rating } else { rating };
        heap.push(Reverse(Ranked {
            key,
            book_id,
            rating,
        }));
        if heap.len() > n {
            heap.pop();
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(ranked)| (ranked.book_id, ranked.rating))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{DataIndex, Review, User};
    use ndarray::arr2;

    fn summary() -> TrainingSummary {
        TrainingSummary {
            build_duration: Duration::from_millis(5),
            built_at: 0,
            passes: 1,
            final_loss: 0.0,
            converged: false,
        }
    }

    /// One user, three unrated books with predictions 4.5, 3.1 and 4.9
    fn single_row_model() -> TrainedModel {
        let matrix = RatingMatrix::new(
            vec![1],
            vec![10, 20, 30],
            Array2::from_elem((1, 3), None),
        )
        .unwrap();
        let p = arr2(&[[1.0]]);
        let q = arr2(&[[4.5], [3.1], [4.9]]);
        TrainedModel::from_factors(matrix, p, q, summary()).unwrap()
    }

    fn reference_model() -> RecommenderModel {
        let matrix = RatingMatrix::from_dense(&[
            vec![5.0, 3.0, 0.0, 1.0],
            vec![4.0, 0.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0, 5.0],
            vec![1.0, 0.0, 0.0, 4.0],
            vec![0.0, 1.0, 5.0, 4.0],
        ])
        .unwrap();
        RecommenderModel::new(matrix, FactorizationConfig::default().with_steps(300).with_seed(17))
            .unwrap()
    }

    #[test]
    fn test_top_picks() {
        let model = single_row_model();
        let picks = model.top_picks(1, 2, false).unwrap();

        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].0, 30);
        assert!((picks[0].1 - 4.9).abs() < 1e-12);
        assert_eq!(picks[1].0, 10);
        assert!((picks[1].1 - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_bottom_picks() {
        let model = single_row_model();
        let picks = model.top_picks(1, 2, true).unwrap();

        let ids: Vec<BookId> = picks.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![20, 10]);
    }

    #[test]
    fn test_picks_larger_than_candidates() {
        let model = single_row_model();
        let picks = model.top_picks(1, 10, false).unwrap();
        let ids: Vec<BookId> = picks.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![30, 10, 20]);

        assert!(model.top_picks(1, 0, false).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_ascending_book_id() {
        let picks = select_best(
            vec![(40, 3.0), (10, 3.0), (30, 4.0), (20, 3.0)].into_iter(),
            3,
            false,
        );
        assert_eq!(picks, vec![(30, 4.0), (10, 3.0), (20, 3.0)]);

        let picks = select_best(vec![(40, 1.0), (10, 1.0), (30, 2.0)].into_iter(), 2, true);
        assert_eq!(picks, vec![(10, 1.0), (40, 1.0)]);
    }

    #[test]
    fn test_unrated_predictions_skip_rated_books() {
        let trained = reference_model().build().unwrap();

        for &user_id in trained.user_ids() {
            let row = trained.matrix().user_index(user_id).unwrap();
            for (book_id, _) in trained.unrated_predictions(user_id).unwrap() {
                let col = trained.matrix().book_index(book_id).unwrap();
                assert!(trained.matrix().get(row, col).is_none());
            }
        }

        let first: Vec<_> = trained.unrated_predictions(1).unwrap().collect();
        let again: Vec<_> = trained.unrated_predictions(1).unwrap().collect();
        assert_eq!(first, again);
        assert_eq!(first.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_predict_matches_surface() {
        let trained = reference_model().build().unwrap();
        let surface = trained.predictions();

        assert!((trained.predict(4, 2).unwrap() - surface[[4, 2]]).abs() < 1e-12);
        assert_eq!(trained.latent_features(), 2);
        assert_eq!(trained.training().passes, 300);
    }

    #[test]
    fn test_unknown_entities() {
        let trained = reference_model().build().unwrap();

        assert!(matches!(
            trained.predict(99, 0),
            Err(RecommendError::UnknownEntity { kind: EntityKind::User, id: 99 })
        ));
        assert!(matches!(
            trained.predict(0, 99),
            Err(RecommendError::UnknownEntity { kind: EntityKind::Book, id: 99 })
        ));
        assert!(trained.top_picks(99, 3, false).is_err());
    }

    #[test]
    fn test_empty_matrix_refuses_to_build() {
        let matrix = RatingMatrix::from_dense(&[vec![0.0, 0.0]]).unwrap();
        let model = RecommenderModel::new(matrix, FactorizationConfig::default()).unwrap();

        assert!(matches!(
            model.build(),
            Err(RecommendError::EmptyInput { users: 1, books: 2 })
        ));
    }

    #[test]
    fn test_rebuild_returns_fresh_snapshot() {
        let model = reference_model();
        let first = model.build().unwrap();
        let second = model.build().unwrap();

        // Same seed, same data
        assert_eq!(first.user_factors(), second.user_factors());
        assert!((model.density() - 13.0 / 20.0).abs() < 1e-12);
        assert!((first.sparsity() - 7.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_factor_shape_mismatch() {
        let matrix = RatingMatrix::from_dense(&[vec![1.0, 2.0]]).unwrap();
        let result = TrainedModel::from_factors(
            matrix,
            Array2::zeros((1, 2)),
            Array2::zeros((3, 2)),
            summary(),
        );
        assert!(matches!(result, Err(RecommendError::Configuration(_))));
    }

    #[test]
    fn test_from_store_and_picks_with_books() {
        let mut index = DataIndex::new();
        index.insert_user(User { id: 1, name: "Ada".into() });
        index.insert_user(User { id: 2, name: "Grace".into() });
        for id in [10, 20, 30] {
            index.insert_book(Book {
                id,
                title: format!("Book {id}"),
                author: None,
                published: None,
            });
        }
        index.insert_review(Review::new(1, 10, 5));
        index.insert_review(Review::new(2, 10, 4));
        index.insert_review(Review::new(2, 20, 2));

        let model = RecommenderModel::from_store(
            &index,
            None,
            None,
            FactorizationConfig::default().with_steps(50).with_seed(2),
        )
        .unwrap();
        let trained = model.build().unwrap();
        let picks = trained.top_picks_with_books(&index, 1, 5, false).unwrap();

        let titles: Vec<&str> = picks.iter().map(|(b, _)| b.title.as_str()).collect();
        assert_eq!(picks.len(), 2);
        assert!(titles.contains(&"Book 20"));
        assert!(titles.contains(&"Book 30"));
    }

    #[test]
    fn test_trained_model_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrainedModel>();
    }
}
