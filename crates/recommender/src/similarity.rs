//! Critic-to-critic similarity.
//!
//! Independent of the factorization model: scores are computed straight from
//! the ratings two critics share.
//!
//! - [`SharedPreferenceSource`] supplies the books both critics rated and
//!   the list of critics to compare against
//! - [`euclidean_similarity`] and [`pearson_similarity`] score a
//!   [`SharedPreferences`] set
//! - [`SimilarityEngine`] ties the two together and ranks critics

use crate::error::Result;
use crate::store::RatingStore;
use data_loader::{BookId, UserId};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Ratings two critics gave to the books both of them scored.
///
/// Maps each shared book to `(rating by A, rating by B)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedPreferences(BTreeMap<BookId, (f64, f64)>);

impl SharedPreferences {
    pub fn new(pairs: BTreeMap<BookId, (f64, f64)>) -> Self {
        Self(pairs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, book_id: BookId) -> Option<(f64, f64)> {
        self.0.get(&book_id).copied()
    }

    /// Shared book ids, ascending
    pub fn book_ids(&self) -> impl Iterator<Item = BookId> + '_ {
        self.0.keys().copied()
    }

    /// `(a, b)` rating pairs in book id order
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.0.values().copied()
    }
}

impl FromIterator<(BookId, (f64, f64))> for SharedPreferences {
    fn from_iter<I: IntoIterator<Item = (BookId, (f64, f64))>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Anything that can tell which books two critics both rated.
pub trait SharedPreferenceSource: Send + Sync {
    /// Books rated (nonzero) by both critics, with both ratings
    fn shared_preferences(&self, a: UserId, b: UserId) -> Result<SharedPreferences>;

    /// Every critic except `critic`, as `(id, display name)` in id order
    fn other_critics(&self, critic: UserId) -> Result<Vec<(UserId, String)>>;
}

/// Shared preferences of reviewers, read from a [`RatingStore`].
pub struct ReviewerPreferences<'a, S: RatingStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RatingStore + ?Sized> ReviewerPreferences<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: RatingStore + ?Sized> SharedPreferenceSource for ReviewerPreferences<'_, S> {
    /// A book counts only when two distinct critics rated it, so a critic
    /// compared with themselves shares nothing.
    fn shared_preferences(&self, a: UserId, b: UserId) -> Result<SharedPreferences> {
        let mut by_book: BTreeMap<BookId, (Option<f64>, Option<f64>)> = BTreeMap::new();
        for (book_id, critic, rating) in self.store.ratings_for_critic_pair(a, b)? {
            if rating == 0 {
                continue;
            }
            let entry = by_book.entry(book_id).or_default();
            if critic == a {
                entry.0 = Some(f64::from(rating));
            } else if critic == b {
                entry.1 = Some(f64::from(rating));
            }
        }

        Ok(by_book
            .into_iter()
            .filter_map(|(book_id, pair)| match pair {
                (Some(ra), Some(rb)) => Some((book_id, (ra, rb))),
                _ => None,
            })
            .collect())
    }

    fn other_critics(&self, critic: UserId) -> Result<Vec<(UserId, String)>> {
        let mut critics = Vec::new();
        for user_id in self.store.user_ids()? {
            if user_id == critic {
                continue;
            }
            let name = self
                .store
                .critic_name(user_id)?
                .unwrap_or_else(|| format!("user {}", user_id));
            critics.push((user_id, name));
        }
        Ok(critics)
    }
}

/// Inverse Euclidean distance over the shared ratings, in (0, 1].
///
/// Returns exactly 0 when nothing is shared: no evidence means no similarity.
pub fn euclidean_similarity(prefs: &SharedPreferences) -> f64 {
    if prefs.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = prefs.pairs().map(|(a, b)| (a - b).powi(2)).sum();
    1.0 / (1.0 + sum_of_squares.sqrt())
}

/// Absolute Pearson correlation of the shared ratings, in [0, 1].
///
/// Returns 0 when nothing is shared or when either critic's ratings have
/// zero variance.
pub fn pearson_similarity(prefs: &SharedPreferences) -> f64 {
    if prefs.is_empty() {
        return 0.0;
    }
    let n = prefs.len() as f64;

    let (mut sum_a, mut sum_b, mut sum_sq_a, mut sum_sq_b, mut sum_products) =
        (0.0, 0.0, 0.0, 0.0, 0.0);
    for (a, b) in prefs.pairs() {
        sum_a += a;
        sum_b += b;
        sum_sq_a += a * a;
        sum_sq_b += b * b;
        sum_products += a * b;
    }

    let numerator = sum_products * n - sum_a * sum_b;
    let denominator =
        ((sum_sq_a * n - sum_a * sum_a) * (sum_sq_b * n - sum_b * sum_b)).sqrt();

    // Also catches NaN from a slightly negative product
    if !(denominator > 0.0) {
        return 0.0;
    }
    (numerator / denominator).abs()
}

/// Similarity metric used for ranking critics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    Pearson,
}

impl Metric {
    pub fn score(self, prefs: &SharedPreferences) -> f64 {
        match self {
            Metric::Euclidean => euclidean_similarity(prefs),
            Metric::Pearson => pearson_similarity(prefs),
        }
    }
}

/// A critic's similarity to the critic a ranking was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticScore {
    pub user_id: UserId,
    pub name: String,
    pub score: f64,
}

/// Scores and ranks critics by taste similarity.
pub struct SimilarityEngine<P: SharedPreferenceSource> {
    source: P,
}

impl<'a, S: RatingStore + ?Sized> SimilarityEngine<ReviewerPreferences<'a, S>> {
    /// Engine reading reviewer ratings straight from a store.
    pub fn for_store(store: &'a S) -> Self {
        Self::new(ReviewerPreferences::new(store))
    }
}

impl<P: SharedPreferenceSource> SimilarityEngine<P> {
    pub fn new(source: P) -> Self {
        Self { source }
    }

    pub fn shared_preferences(&self, a: UserId, b: UserId) -> Result<SharedPreferences> {
        self.source.shared_preferences(a, b)
    }

    pub fn euclidean_distance(&self, a: UserId, b: UserId) -> Result<f64> {
        self.similarity(Metric::Euclidean, a, b)
    }

    pub fn pearson_correlation(&self, a: UserId, b: UserId) -> Result<f64> {
        self.similarity(Metric::Pearson, a, b)
    }

    pub fn similarity(&self, metric: Metric, a: UserId, b: UserId) -> Result<f64> {
        Ok(metric.score(&self.source.shared_preferences(a, b)?))
    }

    /// Every other critic, most similar first.
    ///
    /// Critics with equal scores keep the id order of the source.
    #[instrument(skip(self))]
    pub fn rank(&self, metric: Metric, critic: UserId) -> Result<Vec<CriticScore>> {
        let others = self.source.other_critics(critic)?;
        debug!("Scoring {} critics against {}", others.len(), critic);

        let mut scores = others
            .into_par_iter()
            .map(|(user_id, name)| -> Result<CriticScore> {
                let score = self.similarity(metric, critic, user_id)?;
                Ok(CriticScore {
                    user_id,
                    name,
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scores)
    }

    pub fn euclidean_rank(&self, critic: UserId) -> Result<Vec<CriticScore>> {
        self.rank(Metric::Euclidean, critic)
    }

    pub fn pearson_rank(&self, critic: UserId) -> Result<Vec<CriticScore>> {
        self.rank(Metric::Pearson, critic)
    }
}
