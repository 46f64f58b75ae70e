//! Core domain types for the book-review dataset.
//!
//! This module defines the fundamental data structures used throughout the system:
//! - Type aliases for domain clarity (UserId, BookId)
//! - Plain structs for users, books and reviews
//! - `DataIndex`, the in-memory store every other crate reads from

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user (a critic once they have reviewed something)
pub type UserId = u32;

/// Unique identifier for a book
pub type BookId = u32;

/// Highest score on the rating scale. Zero means "no rating".
pub const MAX_RATING: u8 = 5;

// =============================================================================
// Entities
// =============================================================================

/// A member of the book club.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// A book that can be reviewed and recommended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    /// Primary author, when known
    pub author: Option<String>,
    /// Year of first publication, when known
    pub published: Option<u16>,
}

/// A single review of a book by a user.
///
/// A review may exist without a score (`rating == 0`), e.g. a book that was
/// shelved but never rated. Such reviews are never treated as observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub user_id: UserId,
    pub book_id: BookId,
    /// Rating value from 1 to 5, or 0 when the user left no rating
    pub rating: u8,
    /// Unix timestamp when the review was written
    pub timestamp: Option<i64>,
}

impl Review {
    pub fn new(user_id: UserId, book_id: BookId, rating: u8) -> Self {
        Self {
            user_id,
            book_id,
            rating,
            timestamp: None,
        }
    }

    /// Whether this review carries an actual score.
    pub fn is_rated(&self) -> bool {
        self.rating > 0
    }
}

/// Precomputed statistics for a book, over rated reviews only
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookStats {
    pub avg_rating: f32,
    pub rating_count: u32,
}

// =============================================================================
// DataIndex - The In-Memory Store
// =============================================================================

/// Main data structure that holds all data and indices.
///
/// Users and books are kept in `BTreeMap`s so that id listings come back in
/// ascending order, which is what the rating matrix builder relies on for
/// reproducible row/column layouts.
#[derive(Debug)]
pub struct DataIndex {
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) books: BTreeMap<BookId, Book>,

    /// All reviews written by each user
    pub(crate) user_reviews: HashMap<UserId, Vec<Review>>,
    /// All reviews received by each book
    pub(crate) book_reviews: HashMap<BookId, Vec<Review>>,

    pub(crate) book_stats: HashMap<BookId, BookStats>,

    /// Where each (user, book) review sits in `user_reviews` and `book_reviews`
    review_slots: HashMap<(UserId, BookId), (usize, usize)>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            users: BTreeMap::new(),
            books: BTreeMap::new(),
            user_reviews: HashMap::new(),
            book_reviews: HashMap::new(),
            book_stats: HashMap::new(),
            review_slots: HashMap::new(),
        }
    }

    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_book(&self, id: BookId) -> Option<&Book> {
        self.books.get(&id)
    }

    /// Get all reviews written by a user
    ///
    /// Returns an empty slice if the user has no reviews
    pub fn get_user_reviews(&self, user_id: UserId) -> &[Review] {
        self.user_reviews
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all reviews for a book
    pub fn get_book_reviews(&self, book_id: BookId) -> &[Review] {
        self.book_reviews
            .get(&book_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get precomputed statistics for a book
    pub fn get_book_stats(&self, book_id: BookId) -> Option<&BookStats> {
        self.book_stats.get(&book_id)
    }

    /// All known user ids, ascending
    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.keys().copied().collect()
    }

    /// All known book ids, ascending
    pub fn book_ids(&self) -> Vec<BookId> {
        self.books.keys().copied().collect()
    }

    /// Iterate over every user in id order
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Iterate over every book in id order
    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_book(&mut self, book: Book) {
        self.books.insert(book.id, book);
    }

    /// Insert a review and update indices.
    ///
    /// A second review of the same book by the same user replaces the first.
    pub fn insert_review(&mut self, review: Review) {
        let by_user = self.user_reviews.entry(review.user_id).or_default();
        let by_book = self.book_reviews.entry(review.book_id).or_default();

        match self.review_slots.get(&(review.user_id, review.book_id)) {
            Some(&(user_slot, book_slot)) => {
                by_user[user_slot] = review;
                by_book[book_slot] = review;
            }
            None => {
                self.review_slots
                    .insert((review.user_id, review.book_id), (by_user.len(), by_book.len()));
                by_user.push(review);
                by_book.push(review);
            }
        }
    }

    /// Get counts for debugging/validation
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_reviews = self.user_reviews.values().map(|v| v.len()).sum();
        (self.users.len(), self.books.len(), total_reviews)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}
