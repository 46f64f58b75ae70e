//! The persistence capability the engine reads from.
//!
//! The engine never knows how ratings are stored. Anything that can list
//! users and books and answer rating queries can back a model or a
//! similarity ranking.

use anyhow::Result;
use data_loader::{Book, BookId, DataIndex, UserId};

/// Read-only access to users, books and their ratings.
///
/// Ratings use the 0-5 scale of the stored reviews where 0 means the user
/// left no score.
///
/// ## Design Note
/// - `Send + Sync` lets a ranking fan out over critics in parallel
/// - Methods return `anyhow::Result` so database-backed stores can surface
///   their own failures
pub trait RatingStore: Send + Sync {
    /// All known user ids, ascending
    fn user_ids(&self) -> Result<Vec<UserId>>;

    /// All known book ids, ascending
    fn book_ids(&self) -> Result<Vec<BookId>>;

    /// Every `(book_id, rating)` recorded for a user
    fn ratings_for_user(&self, user_id: UserId) -> Result<Vec<(BookId, u8)>>;

    /// Every nonzero `(book_id, critic_id, rating)` recorded by either critic
    fn ratings_for_critic_pair(&self, a: UserId, b: UserId)
    -> Result<Vec<(BookId, UserId, u8)>>;

    /// Display name of a critic, if known
    fn critic_name(&self, user_id: UserId) -> Result<Option<String>>;

    /// Book record for display, if known
    fn lookup_book(&self, book_id: BookId) -> Result<Option<Book>>;
}

impl RatingStore for DataIndex {
    fn user_ids(&self) -> Result<Vec<UserId>> {
        Ok(DataIndex::user_ids(self))
    }

    fn book_ids(&self) -> Result<Vec<BookId>> {
        Ok(DataIndex::book_ids(self))
    }

    fn ratings_for_user(&self, user_id: UserId) -> Result<Vec<(BookId, u8)>> {
        Ok(self
            .get_user_reviews(user_id)
            .iter()
            .map(|r| (r.book_id, r.rating))
            .collect())
    }

    fn ratings_for_critic_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<(BookId, UserId, u8)>> {
        let critics: &[UserId] = if a == b { &[a] } else { &[a, b] };
        Ok(critics
            .iter()
            .flat_map(|&critic| self.get_user_reviews(critic))
            .filter(|r| r.is_rated())
            .map(|r| (r.book_id, r.user_id, r.rating))
            .collect())
    }

    fn critic_name(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.get_user(user_id).map(|u| u.name.clone()))
    }

    fn lookup_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(self.get_book(book_id).cloned())
    }
}
