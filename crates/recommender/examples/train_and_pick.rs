//! Example: Train a model and print picks for one reader
//!
//! Run with: cargo run --package recommender --example train_and_pick
//!
//! This example shows how to:
//! 1. Load the book-review dataset
//! 2. Train a factorization model over every user and book
//! 3. Print the top picks for a user
//! 4. Rank the critics with the most similar taste

use data_loader::DataIndex;
use recommender::{FactorizationConfig, RecommenderModel, SimilarityEngine};
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("=== ShelfRecs Training Example ===\n");

    let index = DataIndex::load_from_files(Path::new("data/books"))?;
    let (users, books, reviews) = index.counts();
    println!("Loaded {} users, {} books, {} reviews", users, books, reviews);

    let user_id = index
        .user_ids()
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("dataset has no users"))?;

    let start = Instant::now();
    let model = RecommenderModel::from_store(
        &index,
        None,
        None,
        FactorizationConfig::default().with_seed(42),
    )?;
    let trained = model.build()?;
    println!(
        "Trained in {:?} (density {:.4}, loss {:.6})\n",
        start.elapsed(),
        trained.density(),
        trained.final_loss()
    );

    println!("Top picks for user {}:", user_id);
    for (book, rating) in trained.top_picks_with_books(&index, user_id, 5, false)? {
        println!("  {:.2}  {}", rating, book.title);
    }

    println!("\nMost similar critics:");
    let engine = SimilarityEngine::for_store(&index);
    for critic in engine.pearson_rank(user_id)?.iter().take(5) {
        println!("  {:.4}  {}", critic.score, critic.name);
    }

    Ok(())
}
