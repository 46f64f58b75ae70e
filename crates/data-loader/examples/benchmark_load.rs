use data_loader::DataIndex;
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    let data_dir = Path::new("data/books");

    println!("Loading book-review dataset...\n");

    let start = Instant::now();
    let index = DataIndex::load_from_files(data_dir)?;
    let elapsed = start.elapsed();

    let (users, books, reviews) = index.counts();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Books: {}", books);
    println!("Reviews: {}", reviews);
    println!("\nPerformance: {:.0} reviews/second",
             reviews as f64 / elapsed.as_secs_f64());
    Ok(())
}
