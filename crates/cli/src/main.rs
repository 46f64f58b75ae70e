use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{BookId, DataIndex, UserId};
use recommender::{
    FactorizationConfig, Metric, RecommenderModel, SimilarityEngine, TrainedModel,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// ShelfRecs - Book Recommendation Engine
#[derive(Parser)]
#[command(name = "shelf-recs")]
#[command(about = "Book recommendations from reviewer ratings via matrix factorization", long_about = None)]
struct Cli {
    /// Directory holding users.dat, books.dat and reviews.dat
    #[arg(short, long, global = true, default_value = "data/books")]
    data_dir: PathBuf,

    /// JSON file with factorization settings (flags override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the rating matrix, train a model and save it
    Train {
        /// Where to write the trained model
        #[arg(long)]
        out: PathBuf,

        /// Comma-separated user ids for the rows (default: every user)
        #[arg(long, value_delimiter = ',')]
        users: Option<Vec<UserId>>,

        /// Comma-separated book ids for the columns (default: every book)
        #[arg(long, value_delimiter = ',')]
        books: Option<Vec<BookId>>,

        /// Number of latent features
        #[arg(long)]
        features: Option<usize>,

        /// Maximum number of passes over the observed ratings
        #[arg(long)]
        steps: Option<usize>,

        /// Seed for reproducible factor initialization
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show what a saved model contains
    Info {
        #[arg(long)]
        model: PathBuf,
    },

    /// Best (or worst) predicted books a user has not rated yet
    Picks {
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        user_id: UserId,

        /// Number of picks to return
        #[arg(long, default_value = "12")]
        limit: usize,

        /// Lowest predictions first instead of highest
        #[arg(long)]
        reverse: bool,
    },

    /// Predicted rating of one book for one user
    Predict {
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        book_id: BookId,
    },

    /// Critics with the most similar taste
    Similar {
        #[arg(long)]
        user_id: UserId,

        #[arg(long, value_enum, default_value = "euclidean")]
        metric: MetricArg,

        /// Number of critics to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show a reviewer and their best-rated books
    User {
        #[arg(long)]
        user_id: UserId,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Euclidean,
    Pearson,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Euclidean => Metric::Euclidean,
            MetricArg::Pearson => Metric::Pearson,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Train {
            out,
            users,
            books,
            features,
            steps,
            seed,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(k) = features {
                config = config.with_latent_features(k);
            }
            if let Some(steps) = steps {
                config = config.with_steps(steps);
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            handle_train(&cli.data_dir, config, users, books, &out)?
        }
        Commands::Info { model } => handle_info(&model)?,
        Commands::Picks {
            model,
            user_id,
            limit,
            reverse,
        } => handle_picks(&cli.data_dir, &model, user_id, limit, reverse)?,
        Commands::Predict {
            model,
            user_id,
            book_id,
        } => handle_predict(&model, user_id, book_id)?,
        Commands::Similar {
            user_id,
            metric,
            limit,
        } => handle_similar(&cli.data_dir, user_id, metric.into(), limit)?,
        Commands::User { user_id } => handle_user(&cli.data_dir, user_id)?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FactorizationConfig> {
    match path {
        Some(path) => FactorizationConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        None => Ok(FactorizationConfig::default()),
    }
}

/// Load the review dataset (this may take a moment)
fn load_index(data_dir: &Path) -> Result<DataIndex> {
    println!("Loading book reviews from {}...", data_dir.display());
    let start = Instant::now();
    let index = DataIndex::load_from_files(data_dir).context("Failed to load review dataset")?;
    let (users, books, reviews) = index.counts();
    println!(
        "{} Loaded {} users, {} books, {} reviews in {:?}",
        "✓".green(),
        users,
        books,
        reviews,
        start.elapsed()
    );
    Ok(index)
}

fn load_model(path: &Path) -> Result<TrainedModel> {
    TrainedModel::load(path).with_context(|| format!("Failed to load model {}", path.display()))
}

/// Handle the 'train' command
fn handle_train(
    data_dir: &Path,
    config: FactorizationConfig,
    users: Option<Vec<UserId>>,
    books: Option<Vec<BookId>>,
    out: &Path,
) -> Result<()> {
    let index = load_index(data_dir)?;
    debug!("Training with {:?}", config);

    let model = RecommenderModel::from_store(&index, users, books, config)
        .context("Failed to build rating matrix")?;
    let (n, m) = model.matrix().shape();
    println!(
        "{} Rating matrix {}x{} (density {:.4}, sparsity {:.4})",
        "•".cyan(),
        n,
        m,
        model.density(),
        model.sparsity()
    );

    let trained = model.build().context("Training failed")?;
    let training = trained.training();
    println!(
        "{} Trained K={} in {:?}: {} passes, loss {:.6}{}",
        "✓".green(),
        trained.latent_features(),
        training.build_duration,
        training.passes,
        training.final_loss,
        if training.converged { " (converged)" } else { "" }
    );

    trained
        .save(out)
        .with_context(|| format!("Failed to save model to {}", out.display()))?;
    println!("{} Saved model to {}", "✓".green(), out.display());
    Ok(())
}

/// Handle the 'info' command
fn handle_info(path: &Path) -> Result<()> {
    let model = load_model(path)?;
    let training = model.training();

    println!("{}", format!("Model {}", path.display()).bold().blue());
    println!("{}Users: {}", "• ".green(), model.user_ids().len());
    println!("{}Books: {}", "• ".green(), model.book_ids().len());
    println!("{}Latent features: {}", "• ".green(), model.latent_features());
    println!("{}Density: {:.4}", "• ".cyan(), model.density());
    println!("{}Sparsity: {:.4}", "• ".cyan(), model.sparsity());
    println!("{}Build time: {:?}", "• ".cyan(), training.build_duration);
    println!("{}Built at (unix): {}", "• ".cyan(), model.built_at());
    println!(
        "{}Passes: {} (loss {:.6}, converged: {})",
        "• ".cyan(),
        training.passes,
        model.final_loss(),
        training.converged
    );
    Ok(())
}

/// Handle the 'picks' command
fn handle_picks(
    data_dir: &Path,
    model_path: &Path,
    user_id: UserId,
    limit: usize,
    reverse: bool,
) -> Result<()> {
    let model = load_model(model_path)?;
    let index = load_index(data_dir)?;

    let picks = model
        .top_picks_with_books(&index, user_id, limit, reverse)
        .with_context(|| format!("Failed to compute picks for user {}", user_id))?;

    let name = index
        .get_user(user_id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| format!("user {}", user_id));
    let heading = if reverse { "Least likely books for" } else { "Top picks for" };
    println!("{}", format!("{} {}:", heading, name).bold().blue());

    if picks.is_empty() {
        println!("  (nothing left to recommend)");
    }
    for (rank, (book, rating)) in picks.iter().enumerate() {
        let author = book.author.as_deref().unwrap_or("unknown author");
        println!(
            "{}. {} by {} - Predicted: {:.2}",
            (rank + 1).to_string().green(),
            book.title,
            author,
            rating
        );
    }
    Ok(())
}

/// Handle the 'predict' command
fn handle_predict(model_path: &Path, user_id: UserId, book_id: BookId) -> Result<()> {
    let model = load_model(model_path)?;
    let predicted = model.predict(user_id, book_id)?;

    println!(
        "User {} / book {}: predicted {:.3}",
        user_id, book_id, predicted
    );

    let matrix = model.matrix();
    if let (Some(row), Some(col)) = (matrix.user_index(user_id), matrix.book_index(book_id))
        && let Some(actual) = matrix.get(row, col)
    {
        println!("{}Actual rating: {}", "• ".cyan(), actual);
    }
    Ok(())
}

/// Handle the 'similar' command
fn handle_similar(data_dir: &Path, user_id: UserId, metric: Metric, limit: usize) -> Result<()> {
    let index = load_index(data_dir)?;
    let user = index
        .get_user(user_id)
        .ok_or_else(|| anyhow!("User {} not found", user_id))?;

    let engine = SimilarityEngine::for_store(&index);
    let ranking = engine
        .rank(metric, user_id)
        .with_context(|| format!("Failed to rank critics against {}", user_id))?;

    println!(
        "{}",
        format!("Critics most like {} ({:?}):", user.name, metric)
            .bold()
            .blue()
    );
    for (rank, critic) in ranking.iter().take(limit).enumerate() {
        println!(
            "{}. {} (#{}) - {:.4}",
            (rank + 1).to_string().green(),
            critic.name,
            critic.user_id,
            critic.score
        );
    }
    Ok(())
}

/// Handle the 'user' command
fn handle_user(data_dir: &Path, user_id: UserId) -> Result<()> {
    let index = load_index(data_dir)?;
    let user = index
        .get_user(user_id)
        .ok_or_else(|| anyhow!("User {} not found", user_id))?;

    let reviews = index.get_user_reviews(user_id);
    let mut rated: Vec<_> = reviews.iter().filter(|r| r.is_rated()).collect();
    let avg_rating = if rated.is_empty() {
        0.0
    } else {
        rated.iter().map(|r| f32::from(r.rating)).sum::<f32>() / rated.len() as f32
    };

    println!("{}", format!("User {}: {}", user_id, user.name).bold().blue());
    println!("{}Reviews: {} ({} scored)", "• ".cyan(), reviews.len(), rated.len());
    println!("{}Average rating: {:.2}", "• ".cyan(), avg_rating);

    rated.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.book_id.cmp(&b.book_id)));
    println!("Top rated books:");
    for review in rated.iter().take(5) {
        if let Some(book) = index.get_book(review.book_id) {
            println!("  - {} (Rating: {})", book.title, review.rating);
        }
    }
    Ok(())
}
