//! Saving and loading trained models.
//!
//! The on-disk format is private to this crate: a JSON document holding the
//! id sequences, the rating cells, both factor matrices and the training
//! summary. Loading re-validates every shape before handing out a model.

use crate::error::{RecommendError, Result};
use crate::matrix::RatingMatrix;
use crate::model::{TrainedModel, TrainingSummary};
use data_loader::{BookId, UserId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SavedModel<'a> {
    format_version: u32,
    user_ids: &'a [UserId],
    book_ids: &'a [BookId],
    ratings: &'a Array2<Option<f64>>,
    user_factors: &'a Array2<f64>,
    book_factors: &'a Array2<f64>,
    build_duration: Duration,
    built_at: u64,
    passes: usize,
    final_loss: f64,
    converged: bool,
}

#[derive(Deserialize)]
struct LoadedModel {
    format_version: u32,
    user_ids: Vec<UserId>,
    book_ids: Vec<BookId>,
    ratings: Array2<Option<f64>>,
    user_factors: Array2<f64>,
    book_factors: Array2<f64>,
    build_duration: Duration,
    built_at: u64,
    passes: usize,
    final_loss: f64,
    converged: bool,
}

impl LoadedModel {
    fn into_model(self) -> Result<TrainedModel> {
        if self.format_version != FORMAT_VERSION {
            return Err(RecommendError::CorruptModel(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if let Some(bad) = self
            .ratings
            .iter()
            .flatten()
            .find(|r| !(r.is_finite() && **r > 0.0))
        {
            return Err(RecommendError::CorruptModel(format!(
                "stored rating {} is not a positive score",
                bad
            )));
        }
        let matrix =
            RatingMatrix::new(self.user_ids, self.book_ids, self.ratings).map_err(corrupt)?;
        let training = TrainingSummary {
            build_duration: self.build_duration,
            built_at: self.built_at,
            passes: self.passes,
            final_loss: self.final_loss,
            converged: self.converged,
        };
        TrainedModel::from_factors(matrix, self.user_factors, self.book_factors, training)
            .map_err(corrupt)
    }
}

fn corrupt(err: RecommendError) -> RecommendError {
    match err {
        RecommendError::Configuration(msg) => RecommendError::CorruptModel(msg),
        other => other,
    }
}

/// `model.json` -> `model.json.tmp`, in the same directory so the final
/// rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl TrainedModel {
    /// Write the model to `path`.
    ///
    /// Data goes to a temporary sibling file first and is renamed into
    /// place only after a successful flush, so an interrupted save never
    /// leaves a truncated model behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let record = SavedModel {
            format_version: FORMAT_VERSION,
            user_ids: self.matrix.user_ids(),
            book_ids: self.matrix.book_ids(),
            ratings: self.matrix.cells(),
            user_factors: &self.p,
            book_factors: &self.q,
            build_duration: self.training.build_duration,
            built_at: self.training.built_at,
            passes: self.training.passes,
            final_loss: self.training.final_loss,
            converged: self.training.converged,
        };

        let tmp = temp_path(path);
        let saved = write_record(&tmp, &record)
            .and_then(|()| fs::rename(&tmp, path).map_err(RecommendError::from));
        if let Err(err) = saved {
            if tmp.exists() {
                if let Err(cleanup) = fs::remove_file(&tmp) {
                    warn!("Could not remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(err);
        }

        info!("Saved model to {}", path.display());
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    ///
    /// Anything that does not parse, or parses into inconsistent shapes,
    /// is reported as [`RecommendError::CorruptModel`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let record: LoadedModel =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                if e.is_io() {
                    RecommendError::Io(e.into())
                } else {
                    RecommendError::CorruptModel(e.to_string())
                }
            })?;
        let model = record.into_model()?;

        info!(
            "Loaded {}x{} model (K={}) from {}",
            model.user_ids().len(),
            model.book_ids().len(),
            model.latent_features(),
            path.display()
        );
        Ok(model)
    }
}

fn write_record(path: &Path, record: &SavedModel<'_>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, record).map_err(std::io::Error::from)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
