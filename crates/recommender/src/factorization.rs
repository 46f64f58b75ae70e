//! Gradient-descent matrix factorization.
//!
//! Decomposes an N x M rating matrix R into P (N x K) and Q (M x K) so that
//! P·Qᵗ approximates R on the observed cells. The values P·Qᵗ takes on the
//! unobserved cells are the predictions.
//!
//! ## Algorithm
//! 1. Initialize P and Q with uniform values in [0, 1) unless both are given
//! 2. For every pass, sweep observed cells in row-major order:
//!    - e = R[i,j] - P[i]·Q[j]
//!    - P[i,k] += α(2e·Q[j,k] - β·P[i,k]) and Q[j,k] += α(2e·P[i,k] - β·Q[j,k]),
//!      both computed from the values before this cell's update
//! 3. After each pass compute the regularized squared error over observed
//!    cells and stop once it falls below the convergence threshold
//!
//! Factors are initialized nonnegative but updates do not keep them so.
//! Predictions are neither normalized nor clamped to the rating scale.

use crate::config::FactorizationConfig;
use crate::error::{RecommendError, Result};
use crate::matrix::RatingMatrix;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const LOSS_LOG_INTERVAL: usize = 500;

/// Result of a factorization run.
#[derive(Debug, Clone)]
pub struct Factorization {
    /// User factors (N x K)
    pub p: Array2<f64>,
    /// Book factors (M x K)
    pub q: Array2<f64>,
    /// Completed passes over the observed cells
    pub passes: usize,
    /// Loss after the last completed pass
    pub final_loss: f64,
    /// Whether the loss dropped below the threshold before `steps` ran out
    pub converged: bool,
    pub observed_cells: usize,
}

impl Factorization {
    /// The full reconstructed surface P·Qᵗ
    pub fn predictions(&self) -> Array2<f64> {
        self.p.dot(&self.q.t())
    }

    /// Reconstructed value for a single cell
    pub fn predict(&self, row: usize, col: usize) -> f64 {
        self.p.row(row).dot(&self.q.row(col))
    }

    /// Trained without a single observation; the factors are just noise.
    pub fn is_degenerate(&self) -> bool {
        self.observed_cells == 0
    }
}

/// Runs gradient-descent factorization with a fixed configuration.
///
/// ## Usage
/// ```ignore
/// let factorizer = MatrixFactorizer::new(FactorizationConfig::default().with_seed(42))?;
/// let result = factorizer.factorize(&matrix)?;
/// let surface = result.predictions();
/// ```
#[derive(Debug, Clone)]
pub struct MatrixFactorizer {
    config: FactorizationConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl MatrixFactorizer {
    /// Create a factorizer, rejecting an invalid configuration up front.
    pub fn new(config: FactorizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Stop training once `flag` is set. Checked between passes; the
    /// factors from the last completed pass are returned.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.config
    }

    /// Factorize from freshly initialized factors.
    pub fn factorize(&self, ratings: &RatingMatrix) -> Result<Factorization> {
        self.factorize_from(ratings, None, None)
    }

    /// Factorize starting from the given factors.
    ///
    /// Both `p` (N x K) and `q` (M x K) must be supplied for a warm start;
    /// if either is missing both are freshly initialized.
    #[instrument(skip_all)]
    pub fn factorize_from(
        &self,
        ratings: &RatingMatrix,
        p: Option<Array2<f64>>,
        q: Option<Array2<f64>>,
    ) -> Result<Factorization> {
        let (n, m) = ratings.shape();
        let k = self.config.latent_features;
        let alpha = self.config.learning_rate;
        let beta = self.config.regularization;

        let (mut p, mut q) = match (p, q) {
            (Some(p), Some(q)) => {
                if p.dim() != (n, k) || q.dim() != (m, k) {
                    return Err(RecommendError::Configuration(format!(
                        "warm-start factors are {:?} and {:?}, expected ({n}, {k}) and ({m}, {k})",
                        p.dim(),
                        q.dim()
                    )));
                }
                (p, q)
            }
            _ => initialize(n, m, k, self.config.seed),
        };

        let observed: Vec<(usize, usize, f64)> = ratings.observed().collect();
        if observed.is_empty() {
            warn!("Factorizing a {}x{} matrix with no observed ratings", n, m);
        }

        info!(
            "Factorizing {}x{} matrix ({} observed) with K={}, steps={}, alpha={}, beta={}",
            n,
            m,
            observed.len(),
            k,
            self.config.steps,
            alpha,
            beta
        );
        let start = Instant::now();

        let mut passes = 0;
        let mut final_loss = None;
        let mut converged = false;

        while passes < self.config.steps {
            if self.is_cancelled() {
                warn!("Factorization cancelled after {} passes", passes);
                break;
            }

            for &(i, j, rating) in &observed {
                let error = rating - p.row(i).dot(&q.row(j));
                for f in 0..k {
                    let pf = p[[i, f]];
                    let qf = q[[j, f]];
                    p[[i, f]] = pf + alpha * (2.0 * error * qf - beta * pf);
                    q[[j, f]] = qf + alpha * (2.0 * error * pf - beta * qf);
                }
            }
            passes += 1;

            let current = loss(&observed, &p, &q, beta);
            final_loss = Some(current);
            if passes % LOSS_LOG_INTERVAL == 0 {
                debug!("pass {}: loss {:.6}", passes, current);
            }
            if current < self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        let final_loss = final_loss.unwrap_or_else(|| loss(&observed, &p, &q, beta));
        info!(
            "Factorization finished after {} passes in {:?} (loss {:.6}, converged: {})",
            passes,
            start.elapsed(),
            final_loss,
            converged
        );

        Ok(Factorization {
            p,
            q,
            passes,
            final_loss,
            converged,
            observed_cells: observed.len(),
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Fresh N x K and M x K factors drawn uniformly from [0, 1).
pub fn initialize(n: usize, m: usize, k: usize, seed: Option<u64>) -> (Array2<f64>, Array2<f64>) {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    let p = Array2::from_shape_fn((n, k), |_| rng.random::<f64>());
    let q = Array2::from_shape_fn((m, k), |_| rng.random::<f64>());
    (p, q)
}

/// Squared reconstruction error over the observed cells plus the L2
/// penalty on the factor entries those cells touch.
fn loss(observed: &[(usize, usize, f64)], p: &Array2<f64>, q: &Array2<f64>, beta: f64) -> f64 {
    observed
        .iter()
        .map(|&(i, j, rating)| {
            let pi = p.row(i);
            let qj = q.row(j);
            let error = rating - pi.dot(&qj);
            let penalty: f64 = pi
                .iter()
                .zip(qj.iter())
                .map(|(a, b)| a * a + b * b)
                .sum();
            error * error + (beta / 2.0) * penalty
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_matrix() -> RatingMatrix {
        RatingMatrix::from_dense(&[
            vec![5.0, 3.0, 0.0, 1.0],
            vec![4.0, 0.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0, 5.0],
            vec![1.0, 0.0, 0.0, 4.0],
            vec![0.0, 1.0, 5.0, 4.0],
        ])
        .unwrap()
    }

    // Fixed starting factors; a few random initializations need more than
    // 5000 passes to bring every observed cell within tolerance.
    fn reference_start() -> (Array2<f64>, Array2<f64>) {
        let p = ndarray::arr2(&[
            [0.32, 0.15],
            [0.65, 0.07],
            [0.54, 0.37],
            [0.06, 0.51],
            [0.04, 0.43],
        ]);
        let q = ndarray::arr2(&[[0.07, 0.09], [0.42, 0.83], [0.12, 0.22], [0.63, 0.95]]);
        (p, q)
    }

    #[test]
    fn test_reference_scenario() {
        let ratings = reference_matrix();
        let factorizer = MatrixFactorizer::new(FactorizationConfig::default()).unwrap();
        let (p, q) = reference_start();
        let result = factorizer.factorize_from(&ratings, Some(p), Some(q)).unwrap();
        assert_eq!(result.passes, 5000);
        let surface = result.predictions();

        for ((i, j), cell) in ratings.cells().indexed_iter() {
            let predicted = surface[[i, j]];
            match cell {
                Some(actual) => assert!(
                    (actual - predicted).abs() < 0.25,
                    "cell ({i}, {j}): expected ~{actual}, got {predicted}"
                ),
                None => assert!(predicted > 0.0, "cell ({i}, {j}) predicted {predicted}"),
            }
        }
    }

    #[test]
    fn test_shapes() {
        let ratings = reference_matrix();
        let factorizer = MatrixFactorizer::new(
            FactorizationConfig::default().with_latent_features(3).with_steps(10).with_seed(1),
        )
        .unwrap();
        let result = factorizer.factorize(&ratings).unwrap();

        assert_eq!(result.p.dim(), (5, 3));
        assert_eq!(result.q.dim(), (4, 3));
        assert_eq!(result.predictions().dim(), (5, 4));
        assert_eq!(result.observed_cells, 13);
        assert_eq!(result.passes, 10);
        assert!(!result.converged);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let ratings = reference_matrix();
        let config = FactorizationConfig::default().with_steps(200).with_seed(99);

        let first = MatrixFactorizer::new(config.clone()).unwrap().factorize(&ratings).unwrap();
        let second = MatrixFactorizer::new(config).unwrap().factorize(&ratings).unwrap();

        assert_eq!(first.p, second.p);
        assert_eq!(first.q, second.q);
        assert_eq!(first.final_loss, second.final_loss);
    }

    #[test]
    fn test_loss_drops_with_more_steps() {
        let ratings = RatingMatrix::from_dense(&[
            vec![5.0, 3.0, 2.0],
            vec![4.0, 2.0, 1.0],
            vec![1.0, 4.0, 5.0],
        ])
        .unwrap();
        let base = FactorizationConfig::default().with_latent_features(3).with_seed(11);

        let one = MatrixFactorizer::new(base.clone().with_steps(1))
            .unwrap()
            .factorize(&ratings)
            .unwrap();
        let many = MatrixFactorizer::new(base.with_steps(5000))
            .unwrap()
            .factorize(&ratings)
            .unwrap();

        assert!(
            many.final_loss < one.final_loss * 0.1,
            "loss went from {} to {}",
            one.final_loss,
            many.final_loss
        );
    }

    #[test]
    fn test_empty_matrix_converges_trivially() {
        let ratings = RatingMatrix::from_dense(&[vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let result = MatrixFactorizer::new(FactorizationConfig::default().with_seed(3))
            .unwrap()
            .factorize(&ratings)
            .unwrap();

        assert!(result.is_degenerate());
        assert!(result.converged);
        assert_eq!(result.passes, 1);
        assert_eq!(result.final_loss, 0.0);
    }

    #[test]
    fn test_warm_start_is_used() {
        let ratings = RatingMatrix::from_dense(&[vec![2.0, 0.0], vec![0.0, 2.0]]).unwrap();
        let factorizer = MatrixFactorizer::new(
            FactorizationConfig::default().with_latent_features(1).with_steps(1),
        )
        .unwrap();

        let p = Array2::from_elem((2, 1), 1.0);
        let q = Array2::from_elem((2, 1), 1.0);
        let result = factorizer.factorize_from(&ratings, Some(p), Some(q)).unwrap();

        // e = 1 on both observed cells: 1 + 0.0002 * (2 - 0.02)
        let expected = 1.0 + 0.0002 * (2.0 - 0.02);
        assert!((result.p[[0, 0]] - expected).abs() < 1e-12);
        assert!((result.q[[1, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_warm_start_shape_mismatch() {
        let ratings = reference_matrix();
        let factorizer = MatrixFactorizer::new(FactorizationConfig::default()).unwrap();

        let result = factorizer.factorize_from(
            &ratings,
            Some(Array2::zeros((5, 3))),
            Some(Array2::zeros((4, 3))),
        );
        assert!(matches!(result, Err(RecommendError::Configuration(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let result = MatrixFactorizer::new(FactorizationConfig::default().with_latent_features(0));
        assert!(matches!(result, Err(RecommendError::Configuration(_))));
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let ratings = reference_matrix();
        let flag = Arc::new(AtomicBool::new(true));
        let factorizer = MatrixFactorizer::new(FactorizationConfig::default().with_seed(5))
            .unwrap()
            .with_cancel_flag(flag);

        let result = factorizer.factorize(&ratings).unwrap();
        let (p0, q0) = initialize(5, 4, 2, Some(5));

        assert_eq!(result.passes, 0);
        assert!(!result.converged);
        assert_eq!(result.p, p0);
        assert_eq!(result.q, q0);
        assert!(result.final_loss > 0.0);
    }
}
