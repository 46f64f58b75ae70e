//! Hyperparameters for matrix factorization.
//!
//! The configuration is an explicit value handed to the factorizer and the
//! model. It can be deserialized from JSON; any field left out keeps its
//! default.

use crate::error::{RecommendError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for gradient-descent factorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorizationConfig {
    /// Number of latent features (K)
    pub latent_features: usize,
    /// Maximum number of full passes over the observed cells
    pub steps: usize,
    /// Gradient step size (alpha)
    pub learning_rate: f64,
    /// L2 penalty on factor entries (beta)
    pub regularization: f64,
    /// Training stops once the loss after a pass drops below this value
    pub convergence_threshold: f64,
    /// Seed for factor initialization; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        Self {
            latent_features: 2,
            steps: 5000,
            learning_rate: 0.0002,
            regularization: 0.02,
            convergence_threshold: 0.001,
            seed: None,
        }
    }
}

impl FactorizationConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data).map_err(|e| {
            RecommendError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configure the number of latent features (default: 2)
    pub fn with_latent_features(mut self, k: usize) -> Self {
        self.latent_features = k;
        self
    }

    /// Configure the maximum number of passes (default: 5000)
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Configure the learning rate (default: 0.0002)
    pub fn with_learning_rate(mut self, alpha: f64) -> Self {
        self.learning_rate = alpha;
        self
    }

    /// Configure the regularization strength (default: 0.02)
    pub fn with_regularization(mut self, beta: f64) -> Self {
        self.regularization = beta;
        self
    }

    /// Configure the convergence threshold (default: 0.001)
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Fix the initialization seed for reproducible training
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject values outside their domain before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.latent_features == 0 {
            return Err(RecommendError::Configuration(
                "latent_features must be at least 1".to_string(),
            ));
        }
        if self.steps == 0 {
            return Err(RecommendError::Configuration(
                "steps must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RecommendError::Configuration(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(RecommendError::Configuration(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        if !self.convergence_threshold.is_finite() || self.convergence_threshold <= 0.0 {
            return Err(RecommendError::Configuration(format!(
                "convergence_threshold must be positive, got {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}
