use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A fitted classifier as seen by the risk scorer.
///
/// `linear_coefficients` is optional: models that are linear in the input
/// features after a fitted affine transform return one weight per feature (in
/// the model's feature order) so scores can be decomposed into drivers.
pub trait ScoringModel: Send + Sync {
    fn feature_names(&self) -> Option<&[String]>;

    fn predict_probability(&self, features: &[f64]) -> f64;

    fn linear_coefficients(&self) -> Option<Vec<f64>>;
}

/// Standardizing scaler followed by logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    fn validate(&self) -> Result<()> {
        let n = self.feature_names.len();
        if self.means.len() != n || self.scales.len() != n || self.coefficients.len() != n {
            return Err(AppError::InvalidSnapshot(format!(
                "linear model has {n} features but {} means, {} scales, {} coefficients",
                self.means.len(),
                self.scales.len(),
                self.coefficients.len()
            )));
        }
        Ok(())
    }

    /// Zero-variance features are left unscaled.
    fn scale(&self, i: usize) -> f64 {
        let s = self.scales[i];
        if s == 0.0 || !s.is_finite() {
            1.0
        } else {
            s
        }
    }

    pub fn logit(&self, features: &[f64]) -> f64 {
        self.intercept
            + features
                .iter()
                .enumerate()
                .take(self.coefficients.len())
                .map(|(i, x)| self.coefficients[i] * (x - self.means[i]) / self.scale(i))
                .sum::<f64>()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl ScoringModel for LinearModel {
    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }

    fn predict_probability(&self, features: &[f64]) -> f64 {
        sigmoid(self.logit(features))
    }

    /// Scaler-folded weights `coef / scale`. With these, the logit equals a
    /// constant plus the sum of `weight * raw_value` over features.
    fn linear_coefficients(&self) -> Option<Vec<f64>> {
        Some(
            self.coefficients
                .iter()
                .enumerate()
                .map(|(i, c)| c / self.scale(i))
                .collect(),
        )
    }
}

/// Model with no usable linear structure: returns a fixed base rate and no
/// coefficients, so drivers come back empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueModel {
    pub base_rate: f64,
}

impl ScoringModel for OpaqueModel {
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict_probability(&self, _features: &[f64]) -> f64 {
        self.base_rate.clamp(0.0, 1.0)
    }

    fn linear_coefficients(&self) -> Option<Vec<f64>> {
        None
    }
}

/// On-disk model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearModel),
    Opaque(OpaqueModel),
}

impl ModelSpec {
    pub fn into_model(self) -> Result<Arc<dyn ScoringModel>> {
        match self {
            ModelSpec::Linear(m) => {
                m.validate()?;
                Ok(Arc::new(m))
            }
            ModelSpec::Opaque(m) => Ok(Arc::new(m)),
        }
    }
}

/// Load a required model artifact.
pub fn load_model(path: &Path) -> Result<Arc<dyn ScoringModel>> {
    if !path.exists() {
        return Err(AppError::SourceNotFound(path.to_path_buf()));
    }
    let spec: ModelSpec = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    spec.into_model()
}

/// Load an optional model artifact. A missing file or a JSON `null` means
/// no model is configured.
pub fn load_optional_model(path: &Path) -> Result<Option<Arc<dyn ScoringModel>>> {
    if !path.exists() {
        return Ok(None);
    }
    let spec: Option<ModelSpec> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    spec.map(ModelSpec::into_model).transpose()
}
