pub mod drivers;
pub mod metrics;
pub mod model;
pub mod risk;

pub use drivers::{attribute, Driver};
pub use metrics::{load_metrics, MetricsReport, ModelMetrics};
pub use model::{load_model, load_optional_model, LinearModel, ModelSpec, OpaqueModel, ScoringModel};
pub use risk::{score, RiskScore};
