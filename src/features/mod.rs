pub mod columns;
pub mod engine;
pub mod table;

pub use columns::FEATURE_COLUMNS;
pub use engine::{build_features, FeatureRow};
pub use table::FeatureTable;
