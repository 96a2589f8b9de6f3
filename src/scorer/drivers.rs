use serde::Serialize;

use crate::config::TOP_DRIVERS;
use crate::scorer::model::ScoringModel;

const FEATURE_LABELS: &[(&str, &str)] = &[
    ("agency_prior_protest_rate", "Agency prior protest rate"),
    ("group_protest_rate", "Segment protest rate"),
    ("group_sustain_rate", "Segment sustain rate"),
    ("median_resolution_days", "Median resolution days"),
    ("group_median_resolution_days", "Segment median resolution"),
    ("value_millions", "Award value (M)"),
    ("log_value", "Log value"),
    ("value_band_enc", "Value band (encoded)"),
    ("incumbent_displacement_flag", "Incumbent displaced"),
    ("sow_ambiguity_score", "SOW ambiguity"),
    ("sow_incumbent_interaction", "SOW × incumbent"),
    ("protester_history", "Protester history"),
    ("days_since_last_decision", "Days since last decision"),
];

/// Human-readable label for a feature. Unknown names become title-cased words.
pub fn label(feature: &str) -> String {
    if let Some((_, label)) = FEATURE_LABELS.iter().find(|(name, _)| *name == feature) {
        return label.to_string();
    }
    feature
        .split('_')
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Driver {
    pub label: String,
    /// Signed share of the kept contributions; |weights| sum to 1.0.
    pub weight: f64,
}

/// Decompose a linear model's score into its top per-feature contributions.
///
/// `contribution = coefficient * value` for every feature; the TOP_DRIVERS
/// largest by magnitude are kept (ties keep feature order) and divided by the
/// sum of their magnitudes, signs preserved. Models without linear
/// coefficients yield no drivers.
///
/// Contributions are measured from a raw feature value of zero, not from the
/// training mean, so a large weight means the value itself is far from zero.
pub fn attribute(model: &dyn ScoringModel, columns: &[String], values: &[f64]) -> Vec<Driver> {
    let Some(coefficients) = model.linear_coefficients() else {
        return Vec::new();
    };

    let mut contributions: Vec<(&str, f64)> = columns
        .iter()
        .zip(values)
        .zip(&coefficients)
        .map(|((name, v), c)| (name.as_str(), c * v))
        .collect();
    contributions.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    contributions.truncate(TOP_DRIVERS);

    let total: f64 = contributions.iter().map(|(_, c)| c.abs()).sum();
    let denom = if total == 0.0 { 1.0 } else { total };

    contributions
        .into_iter()
        .map(|(name, c)| Driver { label: label(name), weight: c / denom })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::model::{LinearModel, OpaqueModel};

    fn linear(coefficients: Vec<f64>) -> LinearModel {
        let n = coefficients.len();
        LinearModel {
            feature_names: (0..n).map(|i| format!("f{i}")).collect(),
            means: vec![0.0; n],
            scales: vec![1.0; n],
            coefficients,
            intercept: 0.0,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("feature_{i}")).collect()
    }

    #[test]
    fn labels_use_the_table_then_fall_back() {
        assert_eq!(label("sow_ambiguity_score"), "SOW ambiguity");
        assert_eq!(label("bid_protest_count"), "Bid Protest Count");
    }

    #[test]
    fn keeps_top_five_with_unit_total_magnitude() {
        let model = linear(vec![1.0, -2.0, 0.5, 3.0, -0.1, 4.0, 0.2]);
        let values = vec![1.0; 7];
        let drivers = attribute(&model, &names(7), &values);

        assert_eq!(drivers.len(), 5);
        let total: f64 = drivers.iter().map(|d| d.weight.abs()).sum();
        assert!((total - 1.0).abs() < 1e-12);

        let order: Vec<&str> = drivers.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(order, vec!["Feature 5", "Feature 3", "Feature 1", "Feature 0", "Feature 2"]);
        assert!(drivers[2].weight < 0.0);
        assert!((drivers[0].weight - 4.0 / 10.5).abs() < 1e-12);
    }

    #[test]
    fn all_zero_contributions_do_not_divide_by_zero() {
        let model = linear(vec![1.0, 2.0]);
        let drivers = attribute(&model, &names(2), &[0.0, 0.0]);
        assert_eq!(drivers.len(), 2);
        assert!(drivers.iter().all(|d| d.weight == 0.0));
    }

    #[test]
    fn opaque_models_have_no_drivers() {
        let drivers = attribute(&OpaqueModel { base_rate: 0.4 }, &names(3), &[1.0, 2.0, 3.0]);
        assert!(drivers.is_empty());
    }
}
