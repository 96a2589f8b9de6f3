/// Canonical feature names, in the order the scorer consumes them.
pub const FEATURE_COLUMNS: [&str; 13] = [
    "agency_prior_protest_rate",
    "group_protest_rate",
    "group_sustain_rate",
    "median_resolution_days",
    "group_median_resolution_days",
    "value_millions",
    "log_value",
    "value_band_enc",
    "incumbent_displacement_flag",
    "sow_ambiguity_score",
    "sow_incumbent_interaction",
    "protester_history",
    "days_since_last_decision",
];

pub fn canonical_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Non-feature columns written ahead of the canonical ones in `features.csv`.
pub const ID_COLUMN: &str = "opp_id";
pub const KEY_COLUMNS: [&str; 3] = ["agency_id", "naics", "value_band"];
pub const LABEL_COLUMNS: [&str; 3] = ["protested", "sustained_flag", "sustain_rate_opp"];
