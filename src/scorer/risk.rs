use serde::Serialize;

use crate::scorer::drivers::{attribute, Driver};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScore {
    #[serde(rename = "oppId")]
    pub opp_id: i64,
    pub probability: f64,
    pub sustain_probability: f64,
    pub drivers: Vec<Driver>,
    pub sustain_drivers: Vec<Driver>,
}

/// Score one opportunity against the snapshot's models. `None` when the
/// feature table has no row for `opp_id`.
pub fn score(snapshot: &Snapshot, opp_id: i64) -> Option<RiskScore> {
    let values = snapshot.features.vector(opp_id)?;
    let columns = snapshot.features.columns();

    let protest = snapshot.protest_model.as_ref();
    let probability = protest.predict_probability(values);
    let drivers = attribute(protest, columns, values);

    let (sustain_probability, sustain_drivers) = match snapshot.sustain_model.as_deref() {
        Some(model) => (
            model.predict_probability(values),
            attribute(model, columns, values),
        ),
        None => (0.0, Vec::new()),
    };

    Some(RiskScore {
        opp_id,
        probability,
        sustain_probability,
        drivers,
        sustain_drivers,
    })
}
