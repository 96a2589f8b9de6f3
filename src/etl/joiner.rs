use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::{AWARDS_FILE, SOLICITATIONS_FILE};
use crate::error::{AppError, Result};
use crate::segment::median;
use crate::types::{
    AwardRecord, BaseRow, ProtestDecision, ProtestSummary, SolicitationRecord, SourceRecords,
    ValueBand,
};

/// Merge the three record sets into one row per opportunity, ordered by posted
/// date (undated rows last), with the leakage-safe agency prior rate filled in.
pub fn join_opportunities(sources: &SourceRecords) -> Result<Vec<BaseRow>> {
    let solicitations = index_solicitations(&sources.solicitations)?;
    let summaries = summarize_decisions(&sources.decisions);

    let mut seen: HashSet<i64> = HashSet::with_capacity(sources.awards.len());
    let mut rows = Vec::with_capacity(sources.awards.len());
    let mut defaulted_ambiguity = 0usize;

    for (idx, award) in sources.awards.iter().enumerate() {
        if !seen.insert(award.opp_id) {
            return Err(AppError::DuplicateOpportunity {
                source_name: AWARDS_FILE.to_string(),
                opp_id: award.opp_id,
            });
        }
        if award.sow_ambiguity_score.is_none() {
            defaulted_ambiguity += 1;
        }
        let solicitation = solicitations.get(&award.opp_id).copied();
        let summary = summaries.get(&award.opp_id).cloned().unwrap_or_default();
        rows.push(build_row(award, solicitation, summary, idx as u64 + 2)?);
    }

    if defaulted_ambiguity > 0 {
        warn!(
            defaulted = defaulted_ambiguity,
            "sow_ambiguity_score missing for {defaulted_ambiguity} opportunities, defaulted to 0.0"
        );
    }

    assign_agency_prior_rates(&mut rows);

    info!(
        opportunities = rows.len(),
        protested = rows.iter().filter(|r| r.protested).count(),
        with_decisions = summaries.len(),
        "Joined opportunities"
    );
    Ok(rows)
}

fn index_solicitations(
    solicitations: &[SolicitationRecord],
) -> Result<HashMap<i64, &SolicitationRecord>> {
    let mut index = HashMap::with_capacity(solicitations.len());
    for s in solicitations {
        if index.insert(s.opp_id, s).is_some() {
            return Err(AppError::DuplicateOpportunity {
                source_name: SOLICITATIONS_FILE.to_string(),
                opp_id: s.opp_id,
            });
        }
    }
    Ok(index)
}

fn build_row(
    award: &AwardRecord,
    solicitation: Option<&SolicitationRecord>,
    summary: ProtestSummary,
    line: u64,
) -> Result<BaseRow> {
    let value = match award.value {
        Some(v) if v > 0.0 => v,
        Some(v) => {
            return Err(AppError::malformed(
                AWARDS_FILE,
                line,
                format!("award value {v} for opportunity {} is not positive", award.opp_id),
            ))
        }
        None => {
            return Err(AppError::malformed(
                AWARDS_FILE,
                line,
                format!("opportunity {} has no award value", award.opp_id),
            ))
        }
    };

    let protested = summary.protests > 0;
    let sustain_rate_opp = if protested {
        f64::from(summary.sustained) / f64::from(summary.protests)
    } else {
        0.0
    };

    Ok(BaseRow {
        opp_id: award.opp_id,
        agency_id: award.agency_id.clone(),
        naics: award.naics.clone(),
        value,
        posted_date: solicitation.and_then(|s| s.posted_date),
        due_date: solicitation.and_then(|s| s.due_date),
        incumbent_displacement_flag: award.incumbent_changed,
        sow_ambiguity_score: award.sow_ambiguity_score.unwrap_or(0.0),
        protests: summary.protests,
        sustained: summary.sustained,
        protested,
        sustained_flag: summary.sustained > 0,
        sustain_rate_opp,
        median_resolution_days: summary.median_resolution_days,
        primary_protester: summary.primary_protester,
        protester_history: summary.protester_history,
        last_decision_date: summary.last_decision_date,
        value_band: Some(ValueBand::from_value(value).label().to_string()),
        log_value: value.ln_1p(),
        // Filled by assign_agency_prior_rates once every row exists.
        agency_prior_protest_rate: 0.0,
    })
}

// ---------------------------------------------------------------------------
// Decision log reduction
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SummaryAccumulator {
    protests: u32,
    sustained: u32,
    resolution_days: Vec<f64>,
    primary_protester: Option<String>,
    max_prior: Option<u32>,
    last_decision_date: Option<NaiveDate>,
}

/// Order used for protester history: protester, then decision date, then
/// opportunity. Missing protesters and dates sort last.
fn protester_order(a: &ProtestDecision, b: &ProtestDecision) -> Ordering {
    nulls_last(&a.protester_id, &b.protester_id)
        .then_with(|| nulls_last(&a.decision_date, &b.decision_date))
        .then_with(|| a.opp_id.cmp(&b.opp_id))
}

fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Reduce the decision log to one summary per opportunity.
///
/// Each decision first gets its protester's prior-filing count (0 for the
/// protester's first decision in date order). Decisions with no protester get
/// no count and do not contribute to `protester_history`.
pub fn summarize_decisions(decisions: &[ProtestDecision]) -> BTreeMap<i64, ProtestSummary> {
    let mut ordered: Vec<&ProtestDecision> = decisions.iter().collect();
    ordered.sort_by(|a, b| protester_order(a, b));

    let mut filed_by: HashMap<&str, u32> = HashMap::new();
    let mut acc: BTreeMap<i64, SummaryAccumulator> = BTreeMap::new();

    for decision in ordered {
        let prior = decision.protester_id.as_deref().map(|p| {
            let count = filed_by.entry(p).or_insert(0);
            let prior = *count;
            *count += 1;
            prior
        });

        let entry = acc.entry(decision.opp_id).or_default();
        entry.protests += 1;
        if decision.sustained {
            entry.sustained += 1;
        }
        entry.resolution_days.extend(decision.resolution_days);
        if entry.primary_protester.is_none() {
            entry.primary_protester = decision.protester_id.clone();
        }
        if let Some(p) = prior {
            entry.max_prior = Some(entry.max_prior.map_or(p, |m| m.max(p)));
        }
        if let Some(d) = decision.decision_date {
            entry.last_decision_date = Some(entry.last_decision_date.map_or(d, |l| l.max(d)));
        }
    }

    acc.into_iter()
        .map(|(opp_id, mut a)| {
            let summary = ProtestSummary {
                protests: a.protests,
                sustained: a.sustained,
                median_resolution_days: median(&mut a.resolution_days).unwrap_or(0.0),
                primary_protester: a.primary_protester,
                protester_history: a.max_prior.unwrap_or(0),
                last_decision_date: a.last_decision_date,
            };
            (opp_id, summary)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Leakage-safe agency prior rate
// ---------------------------------------------------------------------------

#[derive(Default, Clone, Copy)]
struct Tally {
    protested: u32,
    count: u32,
}

impl Tally {
    fn add(&mut self, protested: bool) {
        self.count += 1;
        if protested {
            self.protested += 1;
        }
    }

    /// Mean with one observation removed; `None` if nothing would remain.
    fn mean_without(self, protested: bool) -> Option<f64> {
        let count = self.count.checked_sub(1)?;
        if count == 0 {
            return None;
        }
        let hits = self.protested - u32::from(protested);
        Some(f64::from(hits) / f64::from(count))
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| f64::from(self.protested) / f64::from(self.count))
    }
}

/// Sort rows by posted date and fill `agency_prior_protest_rate`.
///
/// Tier 1: mean `protested` over the agency's opportunities posted strictly
/// earlier. Rows sharing a posted date never see each other.
/// Tier 2: the agency's full-sample mean, excluding the row itself.
/// Tier 3: the global mean, excluding the row itself (also used when the
/// agency is unknown); 0.0 for a single-row sample.
pub fn assign_agency_prior_rates(rows: &mut [BaseRow]) {
    rows.sort_by(|a, b| nulls_last(&a.posted_date, &b.posted_date));

    let mut global = Tally::default();
    let mut by_agency: HashMap<String, Tally> = HashMap::new();
    for row in rows.iter() {
        global.add(row.protested);
        if let Some(agency) = &row.agency_id {
            by_agency.entry(agency.clone()).or_default().add(row.protested);
        }
    }

    let mut running: HashMap<String, Tally> = HashMap::new();
    let mut start = 0;
    while start < rows.len() {
        let posted = rows[start].posted_date;
        let end = start
            + rows[start..]
                .iter()
                .take_while(|r| r.posted_date == posted)
                .count();

        for row in &mut rows[start..end] {
            let earlier = row
                .agency_id
                .as_ref()
                .and_then(|a| running.get(a))
                .and_then(|t| t.mean());
            let agency_wide = row
                .agency_id
                .as_ref()
                .and_then(|a| by_agency.get(a))
                .and_then(|t| t.mean_without(row.protested));
            row.agency_prior_protest_rate = earlier
                .or(agency_wide)
                .or_else(|| global.mean_without(row.protested))
                .unwrap_or(0.0);
        }
        for row in &rows[start..end] {
            if let Some(agency) = &row.agency_id {
                running.entry(agency.clone()).or_default().add(row.protested);
            }
        }
        start = end;
    }
}
