//! Temporal reasoning over dated experience records.
//!
//! A question such as "what did you do at Acme before 2021?" reduces to a
//! connector ("before"), an optional explicit year ("2021") and an optional
//! reference entity ("Acme"). The filter resolves a reference year from
//! those and keeps the records whose period satisfies the connector.

use personagraph_shared::ExperienceRecord;
use tracing::{debug, warn};

use crate::period::{Period, first_year, parse_period};

/// Closed set of temporal comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    /// Started strictly before the reference year.
    Before,
    /// Started strictly after the reference year.
    After,
    /// Started in or after the reference year.
    Since,
    /// Ended in or before the reference year.
    Until,
    /// Spans the reference year.
    During,
}

impl Connector {
    /// Map a connective word, Spanish or English, to its rule.
    ///
    /// Returns `None` for anything outside the vocabulary.
    pub fn parse(raw: &str) -> Option<Self> {
        let word = raw.trim().to_lowercase();
        let connector = match word.as_str() {
            "antes" | "antes de" | "before" => Self::Before,
            "después" | "despues" | "después de" | "despues de" | "after" => Self::After,
            "desde" | "since" => Self::Since,
            "hasta" | "until" => Self::Until,
            "durante" | "en" | "durante el" | "during" | "at" | "in" | "during the"
            | "during-the" => Self::During,
            _ => return None,
        };
        Some(connector)
    }

    /// Whether a record with `period` is kept for `reference`.
    ///
    /// Records without a start year never match.
    pub fn admits(&self, period: Period, reference: i32) -> bool {
        let Some(start) = period.start else {
            return false;
        };
        let last = period.end.unwrap_or(start);
        match self {
            Self::Before => start < reference,
            Self::After => start > reference,
            Self::Since => start >= reference,
            Self::Until => last <= reference,
            Self::During => start <= reference && reference <= last,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve the year a connector is compared against.
///
/// An explicit year in `explicit_range` wins. Otherwise, when both a
/// connector and an entity are present, the entity's own record supplies
/// the year: its end year if it has one, else its start year. Entity names
/// match case-insensitively; the first matching record is used.
pub fn resolve_reference_year(
    records: &[ExperienceRecord],
    connector: Option<&str>,
    explicit_range: Option<&str>,
    entity: Option<&str>,
) -> Option<i32> {
    if let Some(year) = non_blank(explicit_range).and_then(first_year) {
        return Some(year);
    }

    non_blank(connector)?;
    let wanted = non_blank(entity)?.to_lowercase();

    let record = records
        .iter()
        .find(|r| r.entity.trim().to_lowercase() == wanted)?;

    parse_period(&record.period).end_or_start()
}

/// Keep the records whose period satisfies `connector` against `reference_year`.
///
/// Input order is preserved. An unrecognized connector excludes every record.
pub fn apply_temporal_rule<'a>(
    records: &'a [ExperienceRecord],
    connector: &str,
    reference_year: i32,
) -> Vec<&'a ExperienceRecord> {
    let Some(rule) = Connector::parse(connector) else {
        warn!(connector, "unrecognized temporal connector, excluding all records");
        return Vec::new();
    };

    records
        .iter()
        .filter(|r| rule.admits(parse_period(&r.period), reference_year))
        .collect()
}

/// Full filter: resolve the reference year, then apply the connector rule.
///
/// Without a connector or without a resolvable reference year the records
/// are returned unfiltered, in their original order.
pub fn filter_experiences<'a>(
    records: &'a [ExperienceRecord],
    connector: Option<&str>,
    explicit_range: Option<&str>,
    entity: Option<&str>,
) -> Vec<&'a ExperienceRecord> {
    let Some(word) = non_blank(connector) else {
        debug!("no temporal connector, records left unfiltered");
        return records.iter().collect();
    };

    let Some(reference) = resolve_reference_year(records, Some(word), explicit_range, entity)
    else {
        debug!(connector = word, "no reference year, records left unfiltered");
        return records.iter().collect();
    };

    let kept = apply_temporal_rule(records, word, reference);
    debug!(
        connector = word,
        reference,
        total = records.len(),
        kept = kept.len(),
        "temporal rule applied"
    );
    kept
}
