//! Completeness scoring, the early-stop gate, and multi-page result selection.

use super::types::{Confidence, ExtractionRecord, NOT_FOUND};

/// Notes of the record returned when no page produced anything.
pub const NO_DATA_NOTE: &str = "No data extracted from any page";

/// Number of required fields carrying a real value (0..=3).
pub fn completeness_score(record: &ExtractionRecord) -> u8 {
    record
        .required_values()
        .iter()
        .filter(|value| {
            let trimmed = value.trim();
            !trimmed.is_empty() && trimmed != NOT_FOUND
        })
        .count() as u8
}

/// Whether a result is good enough to stop looking at further pages.
///
/// Three fields always suffice; two suffice only when the service itself
/// reports high confidence.
pub fn is_good_result(record: &ExtractionRecord) -> bool {
    let score = completeness_score(record);
    let good = score == 3 || (score >= 2 && record.confidence == Confidence::High);

    tracing::debug!(
        score,
        confidence = %record.confidence,
        good,
        "Evaluated page result"
    );
    good
}

/// Pick the most complete record; the earliest one wins ties.
///
/// With more than one input the winner's notes are prefixed with the number of
/// pages processed.
pub fn combine_results(results: Vec<ExtractionRecord>) -> ExtractionRecord {
    let processed = results.len();

    let mut best: Option<(u8, ExtractionRecord)> = None;
    for record in results {
        let score = completeness_score(&record);
        let better = best.as_ref().map_or(true, |(best_score, _)| score > *best_score);
        if better {
            best = Some((score, record));
        }
    }

    let Some((_, mut winner)) = best else {
        return ExtractionRecord::not_found(NO_DATA_NOTE);
    };

    if processed > 1 {
        winner.notes = format!("Processed {processed} pages. {}", winner.notes);
    }
    winner
}
