use std::fmt::Write;

use crate::models::{Band, PredictQuery, ResultRecord, RoundPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct BandSummary {
    pub band: Band,
    pub count: usize,
    pub avg_expected_cutoff: f64,
}

/// Counts results per band, best band first. Empty bands are omitted.
pub fn summarize_by_band(results: &[ResultRecord]) -> Vec<BandSummary> {
    [Band::Safe, Band::Moderate, Band::Risky, Band::VeryRisky]
        .into_iter()
        .filter_map(|band| {
            let matching: Vec<i64> = results
                .iter()
                .filter(|r| r.prediction.band == band)
                .map(|r| r.prediction.expected_cutoff)
                .collect();
            if matching.is_empty() {
                return None;
            }
            Some(BandSummary {
                band,
                count: matching.len(),
                avg_expected_cutoff: matching.iter().sum::<i64>() as f64 / matching.len() as f64,
            })
        })
        .collect()
}

pub fn build_report(query: &PredictQuery, results: &[ResultRecord], limit: usize) -> String {
    let summaries = summarize_by_band(results);
    let mut output = String::new();

    let track = query.counselling_filter().unwrap_or("all counselling tracks");
    let rounds = match query.rounds {
        RoundPolicy::AllRounds => "all rounds",
        RoundPolicy::FinalRound => "final round per year",
    };

    let _ = writeln!(output, "# Cutoff Prediction Report");
    let _ = writeln!(
        output,
        "Rank {} in {} / {} / {} across {} ({})",
        query.rank, query.category, query.quota, query.gender, track, rounds
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Band Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No cutoff history matched this query.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} options (avg expected cutoff {:.0})",
                summary.band.label(),
                summary.count,
                summary.avg_expected_cutoff
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Chances");

    if results.is_empty() {
        let _ = writeln!(output, "No predictions for this query.");
    } else {
        let _ = writeln!(
            output,
            "| College | Branch | Track | Last cutoff | Expected | Sigma | Band | Chance |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
        for record in results.iter().take(limit) {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} ({} R{}) | {} | {:.2} | {} | {}% |",
                record.college,
                record.branch,
                record.counselling_type,
                record.latest_cutoff.closing_rank,
                record.latest_cutoff.year,
                record.latest_cutoff.round,
                record.prediction.expected_cutoff,
                record.prediction.sigma,
                record.prediction.band.label(),
                record.prediction.probability
            );
        }
    }

    output
}
