use tracing::debug;

use crate::aggregate::{self, AggregateError, Group};
use crate::models::{CutoffRow, PredictionSummary, ResultRecord, RoundPolicy};
use crate::predictor;

pub fn rank_rows(
    rows: &[CutoffRow],
    candidate_rank: i64,
    policy: RoundPolicy,
) -> Result<Vec<ResultRecord>, AggregateError> {
    aggregate::ensure_single_bucket(rows)?;
    let groups = aggregate::group_rows(rows);
    debug!(rows = rows.len(), groups = groups.len(), "grouped cutoff rows");
    Ok(build_results(groups, candidate_rank, policy))
}

/// The sort is stable, so equal probabilities keep group order.
pub fn build_results(
    groups: Vec<Group>,
    candidate_rank: i64,
    policy: RoundPolicy,
) -> Vec<ResultRecord> {
    let mut results: Vec<ResultRecord> = groups
        .into_iter()
        .filter_map(|group| to_record(group, candidate_rank, policy))
        .collect();

    sort_by_probability(&mut results);
    results
}

pub fn sort_by_probability(results: &mut [ResultRecord]) {
    results.sort_by(|a, b| b.prediction.probability.cmp(&a.prediction.probability));
}

fn to_record(group: Group, candidate_rank: i64, policy: RoundPolicy) -> Option<ResultRecord> {
    let mut history = aggregate::apply_round_policy(&group.history, policy);
    history.sort_by_key(|point| (point.year, point.round));

    let prediction = predictor::predict(&history, candidate_rank)?;
    let latest_cutoff = *history.last()?;
    debug!(
        college = %group.college,
        branch = %group.branch,
        points = history.len(),
        trend = prediction.trend,
        expected = prediction.expected_cutoff,
        "predicted cutoff"
    );

    Some(ResultRecord {
        college: group.college,
        state: group.state,
        college_type: group.college_type,
        branch: group.branch,
        branch_code: group.branch_code,
        counselling_type: group.counselling,
        history,
        latest_cutoff,
        prediction: PredictionSummary {
            expected_cutoff: prediction.expected_cutoff,
            sigma: round_to_hundredths(prediction.sigma),
            band: prediction.band,
            probability: prediction.probability,
        },
    })
}

pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Band, HistoryPoint};

    fn row(college: &str, year: i32, round: i32, rank: i64) -> CutoffRow {
        CutoffRow {
            college_name: college.to_string(),
            state: "Unknown".to_string(),
            college_type: "NIT".to_string(),
            branch_name: "Computer Science and Engineering".to_string(),
            branch_code: "CSE".to_string(),
            counselling_name: "JoSAA".to_string(),
            category: "OPEN".to_string(),
            quota: "AI".to_string(),
            gender: "Gender-Neutral".to_string(),
            year,
            round,
            closing_rank: rank,
        }
    }

    fn record(college: &str, probability: u8) -> ResultRecord {
        let point = HistoryPoint {
            year: 2024,
            round: 1,
            closing_rank: 1000,
        };
        ResultRecord {
            college: college.to_string(),
            state: "Unknown".to_string(),
            college_type: "NIT".to_string(),
            branch: "CSE".to_string(),
            branch_code: "CSE".to_string(),
            counselling_type: "JoSAA".to_string(),
            history: vec![point],
            latest_cutoff: point,
            prediction: PredictionSummary {
                expected_cutoff: 1000,
                sigma: 0.0,
                band: Band::Safe,
                probability,
            },
        }
    }

    #[test]
    fn empty_rows_give_empty_results() {
        let results = rank_rows(&[], 1000, RoundPolicy::AllRounds);
        assert_eq!(results, Ok(Vec::new()));
    }

    #[test]
    fn sorts_by_probability_descending() {
        let mut results = vec![record("A", 55), record("B", 90), record("C", 35)];
        sort_by_probability(&mut results);
        let order: Vec<u8> = results.iter().map(|r| r.prediction.probability).collect();
        assert_eq!(order, vec![90, 55, 35]);
    }

    #[test]
    fn ties_keep_group_order() {
        let mut results = vec![record("A", 55), record("B", 75), record("C", 55), record("D", 75)];
        sort_by_probability(&mut results);
        let order: Vec<&str> = results.iter().map(|r| r.college.as_str()).collect();
        assert_eq!(order, vec!["B", "D", "A", "C"]);
    }

    #[test]
    fn builds_records_with_latest_cutoff_and_rounded_sigma() {
        let rows = vec![
            row("NIT Trichy", 2024, 1, 1250),
            row("NIT Trichy", 2022, 1, 1000),
            row("NIT Trichy", 2023, 1, 1100),
            row("NIT Calicut", 2024, 1, 3000),
        ];

        let results = rank_rows(&rows, 1300, RoundPolicy::AllRounds).unwrap_or_default();
        assert_eq!(results.len(), 2);

        // Single point, rank well inside the cutoff.
        assert_eq!(results[0].college, "NIT Calicut");
        assert_eq!(results[0].prediction.probability, 90);

        let trichy = &results[1];
        assert_eq!(trichy.latest_cutoff.year, 2024);
        assert_eq!(trichy.latest_cutoff.closing_rank, 1250);
        assert_eq!(trichy.history[0].year, 2022);
        assert_eq!(trichy.prediction.expected_cutoff, 1358);
        assert_eq!(trichy.prediction.sigma, 125.83);
        assert_eq!(trichy.prediction.band, Band::Safe);
        assert_eq!(trichy.prediction.probability, 75);
    }

    #[test]
    fn final_round_policy_changes_the_series() {
        let rows = vec![
            row("NIT Surathkal", 2023, 1, 1000),
            row("NIT Surathkal", 2023, 2, 1200),
            row("NIT Surathkal", 2024, 1, 1100),
        ];

        let all = rank_rows(&rows, 1000, RoundPolicy::AllRounds).unwrap_or_default();
        let last = rank_rows(&rows, 1000, RoundPolicy::FinalRound).unwrap_or_default();

        assert_eq!(all[0].history.len(), 3);
        assert_eq!(last[0].history.len(), 2);
        // [1000, 1200, 1100]: deltas +200, -100 -> -70+60 = -10
        assert_eq!(all[0].prediction.expected_cutoff, 1090);
        // [1200, 1100]: delta -100
        assert_eq!(last[0].prediction.expected_cutoff, 1000);
    }

    #[test]
    fn row_order_within_a_year_does_not_change_results() {
        let forward = vec![
            row("NIT Surathkal", 2023, 1, 1000),
            row("NIT Surathkal", 2023, 2, 1200),
            row("NIT Surathkal", 2024, 1, 1100),
            row("NIT Surathkal", 2024, 2, 1300),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = rank_rows(&forward, 1150, RoundPolicy::AllRounds).unwrap_or_default();
        let b = rank_rows(&reversed, 1150, RoundPolicy::AllRounds).unwrap_or_default();

        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(a[0].latest_cutoff.round, 2);
        assert_eq!(a[0].latest_cutoff.closing_rank, 1300);
    }

    #[test]
    fn mixed_bucket_rows_are_an_error() {
        let mut other = row("NIT Trichy", 2024, 1, 1500);
        other.quota = "HS".to_string();
        let rows = vec![row("NIT Trichy", 2023, 1, 1000), other];
        assert!(rank_rows(&rows, 1000, RoundPolicy::AllRounds).is_err());
    }

    #[test]
    fn sigma_is_rounded_to_two_places() {
        assert_eq!(round_to_hundredths(125.830_573), 125.83);
        assert_eq!(round_to_hundredths(0.0), 0.0);
        assert_eq!(round_to_hundredths(70.710_678), 70.71);
    }
}
