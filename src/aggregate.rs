use std::collections::HashMap;

use thiserror::Error;

use crate::models::{CutoffRow, HistoryPoint, RoundPolicy};

pub type Bucket = (String, String, String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("rows span more than one category/quota/gender bucket: {first:?} and {other:?}")]
    MixedBuckets { first: Bucket, other: Bucket },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub college: String,
    pub state: String,
    pub college_type: String,
    pub branch: String,
    pub branch_code: String,
    pub counselling: String,
    pub history: Vec<HistoryPoint>,
}

/// Groups keep first-seen order. Rows are not re-filtered here.
pub fn group_rows(rows: &[CutoffRow]) -> Vec<Group> {
    let mut index: HashMap<(&str, &str, &str), usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for row in rows {
        let key = (
            row.college_name.as_str(),
            row.branch_name.as_str(),
            row.counselling_name.as_str(),
        );
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                college: row.college_name.clone(),
                state: row.state.clone(),
                college_type: row.college_type.clone(),
                branch: row.branch_name.clone(),
                branch_code: row.branch_code.clone(),
                counselling: row.counselling_name.clone(),
                history: Vec::new(),
            });
            groups.len() - 1
        });

        groups[slot].history.push(HistoryPoint {
            year: row.year,
            round: row.round,
            closing_rank: row.closing_rank,
        });
    }

    groups
}

pub fn ensure_single_bucket(rows: &[CutoffRow]) -> Result<(), AggregateError> {
    let mut rows = rows.iter();
    let Some(first) = rows.next() else {
        return Ok(());
    };

    for row in rows {
        if row.category != first.category || row.quota != first.quota || row.gender != first.gender
        {
            return Err(AggregateError::MixedBuckets {
                first: bucket_of(first),
                other: bucket_of(row),
            });
        }
    }

    Ok(())
}

fn bucket_of(row: &CutoffRow) -> Bucket {
    (row.category.clone(), row.quota.clone(), row.gender.clone())
}

pub fn apply_round_policy(history: &[HistoryPoint], policy: RoundPolicy) -> Vec<HistoryPoint> {
    match policy {
        RoundPolicy::AllRounds => history.to_vec(),
        RoundPolicy::FinalRound => final_round_per_year(history),
    }
}

pub fn final_round_per_year(history: &[HistoryPoint]) -> Vec<HistoryPoint> {
    let mut latest: HashMap<i32, HistoryPoint> = HashMap::new();
    for point in history {
        latest
            .entry(point.year)
            .and_modify(|kept| {
                if point.round >= kept.round {
                    *kept = *point;
                }
            })
            .or_insert(*point);
    }

    let mut points: Vec<HistoryPoint> = latest.into_values().collect();
    points.sort_by_key(|point| point.year);
    points
}
