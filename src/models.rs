use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One row as returned by the prediction query, already narrowed to a
/// single category/quota/gender bucket.
#[derive(Debug, Clone)]
pub struct CutoffRow {
    pub college_name: String,
    pub state: String,
    pub college_type: String,
    pub branch_name: String,
    pub branch_code: String,
    pub counselling_name: String,
    pub category: String,
    pub quota: String,
    pub gender: String,
    pub year: i32,
    pub round: i32,
    pub closing_rank: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryPoint {
    pub year: i32,
    pub round: i32,
    pub closing_rank: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Band {
    Safe,
    Moderate,
    Risky,
    #[serde(rename = "Very Risky")]
    VeryRisky,
}

impl Band {
    pub fn label(self) -> &'static str {
        match self {
            Band::Safe => "Safe",
            Band::Moderate => "Moderate",
            Band::Risky => "Risky",
            Band::VeryRisky => "Very Risky",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub expected_cutoff: i64,
    pub sigma: f64,
    pub trend: f64,
    pub band: Band,
    pub probability: u8,
}

/// Output-facing view of a [`Prediction`]; sigma is rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub expected_cutoff: i64,
    pub sigma: f64,
    pub band: Band,
    pub probability: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub college: String,
    pub state: String,
    pub college_type: String,
    pub branch: String,
    pub branch_code: String,
    pub counselling_type: String,
    pub history: Vec<HistoryPoint>,
    pub latest_cutoff: HistoryPoint,
    pub prediction: PredictionSummary,
}

/// Exam the applicant sat; narrows which college types are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExamType {
    #[value(name = "jee-advanced")]
    JeeAdvanced,
    #[value(name = "jee-main")]
    JeeMain,
}

impl ExamType {
    pub fn college_types(self) -> &'static [&'static str] {
        match self {
            ExamType::JeeAdvanced => &["IIT"],
            ExamType::JeeMain => &["NIT", "IIIT", "GFTI"],
        }
    }
}

/// How multiple rounds within one year feed the trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RoundPolicy {
    /// Every round is its own point in the series.
    #[default]
    #[value(name = "all")]
    AllRounds,
    /// Keep only the highest round per year.
    #[value(name = "final")]
    FinalRound,
}

#[derive(Debug, Clone)]
pub struct PredictQuery {
    pub rank: i64,
    pub category: String,
    pub quota: String,
    pub gender: String,
    pub counselling: Option<String>,
    pub exam_type: Option<ExamType>,
    pub rounds: RoundPolicy,
}

impl PredictQuery {
    /// Track name to filter on, or `None` when every track is wanted.
    pub fn counselling_filter(&self) -> Option<&str> {
        match self.counselling.as_deref().map(str::trim) {
            None | Some("") | Some("Multi") | Some("Multi-Counselling") => None,
            Some(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub id: Uuid,
    pub filename: String,
    pub counselling_name: Option<String>,
    pub record_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CounsellingType {
    pub id: i32,
    pub name: String,
    pub exam_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(counselling: Option<&str>) -> PredictQuery {
        PredictQuery {
            rank: 1000,
            category: "OPEN".to_string(),
            quota: "AI".to_string(),
            gender: "Gender-Neutral".to_string(),
            counselling: counselling.map(str::to_string),
            exam_type: None,
            rounds: RoundPolicy::default(),
        }
    }

    #[test]
    fn multi_counselling_means_no_filter() {
        assert_eq!(query(None).counselling_filter(), None);
        assert_eq!(query(Some("")).counselling_filter(), None);
        assert_eq!(query(Some("Multi")).counselling_filter(), None);
        assert_eq!(query(Some("Multi-Counselling")).counselling_filter(), None);
        assert_eq!(query(Some(" JoSAA ")).counselling_filter(), Some("JoSAA"));
    }

    #[test]
    fn exam_types_map_to_college_types() {
        assert_eq!(ExamType::JeeAdvanced.college_types(), &["IIT"]);
        assert_eq!(ExamType::JeeMain.college_types(), &["NIT", "IIIT", "GFTI"]);
    }

    #[test]
    fn very_risky_serializes_with_space() {
        let json = serde_json::to_string(&Band::VeryRisky).unwrap_or_default();
        assert_eq!(json, "\"Very Risky\"");
        assert_eq!(Band::VeryRisky.label(), "Very Risky");
    }
}
