use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const REQUIRED_COLUMNS: usize = 11;

/// Rejected rows beyond this count are tallied but not logged.
const LOGGED_REJECTIONS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected 11 columns, found {0}")]
    TooFewColumns(usize),
    #[error("college name is empty")]
    MissingCollege,
    #[error("branch name is empty")]
    MissingBranch,
    #[error("invalid year {0:?}")]
    InvalidYear(String),
    #[error("invalid closing rank {0:?}")]
    InvalidClosingRank(String),
}

/// One validated cutoff line from an admin CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvCutoff {
    pub college_type: String,
    pub college_name: String,
    pub branch_code: String,
    pub branch_name: String,
    pub year: i32,
    pub round: i32,
    pub category: String,
    pub quota: String,
    pub gender: String,
    pub opening_rank: i64,
    pub closing_rank: i64,
}

#[derive(Debug, Default)]
pub struct ParsedFile {
    pub rows: Vec<CsvCutoff>,
    pub failed: usize,
}

/// Parses a headerless 11-column cutoff file. Bad rows are counted, not fatal.
pub fn parse_csv<R: Read>(source: R) -> anyhow::Result<ParsedFile> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut parsed = ParsedFile::default();

    for (index, result) in reader.records().enumerate() {
        let mut record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                reject(&mut parsed, index, &err);
                continue;
            }
        };

        if index == 0 {
            record = strip_bom(&record);
            debug!(row = ?record, "first row parsed");
        }

        if is_header_row(&record) {
            info!(row = index, "skipping apparent header row");
            continue;
        }

        match parse_row(&record) {
            Ok(row) => parsed.rows.push(row),
            Err(err) => reject(&mut parsed, index, &err),
        }
    }

    Ok(parsed)
}

fn reject(parsed: &mut ParsedFile, index: usize, err: &dyn std::fmt::Display) {
    if parsed.failed < LOGGED_REJECTIONS {
        warn!(row = index, "skipping row: {err}");
    }
    parsed.failed += 1;
}

fn strip_bom(record: &StringRecord) -> StringRecord {
    record
        .iter()
        .enumerate()
        .map(|(i, cell)| if i == 0 { cell.trim_start_matches('\u{feff}') } else { cell })
        .collect()
}

pub fn is_header_row(record: &StringRecord) -> bool {
    record
        .iter()
        .any(|cell| cell.to_lowercase().contains("college name"))
}

pub fn parse_row(record: &StringRecord) -> Result<CsvCutoff, RowError> {
    if record.len() < REQUIRED_COLUMNS {
        return Err(RowError::TooFewColumns(record.len()));
    }
    let cell = |i: usize| record.get(i).unwrap_or("").to_string();

    let college_name = cell(1);
    if college_name.is_empty() {
        return Err(RowError::MissingCollege);
    }
    let branch_name = cell(3);
    if branch_name.is_empty() {
        return Err(RowError::MissingBranch);
    }

    let raw_year = cell(4);
    let year = raw_year
        .parse::<i32>()
        .map_err(|_| RowError::InvalidYear(raw_year.clone()))?;
    let round = cell(5).parse::<i32>().unwrap_or(1);

    let raw_close = cell(10);
    let closing_rank =
        parse_rank(&raw_close).ok_or_else(|| RowError::InvalidClosingRank(raw_close.clone()))?;

    Ok(CsvCutoff {
        college_type: cell(0),
        college_name,
        branch_code: cell(2),
        branch_name,
        year,
        round,
        category: cell(6),
        quota: cell(7),
        gender: cell(8),
        opening_rank: parse_rank(&cell(9)).unwrap_or(0),
        closing_rank,
    })
}

/// Parses a rank cell such as `12,345`. An empty cell is rank 0.
pub fn parse_rank(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Some(0);
    }
    cleaned.parse::<i64>().ok().filter(|rank| *rank >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    const GOOD: [&str; 11] = [
        "NIT",
        "National Institute of Technology, Tiruchirappalli",
        "CSE",
        "Computer Science and Engineering",
        "2024",
        "5",
        "OPEN",
        "OS",
        "Gender-Neutral",
        "1,024",
        "1,457",
    ];

    #[test]
    fn parses_a_complete_row() {
        let row = parse_row(&record(&GOOD));
        let row = row.unwrap_or_else(|err| panic!("row rejected: {err}"));
        assert_eq!(row.college_type, "NIT");
        assert_eq!(row.branch_code, "CSE");
        assert_eq!(row.year, 2024);
        assert_eq!(row.round, 5);
        assert_eq!(row.opening_rank, 1024);
        assert_eq!(row.closing_rank, 1457);
    }

    #[test]
    fn rank_accepts_separators_and_blank() {
        assert_eq!(parse_rank("12,345"), Some(12345));
        assert_eq!(parse_rank(""), Some(0));
        assert_eq!(parse_rank("  "), Some(0));
        assert_eq!(parse_rank("abc"), None);
        assert_eq!(parse_rank("-4"), None);
    }

    #[test]
    fn round_defaults_to_one() {
        let mut cells = GOOD;
        cells[5] = "";
        assert_eq!(parse_row(&record(&cells)).map(|r| r.round), Ok(1));
    }

    #[test]
    fn rejects_short_and_incomplete_rows() {
        assert_eq!(parse_row(&record(&GOOD[..9])), Err(RowError::TooFewColumns(9)));

        let mut cells = GOOD;
        cells[1] = "";
        assert_eq!(parse_row(&record(&cells)), Err(RowError::MissingCollege));

        let mut cells = GOOD;
        cells[4] = "twenty";
        assert_eq!(
            parse_row(&record(&cells)),
            Err(RowError::InvalidYear("twenty".to_string()))
        );

        let mut cells = GOOD;
        cells[10] = "n/a";
        assert!(matches!(
            parse_row(&record(&cells)),
            Err(RowError::InvalidClosingRank(_))
        ));
    }

    #[test]
    fn detects_header_rows() {
        let header = record(&["Institute Type", "College Name", "Branch Code"]);
        assert!(is_header_row(&header));
        assert!(!is_header_row(&record(&GOOD)));
    }

    #[test]
    fn parses_file_skipping_header_and_counting_failures() {
        let data = "\u{feff}Type,College Name,Code,Branch,Year,Round,Category,Quota,Gender,Open,Close\n\
                    NIT,NIT Trichy,CSE,Computer Science,2023,1,OPEN,OS,Gender-Neutral,100,\"1,200\"\n\
                    NIT,NIT Trichy,CSE,Computer Science,2024\n\
                    IIIT,IIIT Hyderabad,ECE,Electronics,2024,,OPEN,AI,Female-only,,3400\n";

        let parsed = parse_csv(data.as_bytes());
        let parsed = parsed.unwrap_or_default();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.failed, 1);
        assert_eq!(parsed.rows[0].closing_rank, 1200);
        assert_eq!(parsed.rows[1].round, 1);
        assert_eq!(parsed.rows[1].opening_rank, 0);
    }

    #[test]
    fn bom_is_stripped_from_first_cell() {
        let data = "\u{feff}NIT,NIT Trichy,CSE,Computer Science,2023,1,OPEN,OS,Gender-Neutral,100,1200\n";
        let parsed = parse_csv(data.as_bytes()).unwrap_or_default();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].college_type, "NIT");
    }
}
