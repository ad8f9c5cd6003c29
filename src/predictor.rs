use crate::models::{Band, HistoryPoint, Prediction};

pub const OPTIMISM_DAMPENING: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEstimate {
    pub expected: i64,
    pub sigma: f64,
    pub trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chance {
    pub band: Band,
    pub probability: u8,
}

/// Same-year rounds are ordered by round, so the last point is the
/// latest round of the latest year.
pub fn predict_cutoff(history: &[HistoryPoint]) -> Option<TrendEstimate> {
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|point| (point.year, point.round));
    let ranks: Vec<i64> = sorted.iter().map(|point| point.closing_rank).collect();

    let last = *ranks.last()?;
    if ranks.len() < 2 {
        return Some(TrendEstimate {
            expected: last,
            sigma: 0.0,
            trend: 0.0,
        });
    }

    let deltas: Vec<f64> = ranks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect();

    let mut trend = weighted_trend(&deltas);
    if trend > 0.0 {
        trend *= OPTIMISM_DAMPENING;
    }

    Some(TrendEstimate {
        expected: (last as f64 + trend).round() as i64,
        sigma: sample_sigma(&ranks),
        trend,
    })
}

// Only the last three deltas contribute.
pub fn weighted_trend(deltas: &[f64]) -> f64 {
    match deltas {
        [] => 0.0,
        [only] => *only,
        [prev, recent] => recent * 0.7 + prev * 0.3,
        [.., old, prev, recent] => recent * 0.6 + prev * 0.3 + old * 0.1,
    }
}

pub fn sample_sigma(ranks: &[i64]) -> f64 {
    let n = ranks.len();
    if n < 2 {
        return 0.0;
    }

    let mean = ranks.iter().map(|&r| r as f64).sum::<f64>() / n as f64;
    let squared: f64 = ranks
        .iter()
        .map(|&r| {
            let deviation = r as f64 - mean;
            deviation * deviation
        })
        .sum();
    (squared / (n - 1) as f64).sqrt()
}

/// Lower rank numbers are better, so a positive `candidate_rank - expected`
/// means a harder admission. Each band's upper boundary is inclusive.
pub fn calculate_chance(candidate_rank: i64, expected: i64, sigma: f64) -> Chance {
    if sigma == 0.0 {
        return if candidate_rank <= expected {
            Chance {
                band: Band::Safe,
                probability: 90,
            }
        } else if candidate_rank as f64 <= expected as f64 * 1.1 {
            Chance {
                band: Band::Moderate,
                probability: 50,
            }
        } else {
            Chance {
                band: Band::Risky,
                probability: 20,
            }
        };
    }

    let diff = (candidate_rank - expected) as f64;
    let (band, probability) = if diff <= 0.5 * sigma {
        (Band::Safe, 75)
    } else if diff <= sigma {
        (Band::Moderate, 55)
    } else if diff <= 1.5 * sigma {
        (Band::Risky, 35)
    } else {
        (Band::VeryRisky, 15)
    };

    Chance { band, probability }
}

pub fn predict(history: &[HistoryPoint], candidate_rank: i64) -> Option<Prediction> {
    let estimate = predict_cutoff(history)?;
    let chance = calculate_chance(candidate_rank, estimate.expected, estimate.sigma);

    Some(Prediction {
        expected_cutoff: estimate.expected,
        sigma: estimate.sigma,
        trend: estimate.trend,
        band: chance.band,
        probability: chance.probability,
    })
}
