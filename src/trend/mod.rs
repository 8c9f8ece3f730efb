//! Trend analysis and short-horizon forecasting over scan-result series.
//!
//! Read-only and decoupled from the batch pipeline: everything here is a
//! function of an ordered score series.

use crate::storage::{results, Pool};
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Steps projected ahead by the forecaster.
pub const FORECAST_STEPS: usize = 7;
/// Trend percentage magnitude beyond which the series is Improving/Declining.
pub const TREND_DIRECTION_PCT: f64 = 5.0;
/// Trend percentage magnitude beyond which the "gradual" pattern flag sets.
pub const GRADUAL_PATTERN_PCT: f64 = 10.0;
/// Forecast confidence is clamped to this range.
pub const CONFIDENCE_RANGE: (f64, f64) = (30.0, 95.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Least-squares fit of score against sequence index.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; 1.0 for a perfectly linear series.
    pub r_squared: f64,
}

/// Full trend report for one series.
#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub samples: usize,
    pub trend_percentage: f64,
    pub direction: TrendDirection,
    pub mean_step_delta: f64,
    pub gradual: bool,
    pub sudden: bool,
    pub forecast: Vec<f64>,
    pub confidence: f64,
    pub fit: LinearFit,
}

/// Best and worst performers by mean score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerformerRanking {
    pub best: (Uuid, f64),
    pub worst: (Uuid, f64),
}

/// Fit score = slope * index + intercept by least squares.
pub fn linear_fit(values: &[f64]) -> LinearFit {
    let n = values.len() as f64;
    if values.len() < 2 {
        return LinearFit {
            slope: 0.0,
            intercept: values.first().copied().unwrap_or(0.0),
            r_squared: 1.0,
        };
    }

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let predicted = intercept + slope * i as f64;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).max(0.0)
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Analyze an ordered score series. Returns None when the series is too
/// short (fewer than 2 samples) or starts at zero.
pub fn analyze(scores: &[f64]) -> Option<TrendReport> {
    if scores.len() < 2 {
        return None;
    }
    let first = *scores.first()?;
    let last = *scores.last()?;
    if first == 0.0 {
        return None;
    }

    let trend_percentage = (last - first) / first * 100.0;
    let direction = if trend_percentage > TREND_DIRECTION_PCT {
        TrendDirection::Improving
    } else if trend_percentage < -TREND_DIRECTION_PCT {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    let deltas: Vec<f64> = scores.windows(2).map(|w| w[1] - w[0]).collect();
    let mean_step_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let mean_abs_delta = deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64;

    let gradual = trend_percentage.abs() > GRADUAL_PATTERN_PCT;
    let sudden =
        mean_abs_delta > 0.0 && deltas.iter().any(|d| d.abs() > 2.0 * mean_abs_delta);

    let fit = linear_fit(scores);
    let n = scores.len();
    let forecast: Vec<f64> = (1..=FORECAST_STEPS)
        .map(|step| fit.intercept + fit.slope * (n - 1 + step) as f64)
        .collect();

    let (lo, hi) = CONFIDENCE_RANGE;
    let confidence = (lo + fit.r_squared * (hi - lo)).clamp(lo, hi);

    Some(TrendReport {
        samples: n,
        trend_percentage,
        direction,
        mean_step_delta,
        gradual,
        sudden,
        forecast,
        confidence,
        fit,
    })
}

/// Rank schedules by mean score.
pub fn rank_performers(means: &[(Uuid, f64)]) -> Option<PerformerRanking> {
    let best = means
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    let worst = means
        .iter()
        .copied()
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    Some(PerformerRanking { best, worst })
}

/// Trend report for one schedule's recent history.
pub fn report_for_schedule(
    pool: &Pool,
    schedule_id: Uuid,
    window_days: i64,
) -> Result<Option<TrendReport>> {
    let since = Utc::now() - Duration::days(window_days);
    let series = results::result_series(pool, schedule_id, since, 500)?;
    let scores: Vec<f64> = series.iter().map(|r| r.score).collect();
    Ok(analyze(&scores))
}

/// Best and worst performing schedules over a window.
pub fn performer_ranking(pool: &Pool, window_days: i64) -> Result<Option<PerformerRanking>> {
    let since = Utc::now() - Duration::days(window_days);
    let means = results::mean_scores_by_schedule(pool, since)?;
    Ok(rank_performers(&means))
}
