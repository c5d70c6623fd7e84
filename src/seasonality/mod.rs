//! Seasonal period detection for tariff series.
//!
//! Candidate periods come from a periodogram; each candidate is then
//! validated by the autocorrelation at that lag so spectral artifacts
//! (common in short, trending tariff series) are rejected.

use augurs_seasons::PeriodogramDetector;

/// Fewer points than this cannot show two full cycles of any period.
pub const MIN_DETECTION_POINTS: usize = 8;

/// Candidates below this fraction of the peak spectral power are noise.
const POWER_FLOOR: f64 = 0.01;

/// Autocorrelation a candidate must reach to count as a real season.
///
/// Trend-dominated series leak spectral power into long periods whose
/// autocorrelation can sit well above zero; those artifacts stay below
/// this bar while genuine cycles sit close to 1.
const MIN_STRENGTH: f64 = 0.5;

const MAX_CANDIDATES: usize = 10;

/// The strongest seasonal period in `values`, if any.
///
/// Returns `None` for series that are too short, constant, or whose
/// periodogram peaks do not survive autocorrelation validation. A
/// `Some(p)` means repeating every `p` observations is supported by
/// both the frequency and the time domain.
pub fn detect_season_length(values: &[f64]) -> Option<usize> {
    if values.len() < MIN_DETECTION_POINTS {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    if variance < 1e-10 {
        // Constant series.
        return None;
    }

    let detector = PeriodogramDetector::builder()
        .min_period(2)
        .max_period((values.len() / 2) as u32)
        .build();
    let periodogram = detector.periodogram(values);

    let max_power = periodogram
        .powers
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_power.is_finite() || max_power <= 0.0 {
        return None;
    }

    let mut candidates: Vec<(u32, f64)> = periodogram
        .periods
        .iter()
        .zip(periodogram.powers.iter())
        .filter(|(_, &power)| power > max_power * POWER_FLOOR)
        .map(|(&period, &power)| (period, power))
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(MAX_CANDIDATES);

    // Candidates come strongest spectral peak first; the first one whose
    // autocorrelation validates wins. Harmonics of the true period also
    // autocorrelate highly, but carry less spectral power.
    candidates
        .into_iter()
        .map(|(period, _)| {
            let strength = autocorrelation_at_lag(values, period as usize, mean, variance);
            (period as usize, strength)
        })
        .find(|&(_, strength)| strength > MIN_STRENGTH)
        .map(|(period, _)| period)
}

/// Autocorrelation of the series at `lag`, in [-1, 1].
fn autocorrelation_at_lag(values: &[f64], lag: usize, mean: f64, variance: f64) -> f64 {
    if lag >= values.len() || variance < 1e-10 {
        return 0.0;
    }

    let pairs = (values.len() - lag) as f64;
    let covariance: f64 = values[..values.len() - lag]
        .iter()
        .zip(values[lag..].iter())
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum::<f64>()
        / pairs;

    covariance / variance
}
