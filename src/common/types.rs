use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;

/// A single time series of (date, value) pairs for one selection tuple.
///
/// Derived from fact-table rows per request and discarded afterwards;
/// dates are ascending because the fact table is kept date-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// The leading `n` observations, for holdout evaluation.
    pub fn head(&self, n: usize) -> TimeSeries {
        TimeSeries {
            dates: self.dates.iter().take(n).copied().collect(),
            values: self.values.iter().take(n).copied().collect(),
        }
    }
}

/// One (date, value) observation, as emitted in page payloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// The result of one forecasting model: point estimates and interval
/// bounds aligned to a sequence of future dates, all of equal length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub dates: Vec<NaiveDate>,
    pub points: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Sampling frequency of a series, inferred from the spacing of
/// consecutive dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// The date `periods` steps after `start` at this frequency.
    ///
    /// Month-based frequencies clamp day-of-month the way the calendar
    /// requires (Jan 31 + 1 month = Feb 28/29); stepping is always taken
    /// from `start`, never cumulatively, so the axis stays contiguous.
    pub fn step(self, start: NaiveDate, periods: u32) -> NaiveDate {
        match self {
            Frequency::Daily => start + Duration::days(i64::from(periods)),
            Frequency::Weekly => start + Duration::days(7 * i64::from(periods)),
            Frequency::Monthly => add_months(start, periods),
            Frequency::Quarterly => add_months(start, 3 * periods),
            Frequency::Yearly => add_months(start, 12 * periods),
        }
    }

    /// Seasonal period length at this frequency, if one is meaningful.
    pub fn default_season_length(self) -> Option<usize> {
        match self {
            Frequency::Daily => Some(7),
            Frequency::Monthly => Some(12),
            Frequency::Quarterly => Some(4),
            Frequency::Weekly | Frequency::Yearly => None,
        }
    }
}

fn add_months(start: NaiveDate, months: u32) -> NaiveDate {
    // Only fails beyond the representable date range, far outside any
    // realistic tariff horizon.
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Infer the sampling frequency from the spacing of consecutive dates.
///
/// Uses the most common day-spacing (the mode), tolerating calendar
/// jitter: 28-31 day gaps are monthly, 7 weekly, and so on. Series that
/// are too short or irregular default to monthly, the cadence of the
/// tariff fact table.
pub fn infer_frequency(dates: &[NaiveDate]) -> Frequency {
    if dates.len() < 2 {
        return Frequency::Monthly;
    }

    let mut gaps: Vec<i64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();
    gaps.sort_unstable();

    // Mode of the sorted gaps.
    let mut best = (gaps[0], 0usize);
    let mut current = (gaps[0], 0usize);
    for &g in &gaps {
        if g == current.0 {
            current.1 += 1;
        } else {
            current = (g, 1);
        }
        if current.1 > best.1 {
            best = current;
        }
    }

    match best.0 {
        1 => Frequency::Daily,
        7 => Frequency::Weekly,
        28..=31 => Frequency::Monthly,
        84..=93 => Frequency::Quarterly,
        350..=380 => Frequency::Yearly,
        _ => Frequency::Monthly,
    }
}

/// Generate `horizon` future dates starting one step after `last`,
/// strictly increasing and contiguous at `freq`.
pub fn future_dates(last: NaiveDate, freq: Frequency, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon)
        .map(|i| freq.step(last, u32::try_from(i).unwrap_or(u32::MAX)))
        .collect()
}
