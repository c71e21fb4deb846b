//! Velocity trend classification (spec §4.8 stage 5): items/day, bucketed
//! into increasing / stable / decreasing / insufficient.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
    Insufficient,
}

const MIN_SAMPLES: usize = 4;
const STABLE_BAND: f64 = 0.15;

/// `dates` need not be sorted; velocity is computed by splitting the window
/// into two halves and comparing items/day in each.
pub fn classify_trend(dates: &[DateTime<Utc>]) -> Trend {
    if dates.len() < MIN_SAMPLES {
        return Trend::Insufficient;
    }
    let mut sorted = dates.to_vec();
    sorted.sort();

    let span_days = (sorted.last().unwrap().clone() - sorted.first().unwrap().clone()).num_seconds() as f64 / 86_400.0;
    if span_days <= 0.0 {
        return Trend::Insufficient;
    }

    let mid = sorted.len() / 2;
    let midpoint = sorted[mid];
    let first_half = mid as f64;
    let second_half = (sorted.len() - mid) as f64;

    let first_span = (midpoint - *sorted.first().unwrap()).num_seconds() as f64 / 86_400.0;
    let second_span = (*sorted.last().unwrap() - midpoint).num_seconds() as f64 / 86_400.0;

    let v1 = if first_span > 0.0 { first_half / first_span } else { first_half };
    let v2 = if second_span > 0.0 { second_half / second_span } else { second_half };

    if v1 == 0.0 && v2 == 0.0 {
        return Trend::Insufficient;
    }

    let ratio = (v2 - v1) / v1.max(v2).max(0.000_1);
    if ratio > STABLE_BAND {
        Trend::Increasing
    } else if ratio < -STABLE_BAND {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn too_few_samples_is_insufficient() {
        let now = Utc::now();
        assert_eq!(classify_trend(&[now, now - Duration::days(1)]), Trend::Insufficient);
    }

    #[test]
    fn increasing_velocity_detected() {
        let now = Utc::now();
        let dates: Vec<_> = (0..10)
            .map(|i| if i < 5 { now - Duration::days(30 - i) } else { now - Duration::days(5 - (i - 5)) })
            .collect();
        assert_eq!(classify_trend(&dates), Trend::Increasing);
    }

    #[test]
    fn stable_velocity_detected() {
        let now = Utc::now();
        let dates: Vec<_> = (0..8).map(|i| now - Duration::days(i * 4)).collect();
        assert_eq!(classify_trend(&dates), Trend::Stable);
    }
}
