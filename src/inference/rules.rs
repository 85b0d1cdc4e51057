//! Deterministic scoring from the current glucose level and its short-term
//! trend, adjusted for recent carbs and bolus insulin.

use super::engine::{Estimate, PredictionSource};

const HYPO_THRESHOLD: f64 = 70.0;
const HYPER_THRESHOLD: f64 = 180.0;
const CARB_LOAD_GRAMS: f64 = 30.0;
const BOLUS_LOAD_UNITS: f64 = 2.0;

/// Average per-step change between the newest and third-newest reading.
/// Readings are ordered oldest first.
pub fn short_term_trend(glucose: &[f64]) -> f64 {
    match glucose {
        [.., third, _, last] => (last - third) / 2.0,
        _ => 0.0,
    }
}

fn hypo_probability(current: f64, trend: f64) -> f64 {
    if current < HYPO_THRESHOLD {
        0.9
    } else if current < 80.0 && trend < -1.0 {
        0.7
    } else if current < 90.0 && trend < 0.0 {
        0.5
    } else if current < 100.0 && trend < -2.0 {
        0.4
    } else {
        (1.0 - current / 120.0).clamp(0.1, 0.3)
    }
}

fn hyper_probability(current: f64, trend: f64) -> f64 {
    if current > HYPER_THRESHOLD {
        0.9
    } else if current > 160.0 && trend > 1.0 {
        0.7
    } else if current > 140.0 && trend > 0.0 {
        0.5
    } else if current > 120.0 && trend > 2.0 {
        0.4
    } else {
        (current / 200.0).clamp(0.1, 0.3)
    }
}

fn sum_last_three(values: &[f64]) -> f64 {
    values.iter().rev().take(3).sum()
}

/// Score a window. `glucose` must be non-empty; the caller enforces the minimum.
pub fn score(glucose: &[f64], carbs: &[f64], bolus: &[f64]) -> Estimate {
    let current = glucose.last().copied().unwrap_or_default();
    let trend = short_term_trend(glucose);

    let mut hypo = hypo_probability(current, trend);
    let mut hyper = hyper_probability(current, trend);

    if sum_last_three(carbs) > CARB_LOAD_GRAMS {
        hyper = (hyper + 0.2).min(0.95);
        hypo = (hypo - 0.1).max(0.05);
    }
    if sum_last_three(bolus) > BOLUS_LOAD_UNITS {
        hypo = (hypo + 0.2).min(0.95);
        hyper = (hyper - 0.1).max(0.05);
    }

    let time_to_hypo = if current < HYPO_THRESHOLD {
        0.0
    } else {
        (current - HYPO_THRESHOLD) * if trend < 0.0 { 3.0 } else { 5.0 }
    };
    let time_to_hyper = if current > HYPER_THRESHOLD {
        0.0
    } else {
        (HYPER_THRESHOLD - current) * if trend > 0.0 { 3.0 } else { 5.0 }
    };

    Estimate {
        current_glucose: current,
        hypo_probability: hypo.clamp(0.0, 1.0),
        hyper_probability: hyper.clamp(0.0, 1.0),
        time_to_hypo,
        time_to_hyper,
        source: PredictionSource::Rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn trend_needs_three_points() {
        assert_eq!(short_term_trend(&[100.0, 110.0]), 0.0);
        assert_eq!(short_term_trend(&[90.0, 100.0, 104.0, 110.0]), 5.0);
    }

    #[test]
    fn low_glucose_is_already_hypo() {
        let estimate = score(&[80.0, 70.0, 62.0, 55.0], &[], &[]);
        assert_eq!(estimate.hypo_probability, 0.9);
        assert_eq!(estimate.time_to_hypo, 0.0);
        assert!(close(estimate.hyper_probability, 0.275));
    }

    #[test]
    fn falling_toward_low_shortens_time_to_hypo() {
        // trend = (78 - 84) / 2 = -3
        let estimate = score(&[84.0, 81.0, 78.0], &[], &[]);
        assert_eq!(estimate.hypo_probability, 0.7);
        assert!(close(estimate.time_to_hypo, 24.0));
        assert!(close(estimate.time_to_hyper, 510.0));
    }

    #[test]
    fn rising_above_140_is_moderate_hyper() {
        let estimate = score(&[146.0, 148.0, 150.0], &[], &[]);
        assert_eq!(estimate.hyper_probability, 0.5);
        assert_eq!(estimate.hypo_probability, 0.1);
        assert!(close(estimate.time_to_hyper, 90.0));
    }

    #[test]
    fn recent_carbs_shift_risk_toward_hyper() {
        let estimate = score(&[150.0, 150.0, 150.0], &[5.0, 20.0, 15.0], &[]);
        // base hyper 0.3 -> 0.5, base hypo 0.1 -> floor 0.05
        assert!(close(estimate.hyper_probability, 0.5));
        assert!(close(estimate.hypo_probability, 0.05));
    }

    #[test]
    fn only_last_three_boluses_count() {
        let heavy_early = score(&[150.0; 12], &[], &[5.0, 0.5, 0.5, 0.5]);
        assert!(close(heavy_early.hypo_probability, 0.1));

        let heavy_recent = score(&[150.0; 12], &[], &[0.0, 1.0, 1.0, 1.0]);
        assert!(close(heavy_recent.hypo_probability, 0.3));
        assert!(close(heavy_recent.hyper_probability, 0.2));
    }

    #[test]
    fn adjustments_are_capped() {
        let estimate = score(&[200.0, 200.0, 200.0], &[40.0], &[]);
        assert_eq!(estimate.hyper_probability, 0.95);
        assert_eq!(estimate.time_to_hyper, 0.0);
    }
}
