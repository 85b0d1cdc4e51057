use crate::db::GlucoseTrend;
use crate::inference::Estimate;

const URGENT_LOW: &str =
    "URGENT: Current glucose level is low. Consume 15-20g of fast-acting carbohydrates immediately.";
const URGENT_HIGH: &str = "Your glucose is currently high. Check ketones if over 240 mg/dL. \
     Consider taking correction insulin as advised by your healthcare provider.";
const MODERATE_HYPER: &str =
    "Moderate risk of high blood sugar. Be mindful of carb intake and insulin timing.";
const STABLE: &str = "Your glucose levels appear stable. Continue with regular monitoring.";

const IMMINENT_MINUTES: f64 = 30.0;

/// Immediate recommendation text. The first matching rule wins, ordered from
/// most to least urgent.
pub fn immediate_recommendation(estimate: &Estimate) -> String {
    let Estimate {
        current_glucose,
        hypo_probability,
        hyper_probability,
        time_to_hypo,
        time_to_hyper,
        ..
    } = *estimate;

    if current_glucose < 70.0 {
        return URGENT_LOW.to_string();
    }
    if current_glucose > 180.0 {
        return URGENT_HIGH.to_string();
    }
    if hypo_probability > 0.7 && time_to_hypo < IMMINENT_MINUTES {
        return format!(
            "WARNING: High risk of hypoglycemia in approximately {} minutes. \
             Consider consuming 15g of carbohydrates to prevent low blood sugar.",
            whole_minutes(time_to_hypo)
        );
    }
    if hyper_probability > 0.7 && time_to_hyper < IMMINENT_MINUTES {
        return format!(
            "ALERT: High risk of hyperglycemia in approximately {} minutes. \
             Check for missed insulin doses or recent high-carb meals.",
            whole_minutes(time_to_hyper)
        );
    }
    if hypo_probability > 0.3 {
        return format!(
            "Moderate risk of low blood sugar. Monitor closely over the next {} minutes.",
            whole_minutes(time_to_hypo)
        );
    }
    if hyper_probability > 0.3 {
        return MODERATE_HYPER.to_string();
    }
    STABLE.to_string()
}

fn whole_minutes(minutes: f64) -> i64 {
    minutes.trunc() as i64
}

/// Coarse trend label sent to the recommendation service.
pub fn trend_label(estimate: &Estimate) -> GlucoseTrend {
    GlucoseTrend::from_probabilities(estimate.hypo_probability, estimate.hyper_probability)
}
