use ndarray::Array2;

use super::interpolate::{normalize, Stream};
use super::schema::FeatureSchema;

/// Trailing window used for rolling glucose statistics.
const ROLLING_WINDOW: usize = 12;
/// Previous steps that still contribute to insulin on board.
const IOB_LOOKBACK: usize = 12;
/// Previous steps that still contribute to carbs on board.
const COB_LOOKBACK: usize = 8;

/// Per-stream series already resampled to the model window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSeries {
    pub glucose: Vec<f64>,
    pub basal: Vec<f64>,
    pub bolus: Vec<f64>,
    pub carbs: Vec<f64>,
    pub heart_rate: Vec<f64>,
    pub gsr: Vec<f64>,
}

impl WindowSeries {
    /// Resample raw streams of any length to one model window each.
    pub fn from_raw(
        glucose: &[f64],
        basal: &[f64],
        bolus: &[f64],
        carbs: &[f64],
        heart_rate: &[f64],
        gsr: &[f64],
    ) -> Self {
        Self {
            glucose: normalize(Stream::Glucose, glucose),
            basal: normalize(Stream::Basal, basal),
            bolus: normalize(Stream::Bolus, bolus),
            carbs: normalize(Stream::Carbs, carbs),
            heart_rate: normalize(Stream::HeartRate, heart_rate),
            gsr: normalize(Stream::Gsr, gsr),
        }
    }

    pub fn len(&self) -> usize {
        self.glucose.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glucose.is_empty()
    }
}

/// Named feature columns for one window, before column selection and scaling.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    rows: usize,
    columns: Vec<(&'static str, Vec<f64>)>,
}

impl FeatureFrame {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Assemble a `(rows, schema.len())` matrix in schema order. Columns the
    /// frame does not produce are zero-filled.
    pub fn to_matrix(&self, schema: &FeatureSchema) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.rows, schema.len()));
        for (col, name) in schema.columns().iter().enumerate() {
            if let Some(values) = self.column(name) {
                for (row, value) in values.iter().enumerate() {
                    matrix[[row, col]] = *value;
                }
            }
        }
        matrix
    }
}

pub fn build_features(window: &WindowSeries) -> FeatureFrame {
    let change = glucose_change(&window.glucose);
    let acceleration = glucose_change(&change);

    FeatureFrame {
        rows: window.len(),
        columns: vec![
            ("cbg", window.glucose.clone()),
            ("glucose_change", change),
            ("glucose_acceleration", acceleration),
            ("glucose_rolling_mean_1h", rolling_mean(&window.glucose, ROLLING_WINDOW)),
            ("glucose_rolling_std_1h", rolling_std(&window.glucose, ROLLING_WINDOW)),
            ("basal", window.basal.clone()),
            ("bolus", window.bolus.clone()),
            ("carbInput", window.carbs.clone()),
            ("insulin_on_board", insulin_on_board(&window.bolus)),
            ("carbs_on_board", carbs_on_board(&window.carbs)),
            ("hr", window.heart_rate.clone()),
            ("gsr", window.gsr.clone()),
        ],
    }
}

/// First difference with a leading zero.
pub fn glucose_change(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| if i == 0 { 0.0 } else { value - values[i - 1] })
        .collect()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let slice = trailing(values, i, window);
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Sample standard deviation over the trailing window; 0 for a single sample.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let slice = trailing(values, i, window);
            if slice.len() < 2 {
                return 0.0;
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let variance = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (slice.len() - 1) as f64;
            variance.sqrt()
        })
        .collect()
}

fn trailing(values: &[f64], end: usize, window: usize) -> &[f64] {
    let start = (end + 1).saturating_sub(window);
    &values[start..=end]
}

/// Fraction of a bolus still active `steps` samples (5 min each) after dosing.
pub fn insulin_decay_weight(steps: usize) -> f64 {
    match steps {
        0..=3 => 0.9,
        4..=6 => 0.8,
        7..=12 => 0.7,
        13..=24 => 0.5,
        25..=36 => 0.3,
        37..=48 => 0.1,
        _ => 0.0,
    }
}

/// Fraction of a carb intake still unabsorbed `steps` samples after eating.
pub fn carb_decay_weight(steps: usize) -> f64 {
    match steps {
        0..=2 => 0.8,
        3..=4 => 0.5,
        5..=6 => 0.2,
        _ => 0.05,
    }
}

pub fn insulin_on_board(bolus: &[f64]) -> Vec<f64> {
    on_board(bolus, IOB_LOOKBACK, insulin_decay_weight)
}

pub fn carbs_on_board(carbs: &[f64]) -> Vec<f64> {
    on_board(carbs, COB_LOOKBACK, carb_decay_weight)
}

fn on_board(values: &[f64], lookback: usize, weight: fn(usize) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let residual: f64 = (i.saturating_sub(lookback)..i)
                .map(|j| values[j] * weight(i - j))
                .sum();
            values[i] + residual
        })
        .collect()
}
