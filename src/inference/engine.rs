use std::path::Path;

use log::{info, warn};
use ndarray::{array, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, PredictionError};
use crate::preprocessing::{build_features, normalize, Stream, WindowSeries, WINDOW_LEN};

use super::model::ModelArtifacts;
use super::rules;

/// Probability above which a time-to-event estimate is reported.
pub const REPORT_THRESHOLD: f64 = 0.3;
const HIGH_RISK_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability > HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if probability > REPORT_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Which strategy produced a prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Rules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InsulinSeries {
    #[serde(default)]
    pub basal: Vec<f64>,
    #[serde(default)]
    pub bolus: Vec<f64>,
}

/// Raw telemetry series for one prediction, each ordered oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PredictionInput {
    #[serde(default)]
    pub glucose_readings: Vec<f64>,
    #[serde(default)]
    pub insulin: InsulinSeries,
    #[serde(default)]
    pub carbs: Vec<f64>,
    #[serde(default)]
    pub activity: Vec<f64>,
    #[serde(default)]
    pub heart_rate: Vec<f64>,
    #[serde(default)]
    pub gsr: Vec<f64>,
}

impl PredictionInput {
    /// Every stream resampled to exactly one model window.
    pub fn interpolated(&self) -> Self {
        Self {
            glucose_readings: normalize(Stream::Glucose, &self.glucose_readings),
            insulin: InsulinSeries {
                basal: normalize(Stream::Basal, &self.insulin.basal),
                bolus: normalize(Stream::Bolus, &self.insulin.bolus),
            },
            carbs: normalize(Stream::Carbs, &self.carbs),
            activity: normalize(Stream::Activity, &self.activity),
            heart_rate: normalize(Stream::HeartRate, &self.heart_rate),
            gsr: normalize(Stream::Gsr, &self.gsr),
        }
    }

    pub fn validate(&self) -> Result<(), PredictionError> {
        if let Some(value) = self.glucose_readings.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(PredictionError::InvalidInput(format!(
                "glucose readings must be positive numbers, got {value}"
            )));
        }

        let streams: [(&str, &[f64]); 6] = [
            ("insulin.basal", self.insulin.basal.as_slice()),
            ("insulin.bolus", self.insulin.bolus.as_slice()),
            ("carbs", self.carbs.as_slice()),
            ("activity", self.activity.as_slice()),
            ("heart_rate", self.heart_rate.as_slice()),
            ("gsr", self.gsr.as_slice()),
        ];
        for (name, values) in streams {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(PredictionError::InvalidInput(format!(
                    "{name} contains a non-finite value"
                )));
            }
        }
        Ok(())
    }

    fn window(&self) -> WindowSeries {
        WindowSeries::from_raw(
            &self.glucose_readings,
            &self.insulin.basal,
            &self.insulin.bolus,
            &self.carbs,
            &self.heart_rate,
            &self.gsr,
        )
    }
}

/// Unbanded strategy output. Time values are always present here; reporting
/// drops them below `REPORT_THRESHOLD`.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub current_glucose: f64,
    pub hypo_probability: f64,
    pub hyper_probability: f64,
    pub time_to_hypo: f64,
    pub time_to_hyper: f64,
    pub source: PredictionSource,
}

impl Estimate {
    pub fn hypo_risk(&self) -> RiskLevel {
        RiskLevel::from_probability(self.hypo_probability)
    }

    pub fn hyper_risk(&self) -> RiskLevel {
        RiskLevel::from_probability(self.hyper_probability)
    }

    pub fn reported_time_to_hypo(&self) -> Option<f64> {
        (self.hypo_probability > REPORT_THRESHOLD).then_some(self.time_to_hypo)
    }

    pub fn reported_time_to_hyper(&self) -> Option<f64> {
        (self.hyper_probability > REPORT_THRESHOLD).then_some(self.time_to_hyper)
    }
}

pub enum InferenceStrategy {
    Model(ModelArtifacts),
    Rules,
}

pub struct InferenceEngine {
    strategy: InferenceStrategy,
}

impl InferenceEngine {
    pub fn new(strategy: InferenceStrategy) -> Self {
        Self { strategy }
    }

    pub fn rules_only() -> Self {
        Self::new(InferenceStrategy::Rules)
    }

    /// Prefer the model in `model_dir`; any load failure selects the rules.
    pub fn from_model_dir(model_dir: Option<&Path>) -> Self {
        let Some(dir) = model_dir else {
            info!("No model directory configured; using rule-based predictions");
            return Self::rules_only();
        };

        match ModelArtifacts::load(dir) {
            Ok(artifacts) => {
                info!(
                    "Loaded {} model from {} ({} features)",
                    artifacts.backend().backend_type(),
                    dir.display(),
                    artifacts.schema().len()
                );
                Self::new(InferenceStrategy::Model(artifacts))
            }
            Err(err) => {
                warn!("Model unavailable ({err}); using rule-based predictions");
                Self::rules_only()
            }
        }
    }

    pub fn uses_model(&self) -> bool {
        matches!(self.strategy, InferenceStrategy::Model(_))
    }

    /// Estimate risk for the most recent window. Needs at least `WINDOW_LEN`
    /// glucose readings; shorter inputs must go through `interpolated` first.
    pub fn estimate(&self, input: &PredictionInput) -> Result<Estimate, PredictionError> {
        let found = input.glucose_readings.len();
        if found < WINDOW_LEN {
            return Err(PredictionError::InsufficientData {
                required: WINDOW_LEN,
                found,
            });
        }
        input.validate()?;

        if let InferenceStrategy::Model(artifacts) = &self.strategy {
            match run_model(artifacts, input) {
                Ok(estimate) => return Ok(estimate),
                Err(err) => warn!("Model prediction failed ({err}); falling back to rules"),
            }
        }

        Ok(rules::score(
            &input.glucose_readings,
            &input.carbs,
            &input.insulin.bolus,
        ))
    }
}

fn run_model(artifacts: &ModelArtifacts, input: &PredictionInput) -> Result<Estimate, ModelError> {
    let frame = build_features(&input.window());
    let matrix = frame.to_matrix(artifacts.schema());
    let scaled = artifacts.feature_scaler().transform(&matrix)?;
    let tensor = scaled.insert_axis(Axis(0));

    let output = artifacts.backend().predict(tensor.view())?;
    if output.len() != super::model::OUTPUT_LEN {
        return Err(ModelError::Shape(format!(
            "model returned {} outputs",
            output.len()
        )));
    }
    if output.iter().any(|value| !value.is_finite()) {
        return Err(ModelError::NonFinite);
    }

    let times = artifacts
        .regression_scaler()
        .inverse_transform(&array![[output[2], output[3]]])?;

    let current_glucose = input
        .glucose_readings
        .last()
        .copied()
        .ok_or_else(|| ModelError::Shape("empty glucose window".into()))?;

    Ok(Estimate {
        current_glucose,
        hypo_probability: output[0].clamp(0.0, 1.0),
        hyper_probability: output[1].clamp(0.0, 1.0),
        time_to_hypo: times[[0, 0]].max(0.0),
        time_to_hyper: times[[0, 1]].max(0.0),
        source: PredictionSource::Model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::{FittedScaler, LinearReadout, ModelBackend, OUTPUT_LEN};
    use crate::preprocessing::FeatureSchema;
    use ndarray::{Array1, ArrayView3};

    fn input(glucose: Vec<f64>) -> PredictionInput {
        PredictionInput {
            glucose_readings: glucose,
            ..Default::default()
        }
    }

    fn identity(width: usize) -> FittedScaler {
        FittedScaler::Standard {
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        }
    }

    fn constant_model(bias: [f64; 4]) -> InferenceEngine {
        let schema = FeatureSchema::default();
        let width = WINDOW_LEN * schema.len();
        let readout = LinearReadout::new(vec![vec![0.0; width]; OUTPUT_LEN], bias.to_vec()).unwrap();
        let artifacts = ModelArtifacts::new(
            Box::new(readout),
            identity(schema.len()),
            FittedScaler::Standard {
                mean: vec![0.0, 0.0],
                scale: vec![10.0, 10.0],
            },
            schema,
        )
        .unwrap();
        InferenceEngine::new(InferenceStrategy::Model(artifacts))
    }

    struct BrokenBackend;

    impl ModelBackend for BrokenBackend {
        fn predict(&self, _window: ArrayView3<f64>) -> Result<Array1<f64>, ModelError> {
            Ok(Array1::from_vec(vec![f64::NAN; 4]))
        }

        fn input_width(&self) -> Option<usize> {
            None
        }

        fn backend_type(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn short_glucose_series_is_rejected() {
        let err = InferenceEngine::rules_only()
            .estimate(&input(vec![120.0; 11]))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InsufficientData { required: 12, found: 11 }
        ));
    }

    #[test]
    fn non_positive_glucose_is_invalid() {
        let mut readings = vec![120.0; 12];
        readings[4] = 0.0;
        let err = InferenceEngine::rules_only().estimate(&input(readings)).unwrap_err();
        assert!(matches!(err, PredictionError::InvalidInput(_)));
    }

    #[test]
    fn risk_bands_use_strict_cuts() {
        assert_eq!(RiskLevel::from_probability(0.71), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.3), RiskLevel::Low);
    }

    #[test]
    fn times_are_hidden_below_report_threshold() {
        let estimate = InferenceEngine::rules_only()
            .estimate(&input(vec![150.0; 12]))
            .unwrap();
        assert_eq!(estimate.reported_time_to_hypo(), None);
        assert_eq!(estimate.reported_time_to_hyper(), None);
        assert_eq!(estimate.time_to_hyper, 150.0);
    }

    #[test]
    fn model_outputs_are_clamped_and_unscaled() {
        // logistic(10) ~ 1, logistic(-10) ~ 0; time heads scaled back by 10.
        let engine = constant_model([10.0, -10.0, 4.5, -2.0]);
        assert!(engine.uses_model());

        let estimate = engine.estimate(&input(vec![110.0; 12])).unwrap();
        assert_eq!(estimate.source, PredictionSource::Model);
        assert!(estimate.hypo_probability > 0.99);
        assert!(estimate.hyper_probability < 0.01);
        assert!((estimate.time_to_hypo - 45.0).abs() < 1e-9);
        assert_eq!(estimate.time_to_hyper, 0.0);
        assert_eq!(estimate.current_glucose, 110.0);
    }

    #[test]
    fn failing_model_falls_back_for_that_call() {
        let schema = FeatureSchema::default();
        let artifacts = ModelArtifacts::new(
            Box::new(BrokenBackend),
            identity(schema.len()),
            identity(2),
            schema,
        )
        .unwrap();
        let engine = InferenceEngine::new(InferenceStrategy::Model(artifacts));

        let estimate = engine.estimate(&input(vec![55.0; 12])).unwrap();
        assert_eq!(estimate.source, PredictionSource::Rules);
        assert_eq!(estimate.hypo_probability, 0.9);
        assert!(engine.uses_model());
    }

    #[test]
    fn missing_model_dir_selects_rules() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!InferenceEngine::from_model_dir(Some(dir.path())).uses_model());
        assert!(!InferenceEngine::from_model_dir(None).uses_model());
    }

    #[test]
    fn interpolation_fills_short_streams() {
        let short = PredictionInput {
            glucose_readings: vec![100.0, 110.0],
            heart_rate: vec![],
            ..Default::default()
        };
        let window = short.interpolated();
        assert_eq!(window.glucose_readings.len(), WINDOW_LEN);
        assert_eq!(window.heart_rate, vec![70.0; WINDOW_LEN]);
        assert!(InferenceEngine::rules_only().estimate(&window).is_ok());
    }
}
