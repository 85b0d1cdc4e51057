//! Risk inference: a trained model when its artifacts load, deterministic
//! rules otherwise.

pub mod engine;
pub mod model;
pub mod rules;

pub use engine::{
    Estimate, InferenceEngine, InferenceStrategy, InsulinSeries, PredictionInput,
    PredictionSource, RiskLevel,
};
pub use model::{FittedScaler, LinearReadout, ModelArtifacts, ModelBackend};
