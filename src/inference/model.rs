//! Trained model artifacts: the numeric readout and its two fitted scalers.
//!
//! Artifacts live in a directory of JSON files. Loading never panics; any
//! missing or malformed file surfaces as a `ModelError` so the engine can fall
//! back to the rule strategy.

use std::{fs, path::Path};

use ndarray::{Array1, Array2, ArrayView3};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ModelError;
use crate::preprocessing::{FeatureSchema, WINDOW_LEN};

pub const MODEL_FILE: &str = "model.json";
pub const FEATURE_SCALER_FILE: &str = "feature_scaler.json";
pub const REGRESSION_SCALER_FILE: &str = "regression_scaler.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";

/// Outputs: hypo probability, hyper probability, scaled time to hypo, scaled
/// time to hyper.
pub const OUTPUT_LEN: usize = 4;
const REGRESSION_TARGETS: usize = 2;

/// A numeric function from a `(1, W, F)` window tensor to the four outputs.
pub trait ModelBackend: Send + Sync {
    fn predict(&self, window: ArrayView3<f64>) -> Result<Array1<f64>, ModelError>;

    /// Flattened input width the backend was fitted for, if fixed.
    fn input_width(&self) -> Option<usize>;

    fn backend_type(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearReadoutFile {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

/// Dense readout over the flattened window. The two probability heads are
/// passed through a logistic function; the time heads are left linear.
#[derive(Debug, Clone)]
pub struct LinearReadout {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearReadout {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Result<Self, ModelError> {
        if weights.len() != OUTPUT_LEN || bias.len() != OUTPUT_LEN {
            return Err(ModelError::Shape(format!(
                "readout needs {OUTPUT_LEN} weight rows and biases, got {} and {}",
                weights.len(),
                bias.len()
            )));
        }

        let width = weights[0].len();
        if width == 0 || weights.iter().any(|row| row.len() != width) {
            return Err(ModelError::Shape("readout weight rows must share a non-zero width".into()));
        }

        let flat: Vec<f64> = weights.into_iter().flatten().collect();
        if flat.iter().chain(bias.iter()).any(|value| !value.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        let weights = Array2::from_shape_vec((OUTPUT_LEN, width), flat)
            .map_err(|err| ModelError::Shape(err.to_string()))?;

        Ok(Self {
            weights,
            bias: Array1::from_vec(bias),
        })
    }

    fn from_file(file: LinearReadoutFile) -> Result<Self, ModelError> {
        Self::new(file.weights, file.bias)
    }
}

fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

impl ModelBackend for LinearReadout {
    fn predict(&self, window: ArrayView3<f64>) -> Result<Array1<f64>, ModelError> {
        let width = self.weights.ncols();
        if window.len() != width {
            return Err(ModelError::Shape(format!(
                "expected {width} inputs, got {} (shape {:?})",
                window.len(),
                window.shape()
            )));
        }

        let input: Array1<f64> = window.iter().copied().collect();
        let mut output = self.weights.dot(&input) + &self.bias;
        output[0] = logistic(output[0]);
        output[1] = logistic(output[1]);

        if output.iter().any(|value| !value.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(output)
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.weights.ncols())
    }

    fn backend_type(&self) -> &str {
        "linear_readout"
    }
}

/// Column-wise scaler fitted at training time.
///
/// `standard`: `(x - mean) / scale`. `min_max`: `x * scale + min`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl FittedScaler {
    pub fn width(&self) -> usize {
        match self {
            FittedScaler::Standard { mean, .. } => mean.len(),
            FittedScaler::MinMax { min, .. } => min.len(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ModelError> {
        let (offset, scale) = match self {
            FittedScaler::Standard { mean, scale } => (mean, scale),
            FittedScaler::MinMax { min, scale } => (min, scale),
        };
        if offset.len() != scale.len() {
            return Err(ModelError::Shape(format!(
                "{name}: offset has {} columns but scale has {}",
                offset.len(),
                scale.len()
            )));
        }
        if offset.iter().chain(scale.iter()).any(|value| !value.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(())
    }

    fn check_width(&self, matrix: &Array2<f64>) -> Result<(), ModelError> {
        if matrix.ncols() != self.width() {
            return Err(ModelError::Shape(format!(
                "scaler fitted on {} columns, got {}",
                self.width(),
                matrix.ncols()
            )));
        }
        Ok(())
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for (col, mut column) in out.columns_mut().into_iter().enumerate() {
            match self {
                FittedScaler::Standard { mean, scale } => {
                    let divisor = non_zero(scale[col]);
                    column.mapv_inplace(|x| (x - mean[col]) / divisor);
                }
                FittedScaler::MinMax { min, scale } => {
                    column.mapv_inplace(|x| x * scale[col] + min[col]);
                }
            }
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_width(matrix)?;
        let mut out = matrix.clone();
        for (col, mut column) in out.columns_mut().into_iter().enumerate() {
            match self {
                FittedScaler::Standard { mean, scale } => {
                    let factor = non_zero(scale[col]);
                    column.mapv_inplace(|x| x * factor + mean[col]);
                }
                FittedScaler::MinMax { min, scale } => {
                    let divisor = non_zero(scale[col]);
                    column.mapv_inplace(|x| (x - min[col]) / divisor);
                }
            }
        }
        Ok(out)
    }
}

// Constant training columns are stored with a zero scale.
fn non_zero(scale: f64) -> f64 {
    if scale == 0.0 {
        1.0
    } else {
        scale
    }
}

/// Everything the model strategy needs. Constructed only when the backend and
/// both scalers are present and agree on shape.
pub struct ModelArtifacts {
    backend: Box<dyn ModelBackend>,
    feature_scaler: FittedScaler,
    regression_scaler: FittedScaler,
    schema: FeatureSchema,
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifacts")
            .field("backend", &self.backend.backend_type())
            .field("features", &self.schema.len())
            .finish()
    }
}

impl ModelArtifacts {
    pub fn new(
        backend: Box<dyn ModelBackend>,
        feature_scaler: FittedScaler,
        regression_scaler: FittedScaler,
        schema: FeatureSchema,
    ) -> Result<Self, ModelError> {
        feature_scaler.validate("feature scaler")?;
        regression_scaler.validate("regression scaler")?;

        if schema.is_empty() {
            return Err(ModelError::Shape("feature schema is empty".into()));
        }
        if feature_scaler.width() != schema.len() {
            return Err(ModelError::Shape(format!(
                "feature scaler has {} columns but schema has {}",
                feature_scaler.width(),
                schema.len()
            )));
        }
        if regression_scaler.width() != REGRESSION_TARGETS {
            return Err(ModelError::Shape(format!(
                "regression scaler must have {REGRESSION_TARGETS} columns, has {}",
                regression_scaler.width()
            )));
        }
        if let Some(width) = backend.input_width() {
            let expected = WINDOW_LEN * schema.len();
            if width != expected {
                return Err(ModelError::Shape(format!(
                    "model expects {width} inputs but window provides {expected}"
                )));
            }
        }

        Ok(Self {
            backend,
            feature_scaler,
            regression_scaler,
            schema,
        })
    }

    /// Load `model.json`, both scaler files and the optional column list from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(ModelError::Unavailable(format!(
                "no model at {}",
                model_path.display()
            )));
        }
        for scaler in [FEATURE_SCALER_FILE, REGRESSION_SCALER_FILE] {
            if !dir.join(scaler).exists() {
                return Err(ModelError::Unavailable(format!(
                    "missing {scaler} in {}",
                    dir.display()
                )));
            }
        }

        let readout = LinearReadout::from_file(read_json(&model_path)?)?;
        let feature_scaler: FittedScaler = read_json(&dir.join(FEATURE_SCALER_FILE))?;
        let regression_scaler: FittedScaler = read_json(&dir.join(REGRESSION_SCALER_FILE))?;

        let columns_path = dir.join(FEATURE_COLUMNS_FILE);
        let schema = if columns_path.exists() {
            read_json(&columns_path)?
        } else {
            FeatureSchema::default()
        };

        Self::new(Box::new(readout), feature_scaler, regression_scaler, schema)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn feature_scaler(&self) -> &FittedScaler {
        &self.feature_scaler
    }

    pub fn regression_scaler(&self) -> &FittedScaler {
        &self.regression_scaler
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
