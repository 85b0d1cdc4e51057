/// Number of samples in one model window (5-minute spacing, one hour).
pub const WINDOW_LEN: usize = 12;

/// Input streams accepted by the prediction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Glucose,
    Basal,
    Bolus,
    Carbs,
    Activity,
    HeartRate,
    Gsr,
}

impl Stream {
    /// Fill value used when a stream has no samples at all.
    pub fn default_value(&self) -> f64 {
        match self {
            Stream::Glucose => 120.0,
            Stream::HeartRate => 70.0,
            Stream::Gsr => 1.0,
            Stream::Basal | Stream::Bolus | Stream::Carbs | Stream::Activity => 0.0,
        }
    }
}

/// Resample `values` to exactly `target_len` points.
///
/// Longer inputs keep their most recent `target_len` samples, an empty input
/// becomes `target_len` copies of `default`, and shorter inputs are stretched
/// by linear interpolation: output index `i` reads source position
/// `i * n / target_len`, blending the two neighbouring samples.
pub fn interpolate(values: &[f64], target_len: usize, default: f64) -> Vec<f64> {
    let n = values.len();

    if n >= target_len {
        return values[n - target_len..].to_vec();
    }
    if n == 0 {
        return vec![default; target_len];
    }

    (0..target_len)
        .map(|i| {
            let position = i as f64 * n as f64 / target_len as f64;
            let lower = (position.floor() as usize).min(n - 1);
            let upper = (lower + 1).min(n - 1);
            let fraction = position - lower as f64;
            values[lower] * (1.0 - fraction) + values[upper] * fraction
        })
        .collect()
}

/// Resample one stream to the model window using that stream's default.
pub fn normalize(stream: Stream, values: &[f64]) -> Vec<f64> {
    interpolate(values, WINDOW_LEN, stream.default_value())
}
