//! Fixed-window feature pipeline: resampling raw streams and deriving the
//! model's feature matrix.

pub mod features;
pub mod interpolate;
pub mod schema;

pub use features::{build_features, FeatureFrame, WindowSeries};
pub use interpolate::{interpolate, normalize, Stream, WINDOW_LEN};
pub use schema::{FeatureSchema, DEFAULT_FEATURE_COLUMNS};
