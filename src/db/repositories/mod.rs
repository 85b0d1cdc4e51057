pub mod recommendations;
pub mod telemetry;

pub use recommendations::UpsertOutcome;
