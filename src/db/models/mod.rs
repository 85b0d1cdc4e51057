pub mod recommendation;
pub mod telemetry;

pub use recommendation::{
    PredictionSnapshot, RecommendationRecord, RecommendationRequest, RecommendationStatus,
};
pub use telemetry::{
    ActivityEntry, GlucosePoint, GlucoseReading, GlucoseTrend, InsulinDose, InsulinSummary,
    InsulinType, MealEntry, MealType, RecentContext, RecentTimeline, TelemetryKind,
    TelemetryQuery, TimelineEvent, VitalsEntry,
};
