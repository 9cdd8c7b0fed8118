//! Dashboard and statistics aggregation over an athlete's tagged sessions.

pub mod dashboard;
pub mod stats;

pub use dashboard::{
    build_dashboard, load_dashboard, AthleteDashboard, DashboardSummary, RecentSession, TagUsage,
};
pub use stats::{
    compute_stats, format_rate, AthleteStats, NamedCount, OutcomeRate, OutcomeTally, TrendPoint,
};
