//! Natural-language tag resolution and timeseries query orchestration.
//!
//! - **resolution**: description → ranked candidates → confidence decision
//! - **confidence**: the score-distribution → label mapping and clarifying questions
//! - **time_expr**: relative and absolute time expressions
//! - **timeseries**: paginated reads, merge, summary and last-known fallback

pub mod confidence;
pub mod resolution;
pub mod time_expr;
pub mod timeseries;

pub use confidence::{clarifying_question, confidence_of};
pub use resolution::TagResolver;
pub use time_expr::{parse_time, TimeWindow};
pub use timeseries::{
    DataSource, QuerySummary, ResolvedTag, TagRef, TagStats, TimeseriesOrchestrator,
    TimeseriesQuery, TimeseriesResult,
};
