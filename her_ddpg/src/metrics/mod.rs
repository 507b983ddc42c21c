//! Training and test summaries.

pub mod logger;

pub use logger::{
    CSVLogger, ConsoleLogger, EpisodeCounters, MetricsLogger, MultiLogger, SummaryEvent,
};
