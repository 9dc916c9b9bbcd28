// Detection side: skew estimate, pairwise detector, sinks, counters
pub mod detector;
pub mod sink;
pub mod skew;
pub mod stats;
pub mod types;
