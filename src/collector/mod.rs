//! News collection: multi-source fan-out, normalization, deduplication,
//! confirmation tracking, and coordinated-narrative detection.

pub mod confirm;
pub mod narratives;
pub mod normalize;
pub mod service;

pub use confirm::EarlyMinutesBasis;
pub use normalize::Normalizer;
pub use service::NewsCollector;
