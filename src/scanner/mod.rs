//! Catalyst-driven scanner: news as the primary driver, market data as the
//! validator.

pub mod market_data;
pub mod scoring;
pub mod service;

pub use market_data::{HttpMarketData, MarketData};
pub use scoring::TierWeights;
pub use service::CatalystScanner;
