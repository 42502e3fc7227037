pub mod api;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod scanner;
pub mod services;
pub mod sources;
pub mod util;

pub use collector::NewsCollector;
pub use config::AppConfig;
pub use coordinator::{CycleCoordinator, OutcomeSweeper, Scheduler};
pub use error::{CatalystError, Result};
pub use persistence::{Cache, MemoryStore, Persistence, PostgresStore, RuntimeSettings};
pub use scanner::CatalystScanner;
pub use services::{HealthMonitor, Metrics};
