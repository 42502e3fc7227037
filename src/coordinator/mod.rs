//! Cycle Coordinator
//!
//! Drives the end-to-end news-driven workflow on a market-time-aware
//! schedule: collect -> scan -> analyze -> signal -> execute -> finalize,
//! with collaborator health checks and the outcome-feedback sweep.

pub mod collaborators;
pub mod coordinator;
pub mod outcomes;
pub mod scheduler;

pub use collaborators::{
    Collaborators, HttpCollaborators, PatternReport, TradeExecution, TradeSignal,
};
pub use coordinator::CycleCoordinator;
pub use outcomes::OutcomeSweeper;
pub use scheduler::{ScheduleWindows, Scheduler};
