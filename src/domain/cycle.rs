//! Trading cycle records and the cycle state machine vocabulary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::news::CollectionMode;
use crate::error::{CatalystError, Result};

/// Terminal-or-running status of a cycle. Transitions are
/// `running -> completed | failed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ordered stages of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Collect,
    Scan,
    Analyze,
    Signal,
    Execute,
    Finalize,
}

impl CycleStage {
    pub const ORDER: [CycleStage; 6] = [
        Self::Collect,
        Self::Scan,
        Self::Analyze,
        Self::Signal,
        Self::Execute,
        Self::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Scan => "scan",
            Self::Analyze => "analyze",
            Self::Signal => "signal",
            Self::Execute => "execute",
            Self::Finalize => "finalize",
        }
    }

    pub fn next(&self) -> Option<CycleStage> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Completed,
    /// Some work items failed after retries; the cycle proceeds.
    Partial,
    Failed,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Per-stage record counters carried on the cycle row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    pub news_collected: i64,
    pub candidates_selected: i64,
    pub patterns_analyzed: i64,
    pub signals_generated: i64,
    pub trades_executed: i64,
}

/// One coordinator run, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCycle {
    pub cycle_id: String,
    pub mode: CollectionMode,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counters: StageCounters,
    pub cycle_pnl: Option<Decimal>,
    pub success_rate: Option<f64>,
    pub failure_reason: Option<String>,
}

impl TradingCycle {
    pub fn begin(cycle_id: String, mode: CollectionMode, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            mode,
            status: CycleStatus::Running,
            started_at,
            ended_at: None,
            counters: StageCounters::default(),
            cycle_pnl: None,
            success_rate: None,
            failure_reason: None,
        }
    }

    /// Enforce the one-way `running -> completed|failed` transition.
    pub fn transition(&mut self, to: CycleStatus, at: DateTime<Utc>) -> Result<()> {
        if self.status != CycleStatus::Running || to == CycleStatus::Running {
            return Err(CatalystError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.ended_at = Some(at);
        Ok(())
    }
}

/// Live view of the active cycle served by `GET /current_cycle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleView {
    pub cycle_id: String,
    pub mode: CollectionMode,
    pub status: CycleStatus,
    pub stage: CycleStage,
    pub counters: StageCounters,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
}

/// Per-stage audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub cycle_id: String,
    pub stage: CycleStage,
    pub outcome: StageOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub records: i64,
    pub error: Option<String>,
}

impl WorkflowLogEntry {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_linear() {
        assert_eq!(CycleStage::Collect.next(), Some(CycleStage::Scan));
        assert_eq!(CycleStage::Execute.next(), Some(CycleStage::Finalize));
        assert_eq!(CycleStage::Finalize.next(), None);
    }

    #[test]
    fn cycle_transitions_are_one_way() {
        let mut cycle =
            TradingCycle::begin("CYCLE_TEST".into(), CollectionMode::Normal, Utc::now());
        cycle.transition(CycleStatus::Completed, Utc::now()).unwrap();
        assert!(cycle.status.is_terminal());
        assert!(cycle.ended_at.is_some());

        // A terminal cycle rejects further transitions.
        assert!(cycle.transition(CycleStatus::Failed, Utc::now()).is_err());
    }

    #[test]
    fn running_to_running_rejected() {
        let mut cycle =
            TradingCycle::begin("CYCLE_TEST".into(), CollectionMode::Normal, Utc::now());
        assert!(cycle.transition(CycleStatus::Running, Utc::now()).is_err());
    }
}
