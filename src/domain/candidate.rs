//! Scanner output types: market snapshots, trading candidates, scan results.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::news::{CollectionMode, KeywordCategory};

/// Point-in-time market data for one symbol, as returned by the market-data
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub volume: i64,
    pub relative_volume: f64,
    pub price_change_pct: f64,
    pub premarket_volume: Option<i64>,
    pub premarket_change_pct: Option<f64>,
}

/// Downstream lifecycle of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Selected,
    Analyzed,
    Traded,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::Analyzed => "analyzed",
            Self::Traded => "traded",
        }
    }
}

/// One ranked pick from a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCandidate {
    pub scan_id: Uuid,
    pub symbol: String,
    pub selected_at: DateTime<Utc>,

    // Catalyst evidence
    pub catalyst_score: f64,
    pub news_count: i64,
    /// Dominant catalyst category, or none for a baseline-universe pick.
    pub primary_catalyst: Option<KeywordCategory>,
    pub catalyst_keywords: Vec<KeywordCategory>,
    pub has_premarket_news: bool,
    /// Best (numerically lowest) source tier among the contributing news.
    pub best_tier: i16,

    // Market validation
    pub price: Option<Decimal>,
    pub volume: Option<i64>,
    pub relative_volume: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub premarket_volume: Option<i64>,
    pub premarket_change_pct: Option<f64>,
    pub technical_validated: bool,

    // Ranking
    pub technical_score: f64,
    pub combined_score: f64,
    /// Dense rank within the scan, 1-based.
    pub selection_rank: i32,

    pub status: CandidateStatus,
}

/// The output of one scanner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub mode: CollectionMode,
    pub started_at: DateTime<Utc>,
    pub candidates: Vec<TradingCandidate>,
    pub universe_size: usize,
    pub catalyst_filtered: usize,
    /// False when the market-data collaborator was entirely unreachable and
    /// candidates were ranked on catalyst evidence alone.
    pub technical_validated: bool,
    pub duration_ms: u64,
}

impl ScanResult {
    /// Ranks must be a dense permutation of 1..=len with combined_score
    /// non-increasing. Used by tests and by the insert path as a guard.
    pub fn ranks_consistent(&self) -> bool {
        let n = self.candidates.len();
        let mut seen = vec![false; n];
        for c in &self.candidates {
            let r = c.selection_rank;
            if r < 1 || r as usize > n || seen[(r - 1) as usize] {
                return false;
            }
            seen[(r - 1) as usize] = true;
        }
        self.candidates
            .windows(2)
            .all(|w| w[0].combined_score >= w[1].combined_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(rank: i32, score: f64) -> TradingCandidate {
        TradingCandidate {
            scan_id: Uuid::nil(),
            symbol: format!("SYM{rank}"),
            selected_at: Utc::now(),
            catalyst_score: score,
            news_count: 1,
            primary_catalyst: None,
            catalyst_keywords: Vec::new(),
            has_premarket_news: false,
            best_tier: 5,
            price: None,
            volume: None,
            relative_volume: None,
            price_change_pct: None,
            premarket_volume: None,
            premarket_change_pct: None,
            technical_validated: false,
            technical_score: 0.0,
            combined_score: score,
            selection_rank: rank,
            status: CandidateStatus::Selected,
        }
    }

    #[test]
    fn rank_consistency_detects_gaps_and_inversions() {
        let scan_id = Uuid::new_v4();
        let mut scan = ScanResult {
            scan_id,
            mode: CollectionMode::Normal,
            started_at: Utc::now(),
            candidates: vec![candidate(1, 90.0), candidate(2, 80.0), candidate(3, 70.0)],
            universe_size: 10,
            catalyst_filtered: 3,
            technical_validated: true,
            duration_ms: 5,
        };
        assert!(scan.ranks_consistent());

        scan.candidates[1].selection_rank = 3; // duplicate rank 3
        assert!(!scan.ranks_consistent());

        scan.candidates[1].selection_rank = 2;
        scan.candidates[1].combined_score = 95.0; // score inversion
        assert!(!scan.ranks_consistent());
    }

    #[test]
    fn empty_scan_is_consistent() {
        let scan = ScanResult {
            scan_id: Uuid::new_v4(),
            mode: CollectionMode::Normal,
            started_at: Utc::now(),
            candidates: Vec::new(),
            universe_size: 0,
            catalyst_filtered: 0,
            technical_validated: true,
            duration_ms: 1,
        };
        assert!(scan.ranks_consistent());
    }
}
