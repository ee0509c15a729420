//! Capital tracking: realized P&L, equity and funding phase.

use crate::domain::position::ClosedTrade;

#[derive(Debug, Clone, PartialEq)]
pub struct CapitalParams {
    pub initial_capital: f64,
    /// Fraction of equity committed to each new position.
    pub position_fraction: f64,
    /// Ascending equity milestones; the phase is how many have been reached.
    pub phase_targets: Vec<f64>,
}

impl Default for CapitalParams {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_fraction: 0.1,
            phase_targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CapitalSnapshot {
    pub initial_capital: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
    pub phase: usize,
    pub next_target: Option<f64>,
    pub trades: usize,
    pub wins: usize,
}

impl CapitalSnapshot {
    pub fn win_rate(&self) -> Option<f64> {
        (self.trades > 0).then(|| self.wins as f64 / self.trades as f64)
    }
}

#[derive(Debug, Clone)]
pub struct CapitalAccount {
    params: CapitalParams,
    realized_pnl: f64,
    trades: usize,
    wins: usize,
}

impl CapitalAccount {
    pub fn new(params: CapitalParams) -> Self {
        Self {
            params,
            realized_pnl: 0.0,
            trades: 0,
            wins: 0,
        }
    }

    pub fn position_fraction(&self) -> f64 {
        self.params.position_fraction
    }

    /// Equity excluding any open position.
    pub fn equity(&self) -> f64 {
        self.params.initial_capital + self.realized_pnl
    }

    pub fn record(&mut self, trade: &ClosedTrade) {
        self.realized_pnl += trade.pnl;
        self.trades += 1;
        if trade.is_win() {
            self.wins += 1;
        }
    }

    pub fn phase(&self) -> usize {
        let equity = self.equity();
        self.params
            .phase_targets
            .iter()
            .take_while(|&&t| equity >= t)
            .count()
    }

    pub fn snapshot(&self, unrealized_pnl: f64) -> CapitalSnapshot {
        let phase = self.phase();
        CapitalSnapshot {
            initial_capital: self.params.initial_capital,
            realized_pnl: self.realized_pnl,
            unrealized_pnl,
            equity: self.equity() + unrealized_pnl,
            phase,
            next_target: self.params.phase_targets.get(phase).copied(),
            trades: self.trades,
            wins: self.wins,
        }
    }
}
