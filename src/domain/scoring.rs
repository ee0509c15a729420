//! Weighted composite score over the enabled indicators.
//!
//! Configured weights must sum to 1 over the enabled set. Enabling or
//! disabling an indicator at runtime renormalises the configured weights of
//! the remaining set proportionally, falling back to an equal split when
//! they sum to zero. The score is always recomputed from scratch.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::error::ScalpwatchError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::signal::{Direction, Signal};

pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Default weight table; ATR only feeds position sizing.
pub fn default_weights() -> BTreeMap<IndicatorKind, f64> {
    BTreeMap::from([
        (IndicatorKind::Macd, 0.20),
        (IndicatorKind::Rsi, 0.10),
        (IndicatorKind::Ema200, 0.15),
        (IndicatorKind::Atr, 0.0),
        (IndicatorKind::VegasTunnel, 0.15),
        (IndicatorKind::EmaCross, 0.15),
        (IndicatorKind::CandlePattern, 0.10),
        (IndicatorKind::Fibonacci, 0.15),
    ])
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScoreContribution {
    pub indicator: IndicatorKind,
    pub direction: Direction,
    pub strength: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScoredSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Signed score in [-1, 1]; authoritative for every decision.
    pub composite_score: f64,
    pub breakdown: Vec<ScoreContribution>,
}

impl ScoredSnapshot {
    /// Linear rescale of the composite score onto 0..=10.
    pub fn display_score(&self) -> f64 {
        display_score(self.composite_score)
    }

    pub fn advice(&self) -> Advice {
        Advice::from_score(self.composite_score)
    }

    /// The contribution with the largest magnitude; the first one wins ties.
    pub fn dominant(&self) -> Option<&ScoreContribution> {
        self.breakdown.iter().fold(None, |best, c| match best {
            Some(b) if b.contribution.abs() >= c.contribution.abs() => Some(b),
            _ => Some(c),
        })
    }
}

pub fn display_score(composite: f64) -> f64 {
    (composite.clamp(-1.0, 1.0) + 1.0) * 5.0
}

/// Action tier derived from the score's magnitude on a 0..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Advice {
    StrongEntry,
    CautiousEntry,
    Wait,
    StayOut,
}

impl Advice {
    pub fn from_score(composite: f64) -> Self {
        let magnitude = composite.abs() * 10.0;
        if magnitude >= 8.0 {
            Advice::StrongEntry
        } else if magnitude >= 6.0 {
            Advice::CautiousEntry
        } else if magnitude >= 4.0 {
            Advice::Wait
        } else {
            Advice::StayOut
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Advice::StrongEntry => "strong signal, enter",
            Advice::CautiousEntry => "moderate signal, enter cautiously with a small size",
            Advice::Wait => "neutral, wait for confirmation",
            Advice::StayOut => "weak or no direction, stay out",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct ScoringAggregator {
    configured: BTreeMap<IndicatorKind, f64>,
    enabled: BTreeSet<IndicatorKind>,
    effective: BTreeMap<IndicatorKind, f64>,
}

impl ScoringAggregator {
    /// Fails when a weight is negative or the enabled weights do not sum to 1.
    pub fn new(
        configured: BTreeMap<IndicatorKind, f64>,
        enabled: BTreeSet<IndicatorKind>,
    ) -> Result<Self, ScalpwatchError> {
        if enabled.is_empty() {
            return Err(ScalpwatchError::invalid(
                "weights",
                "enabled",
                "at least one indicator must be enabled",
            ));
        }
        for (kind, w) in &configured {
            if !w.is_finite() || *w < 0.0 {
                return Err(ScalpwatchError::invalid(
                    "weights",
                    kind.name(),
                    format!("weight must be a non-negative number, got {}", w),
                ));
            }
        }
        let sum: f64 = enabled
            .iter()
            .map(|k| configured.get(k).copied().unwrap_or(0.0))
            .sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ScalpwatchError::invalid(
                "weights",
                "enabled",
                format!("weights of enabled indicators must sum to 1, got {:.6}", sum),
            ));
        }

        let mut aggregator = Self {
            configured,
            enabled,
            effective: BTreeMap::new(),
        };
        aggregator.renormalize();
        Ok(aggregator)
    }

    pub fn is_enabled(&self, kind: IndicatorKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn enabled(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.enabled.iter().copied()
    }

    /// Effective weight of an enabled indicator; `None` when disabled.
    pub fn weight(&self, kind: IndicatorKind) -> Option<f64> {
        self.effective.get(&kind).copied()
    }

    pub fn weights(&self) -> &BTreeMap<IndicatorKind, f64> {
        &self.effective
    }

    /// Returns whether the enabled set changed.
    pub fn set_enabled(&mut self, kind: IndicatorKind, on: bool) -> Result<bool, ScalpwatchError> {
        let changed = if on {
            self.enabled.insert(kind)
        } else {
            if self.enabled.len() == 1 && self.enabled.contains(&kind) {
                return Err(ScalpwatchError::InvalidCommand {
                    reason: format!("cannot disable {}: it is the last enabled indicator", kind),
                });
            }
            self.enabled.remove(&kind)
        };
        if changed {
            self.renormalize();
        }
        Ok(changed)
    }

    fn renormalize(&mut self) {
        let configured_sum: f64 = self
            .enabled
            .iter()
            .map(|k| self.configured.get(k).copied().unwrap_or(0.0))
            .sum();
        let equal = 1.0 / self.enabled.len() as f64;
        self.effective = self
            .enabled
            .iter()
            .map(|&k| {
                let w = if configured_sum > 0.0 {
                    self.configured.get(&k).copied().unwrap_or(0.0) / configured_sum
                } else {
                    equal
                };
                (k, w)
            })
            .collect();
    }

    /// Composite score over the enabled signals; disabled ones are skipped.
    pub fn score(&self, timestamp: DateTime<Utc>, signals: &[Signal]) -> ScoredSnapshot {
        let breakdown: Vec<ScoreContribution> = signals
            .iter()
            .filter_map(|s| {
                let weight = self.weight(s.indicator)?;
                Some(ScoreContribution {
                    indicator: s.indicator,
                    direction: s.direction,
                    strength: s.strength,
                    weight,
                    contribution: weight * s.signed_strength(),
                })
            })
            .collect();
        let composite_score = breakdown
            .iter()
            .map(|c| c.contribution)
            .sum::<f64>()
            .clamp(-1.0, 1.0);
        ScoredSnapshot {
            timestamp,
            composite_score,
            breakdown,
        }
    }
}

impl Default for ScoringAggregator {
    fn default() -> Self {
        let weights = default_weights();
        let enabled = weights.keys().copied().collect();
        let mut aggregator = Self {
            configured: weights,
            enabled,
            effective: BTreeMap::new(),
        };
        aggregator.renormalize();
        aggregator
    }
}
