//! # Entity-level Scoring
//!
//! Accumulates per-kind counters over an evaluation run and derives
//! precision, recall and F1, both per kind and aggregated (macro/micro).
//!
//! A predicted span counts as correct when its text appears anywhere in the
//! reference list of the same kind. Matching is by membership, not by
//! position, so repeated spans are counted once per prediction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decode::Entities;
use crate::tags::EntityKind;

/// Smoothing constant added to every ratio.
///
/// With no predictions and no references precision and recall both
/// resolve to 1.
pub const EPSILON: f64 = 1e-10;

/// Counters for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    /// Predicted spans found in the reference list.
    pub correct: usize,
    /// All predicted spans.
    pub predicted: usize,
    /// All reference spans.
    pub reference: usize,
}

impl EntityCounts {
    #[must_use]
    pub fn precision(&self) -> f64 {
        ratio(self.correct, self.predicted)
    }

    #[must_use]
    pub fn recall(&self) -> f64 {
        ratio(self.correct, self.reference)
    }

    #[must_use]
    pub fn f1(&self) -> f64 {
        f1(self.precision(), self.recall())
    }
}

impl std::ops::AddAssign for EntityCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.correct += rhs.correct;
        self.predicted += rhs.predicted;
        self.reference += rhs.reference;
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    (numerator as f64 + EPSILON) / (denominator as f64 + EPSILON)
}

fn f1(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + EPSILON)
}

/// Evaluation accumulator, one [`EntityCounts`] per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalStats {
    counts: [EntityCounts; 4],
}

impl EvalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one example's predicted and reference entities.
    pub fn update(&mut self, predicted: &Entities, reference: &Entities) {
        const NONE: &[String] = &[];

        for (slot, kind) in self.counts.iter_mut().zip(EntityKind::ALL) {
            let pred = predicted.get(&kind).map_or(NONE, Vec::as_slice);
            let gold = reference.get(&kind).map_or(NONE, Vec::as_slice);

            slot.correct += pred.iter().filter(|p| gold.contains(*p)).count();
            slot.predicted += pred.len();
            slot.reference += gold.len();
        }
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &EvalStats) {
        for (slot, counts) in self.counts.iter_mut().zip(other.counts) {
            *slot += counts;
        }
    }

    /// Counters for one kind.
    pub fn counts(&self, kind: EntityKind) -> EntityCounts {
        self.iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| c)
            .unwrap_or_default()
    }

    /// Iterate kinds with their counters in [`EntityKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, EntityCounts)> + '_ {
        EntityKind::ALL.into_iter().zip(self.counts.iter().copied())
    }

    /// Counters summed across all kinds.
    pub fn total(&self) -> EntityCounts {
        let mut total = EntityCounts::default();
        for counts in self.counts {
            total += counts;
        }
        total
    }

    /// Unweighted mean of the per-kind F1 scores.
    #[must_use]
    pub fn macro_f1(&self) -> f64 {
        self.counts.iter().map(EntityCounts::f1).sum::<f64>() / self.counts.len() as f64
    }

    /// F1 over the pooled counters.
    #[must_use]
    pub fn micro_f1(&self) -> f64 {
        self.total().f1()
    }

    /// Snapshot the derived scores.
    pub fn report(&self) -> EvalReport {
        let total = self.total();
        EvalReport {
            kinds: self
                .iter()
                .map(|(kind, counts)| KindScore {
                    kind,
                    precision: counts.precision(),
                    recall: counts.recall(),
                    f1: counts.f1(),
                    counts,
                })
                .collect(),
            macro_f1: self.macro_f1(),
            micro_precision: total.precision(),
            micro_recall: total.recall(),
            micro_f1: total.f1(),
        }
    }
}

/// Scores for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindScore {
    pub kind: EntityKind,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub counts: EntityCounts,
}

/// Derived scores of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub kinds: Vec<KindScore>,
    pub macro_f1: f64,
    pub micro_precision: f64,
    pub micro_recall: f64,
    pub micro_f1: f64,
}

impl EvalReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14} {:>9} {:>9} {:>9} {:>8} {:>8} {:>8}",
            "kind", "precision", "recall", "f1", "correct", "pred", "gold"
        )?;
        for score in &self.kinds {
            writeln!(
                f,
                "{:<14} {:>9.4} {:>9.4} {:>9.4} {:>8} {:>8} {:>8}",
                score.kind.name(),
                score.precision,
                score.recall,
                score.f1,
                score.counts.correct,
                score.counts.predicted,
                score.counts.reference
            )?;
        }
        writeln!(
            f,
            "{:<14} {:>9.4} {:>9.4} {:>9.4}",
            "micro", self.micro_precision, self.micro_recall, self.micro_f1
        )?;
        write!(f, "{:<14} {:>9} {:>9} {:>9.4}", "macro", "", "", self.macro_f1)
    }
}
