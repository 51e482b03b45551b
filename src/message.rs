//! Claims about hidden state, carrying a Belnap value and a source.
//!
//! Predicates are modeled as a small sealed variant rather than boxed
//! closures: the source's `A_c(particles) -> bool[N]` is always one of a
//! handful of shapes in practice, and a data representation keeps messages
//! serializable and replayable from an episode log.

use serde::{Deserialize, Serialize};

use crate::semantics::BelnapValue;

/// A claim predicate over a single particle's state vector.
///
/// Evaluated per particle; `Predicate::evaluate` never panics on a
/// dimension mismatch, it simply returns `false` for out-of-range axes
/// (the caller is expected to have already validated state dimension
/// against the belief it applies to).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// `state[axis] > threshold`.
    HalfPlaneGreater {
        /// State vector axis to inspect.
        axis: usize,
        /// Threshold for the comparison.
        threshold: f64,
    },
    /// `state[axis] < threshold`.
    HalfPlaneLess {
        /// State vector axis to inspect.
        axis: usize,
        /// Threshold for the comparison.
        threshold: f64,
    },
    /// `||state - center|| < radius`.
    WithinRadius {
        /// Center of the region.
        center: Vec<f64>,
        /// Radius of the region.
        radius: f64,
    },
    /// Conjunction of sub-predicates.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate this predicate against a single particle.
    #[must_use]
    pub fn evaluate(&self, state: &[f64]) -> bool {
        match self {
            Self::HalfPlaneGreater { axis, threshold } => {
                state.get(*axis).is_some_and(|v| *v > *threshold)
            }
            Self::HalfPlaneLess { axis, threshold } => {
                state.get(*axis).is_some_and(|v| *v < *threshold)
            }
            Self::WithinRadius { center, radius } => {
                if state.len() != center.len() {
                    return false;
                }
                let dist_sq: f64 = state
                    .iter()
                    .zip(center.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                dist_sq < radius * radius
            }
            Self::And(parts) => parts.iter().all(|p| p.evaluate(state)),
        }
    }

    /// Evaluate against a whole particle batch, one bool per particle.
    #[must_use]
    pub fn evaluate_batch(&self, particles: &[Vec<f64>]) -> Vec<bool> {
        particles.iter().map(|p| self.evaluate(p)).collect()
    }
}

/// A claim about hidden state from a named source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier for the claim (stable across repeated assertions).
    pub claim_id: String,
    /// Identifier of the asserting source.
    pub source_id: String,
    /// The claim's Belnap truth value.
    pub value: BelnapValue,
    /// The predicate the claim asserts over hidden state.
    pub predicate: Predicate,
}

impl Message {
    /// Construct a new message.
    #[must_use]
    pub fn new(
        claim_id: impl Into<String>,
        source_id: impl Into<String>,
        value: BelnapValue,
        predicate: Predicate,
    ) -> Self {
        Self {
            claim_id: claim_id.into(),
            source_id: source_id.into(),
            value,
            predicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_plane_greater() {
        let p = Predicate::HalfPlaneGreater {
            axis: 1,
            threshold: 0.0,
        };
        assert!(p.evaluate(&[0.0, 1.0]));
        assert!(!p.evaluate(&[0.0, -1.0]));
    }

    #[test]
    fn within_radius() {
        let p = Predicate::WithinRadius {
            center: vec![0.0, 0.0],
            radius: 1.0,
        };
        assert!(p.evaluate(&[0.5, 0.5]));
        assert!(!p.evaluate(&[2.0, 2.0]));
    }

    #[test]
    fn conjunction() {
        let p = Predicate::And(vec![
            Predicate::HalfPlaneGreater {
                axis: 0,
                threshold: 0.0,
            },
            Predicate::HalfPlaneLess {
                axis: 1,
                threshold: 1.0,
            },
        ]);
        assert!(p.evaluate(&[1.0, 0.5]));
        assert!(!p.evaluate(&[-1.0, 0.5]));
    }

    #[test]
    fn batch_matches_per_particle() {
        let p = Predicate::HalfPlaneGreater {
            axis: 0,
            threshold: 0.0,
        };
        let particles = vec![vec![1.0], vec![-1.0], vec![0.5]];
        assert_eq!(p.evaluate_batch(&particles), vec![true, false, true]);
    }
}
