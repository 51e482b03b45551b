//! Action-selection policies over a belief or a credal set.

use crate::belief::ParticleBelief;
use crate::credal::CredalSet;

/// A belief, or the credal set it escalated to after a contradictory claim.
///
/// After a `BelnapValue::Both` message the agent's belief state transitions
/// from `Plain` to `Credal`; `mean_for_policy` gives both variants a single
/// uniform accessor so the policy never needs to branch on which one it
/// holds.
pub enum BeliefLike<'a> {
    /// An ordinary particle belief.
    Plain(&'a ParticleBelief),
    /// A credal set produced by a contradictory claim.
    Credal(&'a CredalSet),
}

impl BeliefLike<'_> {
    /// The point estimate a policy should act on: the belief mean, or the
    /// credal set's conservative lower-expectation mean.
    #[must_use]
    pub fn mean_for_policy(&self) -> Vec<f64> {
        match self {
            Self::Plain(belief) => belief.mean(),
            Self::Credal(credal) => credal.mean(),
        }
    }
}

/// Interface for mapping a belief (or credal set) to an action.
pub trait Policy: Send + Sync {
    /// Select an action for the current belief state.
    fn select_action(&self, belief: &BeliefLike<'_>) -> Vec<f64>;
}

/// Proportional-to-goal controller: `u = gain * (goal - mean) / ||goal - mean||`.
pub struct ProportionalPolicy {
    /// Target state.
    pub goal: Vec<f64>,
    /// Proportional gain.
    pub gain: f64,
}

impl ProportionalPolicy {
    /// Construct a policy driving toward `goal` at the given `gain`.
    #[must_use]
    pub fn new(goal: Vec<f64>, gain: f64) -> Self {
        Self { goal, gain }
    }
}

impl Policy for ProportionalPolicy {
    fn select_action(&self, belief: &BeliefLike<'_>) -> Vec<f64> {
        let mean = belief.mean_for_policy();
        let delta: Vec<f64> = self
            .goal
            .iter()
            .zip(mean.iter())
            .map(|(g, m)| g - m)
            .collect();
        let norm = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if norm < 1e-6 {
            return vec![0.0; delta.len()];
        }
        delta.iter().map(|d| self.gain * d / norm).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drives_toward_goal() {
        let belief = ParticleBelief::new(100, 2, &[0.0, 0.0]);
        let policy = ProportionalPolicy::new(vec![1.0, 0.0], 1.0);
        let action = policy.select_action(&BeliefLike::Plain(&belief));
        assert!((action[0] - 1.0).abs() < 1e-9);
        assert!(action[1].abs() < 1e-9);
    }

    #[test]
    fn zero_action_at_goal() {
        let belief = ParticleBelief::new(100, 2, &[1.0, 0.0]);
        let policy = ProportionalPolicy::new(vec![1.0, 0.0], 1.0);
        let action = policy.select_action(&BeliefLike::Plain(&belief));
        assert!(action.iter().all(|a| a.abs() < 1e-9));
    }
}
