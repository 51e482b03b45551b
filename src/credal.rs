//! Credal sets: an ensemble of extreme posteriors spanning a source's
//! logit uncertainty interval, used when a claim is a Belnap contradiction.

use crate::belief::ParticleBelief;

/// A set of `K` extreme posteriors produced by a `BelnapValue::Both`
/// message, each weighting the claim's satisfying particles by a different
/// point in `[-lambda_s, +lambda_s]`.
#[derive(Debug, Clone)]
pub struct CredalSet {
    posteriors: Vec<ParticleBelief>,
}

impl CredalSet {
    /// Construct directly from a list of posteriors (used by tests and by
    /// callers building a credal set outside the `Both`-message path).
    #[must_use]
    pub fn new(posteriors: Vec<ParticleBelief>) -> Self {
        Self { posteriors }
    }

    /// Number of posteriors in the set.
    #[must_use]
    pub fn k(&self) -> usize {
        self.posteriors.len()
    }

    /// The posteriors themselves.
    #[must_use]
    pub fn posteriors(&self) -> &[ParticleBelief] {
        &self.posteriors
    }

    /// Build a `K`-member credal set spanning `[-lambda_s, +lambda_s]` from
    /// a base belief and a claim's satisfaction mask.
    ///
    /// `lambda_k = -lambda_s + 2*lambda_s*k/(K-1)` for `k` in `0..K` (or
    /// `0.0` when `K == 1`).
    #[must_use]
    pub fn from_logit_interval(
        base: &ParticleBelief,
        satisfied: &[bool],
        lambda_s: f64,
        k: usize,
    ) -> Self {
        let k = k.max(1);
        let mut posteriors = Vec::with_capacity(k);
        for index in 0..k {
            let lambda_k = if k == 1 {
                0.0
            } else {
                -lambda_s + 2.0 * lambda_s * (index as f64) / (k as f64 - 1.0)
            };
            let mut posterior = base.clone();
            posterior.apply_signed_logit(satisfied, lambda_k);
            posteriors.push(posterior);
        }
        Self { posteriors }
    }

    /// `min_k E_{P_k}[f]`, the lower expectation of a scalar functional
    /// evaluated per-particle and weighted by each posterior's weights.
    ///
    /// `f` maps a single particle's state to a real number.
    pub fn lower_expectation(&self, f: impl Fn(&[f64]) -> f64) -> Option<f64> {
        if self.posteriors.is_empty() {
            return None;
        }
        self.posteriors
            .iter()
            .map(|posterior| {
                let weights = posterior.weights();
                posterior
                    .particles()
                    .iter()
                    .zip(weights.iter())
                    .map(|(p, w)| w * f(p))
                    .sum::<f64>()
            })
            .fold(None, |acc, value| match acc {
                None => Some(value),
                Some(min) => Some(min.min(value)),
            })
    }

    /// Per-dimension lower-expectation mean: the conservative estimator
    /// used wherever a policy needs a single point estimate from a credal
    /// set (SPEC_FULL.md open question #1).
    #[must_use]
    pub fn mean(&self) -> Vec<f64> {
        let dim = self.posteriors.first().map_or(0, ParticleBelief::state_dim);
        (0..dim)
            .map(|axis| {
                self.lower_expectation(|state| state[axis]).unwrap_or(0.0)
            })
            .collect()
    }

    /// Per-dimension upper-variance bound: `max_k Var_{P_k}`.
    #[must_use]
    pub fn variance(&self) -> Vec<f64> {
        let dim = self.posteriors.first().map_or(0, ParticleBelief::state_dim);
        let mut upper = vec![0.0; dim];
        for posterior in &self.posteriors {
            let var = posterior.variance();
            for (u, v) in upper.iter_mut().zip(var.iter()) {
                *u = f64::max(*u, *v);
            }
        }
        upper
    }
}

impl ParticleBelief {
    /// Apply `+lambda` to satisfying particles and `-lambda` to the rest,
    /// then renormalize. Used internally to build credal extremes; exposed
    /// at crate visibility so `CredalSet::from_logit_interval` can reuse
    /// the belief's own normalization path.
    pub(crate) fn apply_signed_logit(&mut self, satisfied: &[bool], lambda: f64) {
        self.apply_log_mult(satisfied, lambda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_belief() -> ParticleBelief {
        let mut particles = Vec::new();
        for i in 0..100 {
            let x = -2.0 + (i as f64) * 0.04;
            particles.push(vec![x]);
        }
        ParticleBelief::from_sampler(100, 1, {
            let mut iter = particles.into_iter();
            move || iter.next().unwrap()
        })
    }

    #[test]
    fn k_posteriors_constructed() {
        let base = base_belief();
        let satisfied: Vec<bool> = base.particles().iter().map(|p| p[0] > 0.0).collect();
        let credal = CredalSet::from_logit_interval(&base, &satisfied, 2.0, 5);
        assert_eq!(credal.k(), 5);
    }

    #[test]
    fn lower_expectation_is_monotone_bound() {
        let base = base_belief();
        let satisfied: Vec<bool> = base.particles().iter().map(|p| p[0] > 0.0).collect();
        let credal = CredalSet::from_logit_interval(&base, &satisfied, 2.0, 5);
        let f = |state: &[f64]| state[0] * state[0];
        let lower = credal.lower_expectation(f).unwrap();
        for posterior in credal.posteriors() {
            let weights = posterior.weights();
            let expectation: f64 = posterior
                .particles()
                .iter()
                .zip(weights.iter())
                .map(|(p, w)| w * f(p))
                .sum();
            assert!(lower <= expectation + 1e-9);
        }
    }

    #[test]
    fn single_member_credal_uses_zero_shift() {
        let base = base_belief();
        let satisfied = vec![true; base.n_particles()];
        let credal = CredalSet::from_logit_interval(&base, &satisfied, 2.0, 1);
        assert_eq!(credal.k(), 1);
    }

    #[test]
    fn mean_spread_reflects_interval_width() {
        let base = base_belief();
        let satisfied: Vec<bool> = base.particles().iter().map(|p| p[0] > 0.0).collect();
        let credal = CredalSet::from_logit_interval(&base, &satisfied, 3.0, 5);
        let means: Vec<f64> = credal
            .posteriors()
            .iter()
            .map(|p| p.mean()[0])
            .collect();
        let spread = means.iter().cloned().fold(f64::MIN, f64::max)
            - means.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread >= 0.1, "spread was {spread}");
    }
}
