//! Particle-filter belief over a hidden state vector.
//!
//! Weights are kept in log space throughout; the only place raw
//! probabilities appear is inside `resample` and the public accessors that
//! explicitly ask for them. Log-sum-exp normalization is the only supported
//! normalization path (see invariant tests below).

use rand::Rng;

use crate::credal::CredalSet;
use crate::error::DomainError;
use crate::message::Message;
use crate::semantics::BelnapValue;

/// A particle-filter belief over `state_dim`-dimensional hidden state.
#[derive(Debug, Clone)]
pub struct ParticleBelief {
    particles: Vec<Vec<f64>>,
    log_weights: Vec<f64>,
    state_dim: usize,
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

fn gaussian_log_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

impl ParticleBelief {
    /// Create a belief with `n_particles` particles in `state_dim`
    /// dimensions, all initialized to `initial_mean` with uniform weight.
    ///
    /// `n_particles` must be at least 100 (validated by the caller via
    /// `AgentConfig`; this constructor does not re-validate it so unit
    /// tests can exercise small particle counts directly).
    #[must_use]
    pub fn new(n_particles: usize, state_dim: usize, initial_mean: &[f64]) -> Self {
        let particles = vec![initial_mean.to_vec(); n_particles];
        let log_weights = vec![-(n_particles as f64).ln(); n_particles];
        Self {
            particles,
            log_weights,
            state_dim,
        }
    }

    /// Create a belief by sampling particles from `sampler` (e.g. a
    /// Gaussian prior around a reset state).
    pub fn from_sampler(
        n_particles: usize,
        state_dim: usize,
        mut sampler: impl FnMut() -> Vec<f64>,
    ) -> Self {
        let particles: Vec<Vec<f64>> = (0..n_particles).map(|_| sampler()).collect();
        let log_weights = vec![-(n_particles as f64).ln(); n_particles];
        Self {
            particles,
            log_weights,
            state_dim,
        }
    }

    /// Number of particles.
    #[must_use]
    pub fn n_particles(&self) -> usize {
        self.particles.len()
    }

    /// State dimension.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Raw particle positions.
    #[must_use]
    pub fn particles(&self) -> &[Vec<f64>] {
        &self.particles
    }

    /// Log-space weights (normalized: log-sum-exp equals 0).
    #[must_use]
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    /// Normalized (linear-space) weights.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.log_weights.iter().map(|lw| lw.exp()).collect()
    }

    fn normalize(&mut self) {
        let lse = log_sum_exp(&self.log_weights);
        for lw in &mut self.log_weights {
            *lw -= lse;
        }
    }

    /// Fuse a Gaussian observation: `obs ~ N(state, sigma^2 I)`.
    pub fn obs_update(&mut self, observation: &[f64], sigma: f64) -> Result<(), DomainError> {
        if observation.len() != self.state_dim {
            return Err(DomainError::DimensionMismatch {
                actual: observation.len(),
                expected: self.state_dim,
            });
        }
        for (index, value) in observation.iter().enumerate() {
            if !value.is_finite() {
                return Err(DomainError::NonFiniteObservation { index });
            }
        }
        for (particle, log_weight) in self.particles.iter().zip(self.log_weights.iter_mut()) {
            let mut log_lik = 0.0;
            for (obs_dim, particle_dim) in observation.iter().zip(particle.iter()) {
                log_lik += gaussian_log_pdf(*obs_dim, *particle_dim, sigma);
            }
            *log_weight += log_lik;
        }
        self.normalize();
        Ok(())
    }

    /// Fuse a claim about hidden state, weighted by the source's trust logit.
    ///
    /// Returns `Some(CredalSet)` when the claim is a `BelnapValue::Both`
    /// contradiction; the caller is expected to switch its active
    /// `BeliefLike` to `Credal` in that case. Any other value updates this
    /// belief in place and returns `None`.
    pub fn apply_message(
        &mut self,
        message: &Message,
        trust_logit: f64,
        credal_k: usize,
    ) -> Option<CredalSet> {
        let satisfied = message.predicate.evaluate_batch(&self.particles);
        match message.value {
            BelnapValue::True => {
                self.apply_log_mult(&satisfied, trust_logit);
                None
            }
            BelnapValue::False => {
                self.apply_log_mult(&satisfied, -trust_logit);
                None
            }
            BelnapValue::Neither => None,
            BelnapValue::Both => {
                let credal =
                    CredalSet::from_logit_interval(self, &satisfied, trust_logit, credal_k);
                Some(credal)
            }
        }
    }

    /// Apply `+lambda` where `satisfied[i]` is true, `-lambda` otherwise,
    /// then renormalize.
    pub(crate) fn apply_log_mult(&mut self, satisfied: &[bool], lambda: f64) {
        for (log_weight, sat) in self.log_weights.iter_mut().zip(satisfied.iter()) {
            *log_weight += if *sat { lambda } else { -lambda };
        }
        self.normalize();
    }

    /// Effective sample size: `1 / sum(w_i^2)`.
    #[must_use]
    pub fn ess(&self) -> f64 {
        let sum_sq: f64 = self.log_weights.iter().map(|lw| (2.0 * lw).exp()).sum();
        1.0 / sum_sq
    }

    /// Weighted Shannon entropy (nats) of the normalized weights.
    #[must_use]
    pub fn entropy(&self) -> f64 {
        self.weights()
            .iter()
            .filter(|w| **w >= 1e-12)
            .map(|w| -w * w.ln())
            .sum()
    }

    /// Weighted mean state.
    #[must_use]
    pub fn mean(&self) -> Vec<f64> {
        let weights = self.weights();
        let mut mean = vec![0.0; self.state_dim];
        for (particle, w) in self.particles.iter().zip(weights.iter()) {
            for (m, p) in mean.iter_mut().zip(particle.iter()) {
                *m += w * p;
            }
        }
        mean
    }

    /// Weighted per-dimension variance (diagonal of the covariance).
    #[must_use]
    pub fn variance(&self) -> Vec<f64> {
        let mean = self.mean();
        let weights = self.weights();
        let mut var = vec![0.0; self.state_dim];
        for (particle, w) in self.particles.iter().zip(weights.iter()) {
            for (v, (p, m)) in var.iter_mut().zip(particle.iter().zip(mean.iter())) {
                *v += w * (p - m).powi(2);
            }
        }
        var
    }

    /// Systematic resampling with Gaussian jitter, then reset to uniform
    /// weight.
    pub fn resample(&mut self, rng: &mut impl Rng, jitter_sigma: f64) {
        let n = self.particles.len();
        let weights = self.weights();
        let mut cumsum = Vec::with_capacity(n);
        let mut acc = 0.0;
        for w in &weights {
            acc += w;
            cumsum.push(acc);
        }
        let offset: f64 = rng.gen_range(0.0..1.0) / n as f64;
        let mut new_particles = Vec::with_capacity(n);
        let mut cursor = 0usize;
        for j in 0..n {
            let position = (j as f64 + offset * n as f64) / n as f64;
            while cursor < n - 1 && cumsum[cursor] < position {
                cursor += 1;
            }
            new_particles.push(self.particles[cursor].clone());
        }
        // Gaussian jitter per dimension via Box-Muller, to restore particle
        // diversity after resampling collapses duplicate particles.
        for particle in &mut new_particles {
            for dim in particle.iter_mut() {
                let u1: f64 = rng.gen_range(1e-12..1.0);
                let u2: f64 = rng.gen_range(0.0..1.0);
                let gauss = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                *dim += gauss * jitter_sigma;
            }
        }
        self.particles = new_particles;
        self.log_weights = vec![-(n as f64).ln(); n];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(42)
    }

    #[test]
    fn new_belief_is_normalized() {
        let belief = ParticleBelief::new(100, 2, &[0.0, 0.0]);
        let lse = log_sum_exp(belief.log_weights());
        assert!(lse.abs() < 1e-10);
    }

    #[test]
    fn ess_is_full_for_uniform_weights() {
        let belief = ParticleBelief::new(100, 2, &[0.0, 0.0]);
        assert!((belief.ess() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn obs_update_stays_normalized() {
        let mut belief = ParticleBelief::from_sampler(500, 2, {
            let mut r = rng();
            move || vec![r.gen_range(-1.0..1.0), r.gen_range(-1.0..1.0)]
        });
        belief.obs_update(&[0.2, -0.1], 0.2).unwrap();
        let lse = log_sum_exp(belief.log_weights());
        assert!(lse.abs() < 1e-8);
        let ess = belief.ess();
        assert!(ess >= 1.0 && ess <= 500.0);
    }

    #[test]
    fn obs_update_rejects_dimension_mismatch() {
        let mut belief = ParticleBelief::new(100, 2, &[0.0, 0.0]);
        assert!(belief.obs_update(&[0.0], 0.1).is_err());
    }

    #[test]
    fn obs_update_rejects_non_finite() {
        let mut belief = ParticleBelief::new(100, 2, &[0.0, 0.0]);
        assert!(belief.obs_update(&[f64::NAN, 0.0], 0.1).is_err());
    }

    #[test]
    fn resample_resets_to_uniform_weight() {
        let mut belief = ParticleBelief::new(200, 1, &[0.0]);
        belief.obs_update(&[5.0], 0.1).unwrap();
        let mut r = rng();
        belief.resample(&mut r, 0.01);
        let expected = -(200.0_f64).ln();
        assert!(belief.log_weights().iter().all(|lw| (*lw - expected).abs() < 1e-9));
    }

    #[test]
    fn ess_bounds_hold() {
        let mut belief = ParticleBelief::new(300, 1, &[0.0]);
        belief.obs_update(&[10.0], 0.01).unwrap();
        let ess = belief.ess();
        assert!(ess >= 1.0 && ess <= 300.0);
    }
}
