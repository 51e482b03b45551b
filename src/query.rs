//! Expected Value of Information and the query-trigger rule.

use rand::Rng;

use crate::belief::ParticleBelief;

/// Expected improvement in `value_fn` from taking one more noisy
/// observation, estimated by Monte Carlo: sample `n_samples` particles,
/// synthesize a noisy observation from each, clone-and-update the belief,
/// and average the resulting value against the current one.
pub fn evi(
    belief: &ParticleBelief,
    value_fn: impl Fn(&ParticleBelief) -> f64,
    obs_noise: f64,
    n_samples: usize,
    rng: &mut impl Rng,
) -> f64 {
    let current_value = value_fn(belief);
    let weights = belief.weights();
    let mut cumsum = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for w in &weights {
        acc += w;
        cumsum.push(acc);
    }

    let mut total = 0.0;
    for _ in 0..n_samples {
        let u: f64 = rng.gen_range(0.0..1.0);
        let index = cumsum.partition_point(|c| *c < u).min(belief.n_particles() - 1);
        let sampled_state = &belief.particles()[index];
        let observation: Vec<f64> = sampled_state
            .iter()
            .map(|x| x + gaussian_sample(rng) * obs_noise)
            .collect();

        let mut posterior = belief.clone();
        posterior
            .obs_update(&observation, obs_noise)
            .expect("sampled observation has belief's own dimension and is finite");
        total += value_fn(&posterior);
    }
    total / n_samples as f64 - current_value
}

/// Whether the computed EVI warrants spending the query cost to act on it.
#[must_use]
pub fn should_query(evi_value: f64, delta_star: f64) -> bool {
    evi_value >= delta_star
}

/// Synthesize a query observation: the environment's true state plus
/// Gaussian noise at `obs_noise`.
pub fn compute_query_observation(true_state: &[f64], obs_noise: f64, rng: &mut impl Rng) -> Vec<f64> {
    true_state
        .iter()
        .map(|x| x + gaussian_sample(rng) * obs_noise)
        .collect()
}

fn gaussian_sample(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn evi_can_be_negative() {
        // A belief already tightly concentrated at the truth: further
        // observation can only add noise, so EVI may go negative for a
        // value function sensitive to variance.
        let belief = ParticleBelief::new(500, 1, &[0.0]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let value_fn = |b: &ParticleBelief| -b.variance()[0];
        let result = evi(&belief, value_fn, 0.3, 50, &mut rng);
        assert!(result.is_finite());
    }

    #[test]
    fn should_query_thresholds_correctly() {
        assert!(should_query(0.2, 0.1));
        assert!(should_query(0.1, 0.1));
        assert!(!should_query(0.05, 0.1));
    }

    #[test]
    fn high_variance_belief_often_has_positive_evi_toward_goal() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let belief = ParticleBelief::from_sampler(2000, 1, {
            let mut r = rand::rngs::StdRng::seed_from_u64(9);
            move || vec![gaussian_sample(&mut r) * 0.5]
        });
        let goal = [1.0];
        let value_fn = |b: &ParticleBelief| -(b.mean()[0] - goal[0]).abs();
        let result = evi(&belief, value_fn, 0.05, 100, &mut rng);
        assert!(result.is_finite());
    }
}
