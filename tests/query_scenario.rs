//! A high-variance belief with a goal far from its mean should, at least
//! occasionally, show a positive EVI large enough to trigger a query, and
//! taking that query observation should reduce entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use robust_semantic_agent::{evi, should_query, ParticleBelief};

fn gaussian_sample(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn goal_value(belief: &ParticleBelief, goal: &[f64]) -> f64 {
    let mean = belief.mean();
    let dist: f64 = mean.iter().zip(goal.iter()).map(|(m, g)| (m - g).powi(2)).sum::<f64>().sqrt();
    -dist
}

#[test]
fn high_variance_belief_triggers_a_query_that_reduces_entropy() {
    let mut rng = StdRng::seed_from_u64(321);
    let delta_star = 0.1;
    let obs_noise_query = 0.05;
    let goal = vec![0.8, 0.8];

    let mut triggered_once = false;

    for trial in 0..20u64 {
        let mut trial_rng = StdRng::seed_from_u64(321 + trial);
        let belief = ParticleBelief::from_sampler(3000, 2, || {
            vec![gaussian_sample(&mut trial_rng) * 0.5, gaussian_sample(&mut trial_rng) * 0.5]
        });

        let entropy_before = belief.entropy();
        let evi_value = evi(&belief, |b| goal_value(b, &goal), obs_noise_query, 100, &mut rng);

        if should_query(evi_value, delta_star) {
            triggered_once = true;
            let true_state = belief.mean();
            let query_obs: Vec<f64> = true_state.iter().map(|x| x + gaussian_sample(&mut rng) * obs_noise_query).collect();
            let mut posterior = belief.clone();
            posterior.obs_update(&query_obs, obs_noise_query).unwrap();
            assert!(posterior.entropy() < entropy_before, "querying should reduce entropy");
            break;
        }
    }

    assert!(triggered_once, "expected at least one trial to trigger a query");
}
