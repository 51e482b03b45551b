//! A `Both`-valued (contradictory) claim should expand the belief into a
//! credal set whose extreme posteriors genuinely disagree, while the lower
//! expectation stays a conservative lower bound on every member.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use robust_semantic_agent::{BelnapValue, Message, ParticleBelief, Predicate};

fn gaussian_sample(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[test]
fn both_valued_claim_produces_a_spread_credal_set() {
    let mut rng = StdRng::seed_from_u64(99);
    let belief = ParticleBelief::from_sampler(2000, 2, || vec![gaussian_sample(&mut rng) * 0.5, gaussian_sample(&mut rng) * 0.5]);

    let message = Message::new(
        "contradictory-claim",
        "source-b",
        BelnapValue::Both,
        Predicate::HalfPlaneGreater { axis: 0, threshold: 0.0 },
    );
    // r_s = 0.9 -> logit(0.9)
    let r = 0.9_f64;
    let trust_logit = (r / (1.0 - r)).ln();

    let mut belief = belief;
    let credal = belief
        .apply_message(&message, trust_logit, 5)
        .expect("a Both message must produce a credal set");

    assert_eq!(credal.k(), 5);

    let means: Vec<Vec<f64>> = credal.posteriors().iter().map(ParticleBelief::mean).collect();
    let axis0: Vec<f64> = means.iter().map(|m| m[0]).collect();
    let spread = axis0.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - axis0.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(spread >= 0.1, "expected posterior means to spread by >= 0.1, got {spread}");

    let f = |state: &[f64]| state.iter().map(|x| x * x).sum::<f64>();
    let lower = credal.lower_expectation(f).expect("non-empty credal set");
    for posterior in credal.posteriors() {
        let weights = posterior.weights();
        let expectation: f64 = posterior
            .particles()
            .iter()
            .zip(weights.iter())
            .map(|(p, w)| w * f(p))
            .sum();
        assert!(lower <= expectation + 1e-9, "lower expectation {lower} exceeds a member's expectation {expectation}");
    }
}
