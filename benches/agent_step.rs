use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use robust_semantic_agent::{CbfQpFilter, CircleBarrier, ParticleBelief};

fn obs_update_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut belief = ParticleBelief::from_sampler(5000, 2, || vec![0.0, 0.0]);

    c.bench_function("particle_belief_obs_update_5000", |b| {
        b.iter(|| {
            belief
                .obs_update(black_box(&[0.5, 0.3]), black_box(0.1))
                .unwrap();
        });
    });

    c.bench_function("particle_belief_resample_5000", |b| {
        b.iter(|| {
            belief.resample(&mut rng, black_box(0.01));
        });
    });
}

fn cbf_filter_benchmark(c: &mut Criterion) {
    let mut filter = CbfQpFilter::new(Box::new(CircleBarrier::new(vec![0.0, 0.0], 0.3)), 0.5, 1000.0, 50);

    c.bench_function("cbf_qp_filter_single_step", |b| {
        b.iter(|| {
            filter
                .filter(black_box(&[0.35, 0.0]), black_box(&[-0.1, 0.0]))
                .unwrap();
        });
    });
}

criterion_group!(benches, obs_update_benchmark, cbf_filter_benchmark);
criterion_main!(benches);
