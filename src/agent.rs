//! The agent loop: perception, evidence fusion, active querying, policy,
//! and safety filtering, composed per step.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::barrier::CircleBarrier;
use crate::belief::ParticleBelief;
use crate::config::Configuration;
use crate::credal::CredalSet;
use crate::env::Environment;
use crate::error::{AgentError, DomainError};
use crate::message::Message;
use crate::policy::{BeliefLike, Policy, ProportionalPolicy};
use crate::query::{evi, should_query};
use crate::risk::RiskMode;
use crate::safety::CbfQpFilter;
use crate::trust::TrustRegistry;

/// A configured, running agent.
pub struct Agent {
    config: Configuration,
    belief: ParticleBelief,
    credal: Option<CredalSet>,
    trust: TrustRegistry,
    filter: Option<CbfQpFilter>,
    policy: Box<dyn Policy>,
    rng: StdRng,
    timestep: usize,
}

impl Agent {
    /// Construct an agent from a validated configuration.
    ///
    /// Uses a `ProportionalPolicy` toward `config.env.goal_region` as the
    /// default policy; pass a different `policy` to override it.
    pub fn new(config: Configuration, policy: Option<Box<dyn Policy>>) -> Result<Self, DomainError> {
        config.validate()?;
        if config.particles_exceed_soft_ceiling() {
            eprintln!(
                "warning: belief.particles={} exceeds the recommended ceiling of 100000",
                config.belief.particles
            );
        }
        if config.safety.slack_penalty < 1.0 {
            eprintln!(
                "warning: safety.slack_penalty={} is below 1.0; the filter will cheaply trade safety margin for fidelity",
                config.safety.slack_penalty
            );
        }

        let trust_init = config.credal.as_ref().map_or(0.7, |c| c.trust_init);
        let trust = TrustRegistry::new(trust_init);

        let filter = if config.safety.cbf {
            Some(CbfQpFilter::new(
                Box::new(CircleBarrier::new(
                    config.env.obstacle_center.clone(),
                    config.env.obstacle_radius,
                )),
                config.safety.barrier_alpha,
                config.safety.slack_penalty,
                config.safety.qp_max_iter,
            ))
        } else {
            None
        };

        let policy = policy.unwrap_or_else(|| {
            Box::new(ProportionalPolicy::new(config.env.goal_region.clone(), 1.0))
        });

        let mut rng = StdRng::seed_from_u64(config.seed);
        let belief = initial_belief(&config, &mut rng);

        Ok(Self {
            config,
            belief,
            credal: None,
            trust,
            filter,
            policy,
            rng,
            timestep: 0,
        })
    }

    /// Reinitialize the belief for a new episode, keeping the agent's
    /// configuration, trust registry, and filter warm-start state.
    pub fn reset_belief(&mut self) {
        self.belief = initial_belief(&self.config, &mut self.rng);
        self.credal = None;
        self.timestep = 0;
    }

    fn active_belief_like(&self) -> BeliefLike<'_> {
        match &self.credal {
            Some(credal) => BeliefLike::Credal(credal),
            None => BeliefLike::Plain(&self.belief),
        }
    }

    fn maybe_resample(&mut self) {
        let threshold = self.config.belief.resample_threshold * self.belief.n_particles() as f64;
        if self.belief.ess() < threshold {
            self.belief
                .resample(&mut self.rng, self.config.belief.process_noise);
        }
    }

    /// Apply any messages the environment emitted this step, in order.
    ///
    /// Ground truth is not known at claim-application time, so this does
    /// not update `trust`; trust updates happen separately, from the report
    /// layer comparing claims against revealed episode outcomes.
    fn apply_messages(&mut self, messages: &[Message]) {
        for message in messages {
            let trust = self.trust.get_or_insert(&message.source_id);
            let k = self.config.credal.as_ref().map_or(5, |c| c.k);
            if let Some(credal) = self.belief.apply_message(message, trust.logit(), k) {
                self.credal = Some(credal);
            }
        }
    }

    /// Run one full agent step. `observation` must already be finite and
    /// `config.env.state_dim`-dimensional (the caller-provided environment
    /// observation); `env` is consulted for messages and, when query is
    /// enabled, a second lower-noise observation.
    pub fn act(
        &mut self,
        observation: &[f64],
        env: Option<&mut dyn Environment>,
    ) -> Result<(Vec<f64>, Value), AgentError> {
        for (index, value) in observation.iter().enumerate() {
            if !value.is_finite() {
                return Err(DomainError::NonFiniteObservation { index }.into());
            }
        }
        if observation.len() != self.config.env.state_dim {
            return Err(DomainError::DimensionMismatch {
                actual: observation.len(),
                expected: self.config.env.state_dim,
            }
            .into());
        }

        self.belief
            .obs_update(observation, self.config.env.observation_noise)?;
        self.maybe_resample();

        let mut env = env;
        if let Some(env) = env.as_deref_mut() {
            let messages = env.get_messages(&mut self.rng);
            self.apply_messages(&messages);
        }

        let mut query_triggered = false;
        let mut evi_value = 0.0;
        let mut entropy_before = None;
        let mut entropy_after = None;

        if self.config.query.enabled {
            if let Some(env) = env.as_deref_mut() {
                entropy_before = Some(self.belief.entropy());
                let obs_noise = self.config.env.observation_noise * 0.5;
                let goal = self.config.env.goal_region.clone();
                evi_value = evi(
                    &self.belief,
                    move |b| goal_value_fn(b, &goal),
                    obs_noise,
                    50,
                    &mut self.rng,
                );
                if should_query(evi_value, self.config.query.delta_star) {
                    query_triggered = true;
                    let query_obs = env.query_observation(&mut self.rng);
                    self.belief.obs_update(&query_obs, obs_noise)?;
                    self.maybe_resample();
                    entropy_after = Some(self.belief.entropy());
                }
            }
        }

        let u_desired = self.policy.select_action(&self.active_belief_like());

        let (u_safe, slack, filter_active, filter_error) = if let Some(filter) = &mut self.filter {
            let mean = self.belief.mean();
            match filter.filter(&mean, &u_desired) {
                Ok(result) => {
                    if result.u_safe.iter().any(|v| !v.is_finite()) {
                        (vec![0.0; u_desired.len()], f64::INFINITY, true, Some(
                            "solver returned non-finite action".to_string(),
                        ))
                    } else {
                        let active = CbfQpFilter::is_active(&u_desired, &result.u_safe);
                        (result.u_safe, result.slack, active, None)
                    }
                }
                Err(error) => (vec![0.0; u_desired.len()], f64::INFINITY, true, Some(error.to_string())),
            }
        } else {
            (u_desired.clone(), 0.0, false, None)
        };

        self.timestep += 1;

        let annotation = json!({
            "belief_mean": self.belief.mean(),
            "belief_ess": self.belief.ess(),
            "safety_filter_active": filter_active,
            "slack": slack,
            "u_desired": u_desired,
            "u_safe": u_safe.clone(),
            "safety_filter_error": filter_error,
            "timestep": self.timestep,
            "credal_set_active": self.credal.is_some(),
            "credal_set_k": self.credal.as_ref().map(CredalSet::k),
            "query_triggered": query_triggered,
            "evi": evi_value,
            "entropy_before_query": entropy_before,
            "entropy_after_query": entropy_after,
        });

        Ok((u_safe, annotation))
    }

    /// The risk mode this agent's configuration selects (parsed from
    /// `config.risk.mode`; validated at construction so this never fails).
    #[must_use]
    pub fn risk_mode(&self) -> RiskMode {
        self.config
            .risk
            .risk_mode()
            .expect("validated at construction")
    }

    /// Read-only access to the trust registry, e.g. for report generation.
    #[must_use]
    pub fn trust_registry(&self) -> &TrustRegistry {
        &self.trust
    }
}

fn goal_value_fn(belief: &ParticleBelief, goal: &[f64]) -> f64 {
    let mean = belief.mean();
    let dist: f64 = mean
        .iter()
        .zip(goal.iter())
        .map(|(m, g)| (m - g).powi(2))
        .sum::<f64>()
        .sqrt();
    -dist
}

fn initial_belief(config: &Configuration, rng: &mut StdRng) -> ParticleBelief {
    let dim = config.env.state_dim;
    ParticleBelief::from_sampler(config.belief.particles, dim, move || {
        (0..dim).map(|_| gaussian_sample(rng) * 0.5).collect()
    })
}

fn gaussian_sample(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ForbiddenCircleEnv;

    fn small_config() -> Configuration {
        let mut config = Configuration::default();
        config.belief.particles = 500;
        config.env.state_dim = 2;
        config
    }

    #[test]
    fn agent_constructs_from_default_config() {
        let agent = Agent::new(small_config(), None);
        assert!(agent.is_ok());
    }

    #[test]
    fn act_rejects_non_finite_observation() {
        let mut agent = Agent::new(small_config(), None).unwrap();
        let result = agent.act(&[f64::NAN, 0.0], None);
        assert!(result.is_err());
    }

    #[test]
    fn act_rejects_dimension_mismatch() {
        let mut agent = Agent::new(small_config(), None).unwrap();
        let result = agent.act(&[0.0], None);
        assert!(result.is_err());
    }

    #[test]
    fn act_produces_finite_safe_action() {
        let mut agent = Agent::new(small_config(), None).unwrap();
        let (action, _annotation) = agent.act(&[0.5, 0.5], None).unwrap();
        assert!(action.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn ten_episode_rollout_has_no_violations() {
        let mut config = small_config();
        config.belief.particles = 1000;
        config.seed = 42;
        let env_config = config.env.clone();
        let mut env = ForbiddenCircleEnv::new(env_config, 50, false);
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut total_violations = 0;
        let mut filter_activations = 0;
        let mut total_steps = 0;

        for _ in 0..10 {
            let mut agent = Agent::new(config.clone(), None).unwrap();
            let mut obs = env.reset(&mut rng);
            for _ in 0..50 {
                let (_action, annotation) = agent.act(&obs, Some(&mut env)).unwrap();
                if annotation["safety_filter_active"] == true {
                    filter_activations += 1;
                }
                let action: Vec<f64> = serde_json::from_value(annotation["u_safe"].clone()).unwrap();
                let outcome = env.step(&action, &mut rng);
                if outcome.info["violated_safety"] == true {
                    total_violations += 1;
                }
                total_steps += 1;
                obs = outcome.observation;
                if outcome.done {
                    break;
                }
            }
        }

        assert_eq!(total_violations, 0, "expected zero safety violations");
        assert!(total_steps > 0);
        let _ = filter_activations;
    }
}
