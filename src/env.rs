//! Environment contract (§6.1) and the demonstration `ForbiddenCircleEnv`.

use rand::{Rng, RngCore};
use serde_json::{json, Value};

use crate::config::EnvConfig;
use crate::message::{Message, Predicate};
use crate::semantics::BelnapValue;

/// Outcome of one `Environment::step` call.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Noisy observation of the new state.
    pub observation: Vec<f64>,
    /// Reward received on this step.
    pub reward: f64,
    /// Whether the episode has ended.
    pub done: bool,
    /// True state and bookkeeping info, serialized for the episode log.
    pub info: Value,
}

/// The environment contract an agent drives.
pub trait Environment {
    /// Reset to a new episode, returning the initial observation.
    fn reset(&mut self, rng: &mut dyn RngCore) -> Vec<f64>;

    /// Advance one step given `action`, returning the outcome.
    fn step(&mut self, action: &[f64], rng: &mut dyn RngCore) -> StepOutcome;

    /// Observation noise standard deviation.
    fn obs_noise(&self) -> f64;

    /// Any claims a source chose to emit about the current state this step.
    fn get_messages(&mut self, rng: &mut dyn RngCore) -> Vec<Message>;

    /// A lower-noise observation of the true state, for the query channel.
    fn query_observation(&self, rng: &mut dyn RngCore) -> Vec<f64>;
}

/// A 2D single-integrator agent that must reach a goal region while
/// avoiding a circular forbidden disk.
pub struct ForbiddenCircleEnv {
    config: EnvConfig,
    dt: f64,
    max_timesteps: usize,
    enable_gossip_source: bool,
    state: Vec<f64>,
    timestep: usize,
}

impl ForbiddenCircleEnv {
    /// Construct the environment from a configuration's `env` section.
    #[must_use]
    pub fn new(config: EnvConfig, max_timesteps: usize, enable_gossip_source: bool) -> Self {
        Self {
            state: config.obstacle_center.clone(),
            config,
            dt: 0.1,
            max_timesteps,
            enable_gossip_source,
            timestep: 0,
        }
    }

    fn dist_to_goal(&self) -> f64 {
        self.state
            .iter()
            .zip(self.config.goal_region.iter())
            .map(|(s, g)| (s - g).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn inside_obstacle(&self, state: &[f64]) -> bool {
        let dist_sq: f64 = state
            .iter()
            .zip(self.config.obstacle_center.iter())
            .map(|(s, c)| (s - c).powi(2))
            .sum();
        dist_sq < self.config.obstacle_radius * self.config.obstacle_radius
    }

    /// True state (unobservable directly by the agent).
    #[must_use]
    pub fn true_state(&self) -> &[f64] {
        &self.state
    }
}

impl Environment for ForbiddenCircleEnv {
    fn reset(&mut self, rng: &mut dyn RngCore) -> Vec<f64> {
        self.timestep = 0;
        loop {
            let angle = rng.gen_range(0.0..(2.0 * std::f64::consts::PI));
            let radius = rng.gen_range(0.5..1.0);
            let state = vec![
                self.config.obstacle_center[0] + radius * angle.cos(),
                self.config.obstacle_center[1] + radius * angle.sin(),
            ];
            if !self.inside_obstacle(&state) {
                self.state = state;
                break;
            }
        }
        self.observe(rng)
    }

    fn step(&mut self, action: &[f64], rng: &mut dyn RngCore) -> StepOutcome {
        self.timestep += 1;
        let clamped: Vec<f64> = action
            .iter()
            .map(|a| a.clamp(-self.config.max_action, self.config.max_action))
            .collect();
        for (s, a) in self.state.iter_mut().zip(clamped.iter()) {
            *s += a * self.dt;
        }

        let dist = self.dist_to_goal();
        let goal_reached = dist < self.config.goal_radius;
        let violated_safety = self.inside_obstacle(&self.state);

        let mut reward = -dist;
        if goal_reached {
            reward += 10.0;
        }
        if violated_safety {
            reward -= 10.0;
        }

        let done = goal_reached || self.timestep >= self.max_timesteps;

        let info = json!({
            "true_state": self.state.clone(),
            "goal_reached": goal_reached,
            "violated_safety": violated_safety,
            "timestep": self.timestep,
        });

        StepOutcome {
            observation: self.observe(rng),
            reward,
            done,
            info,
        }
    }

    fn obs_noise(&self) -> f64 {
        self.config.observation_noise
    }

    fn get_messages(&mut self, rng: &mut dyn RngCore) -> Vec<Message> {
        if !self.enable_gossip_source {
            return Vec::new();
        }
        if rng.gen_range(0.0..1.0) < 0.1 {
            vec![Message::new(
                "location_north",
                "gossip",
                BelnapValue::Both,
                Predicate::HalfPlaneGreater {
                    axis: 1,
                    threshold: 0.0,
                },
            )]
        } else {
            Vec::new()
        }
    }

    fn query_observation(&self, rng: &mut dyn RngCore) -> Vec<f64> {
        let noise = self.config.observation_noise * 0.5;
        self.state
            .iter()
            .map(|x| x + gaussian_sample(rng) * noise)
            .collect()
    }
}

impl ForbiddenCircleEnv {
    fn observe(&self, rng: &mut (impl Rng + ?Sized)) -> Vec<f64> {
        let noise = self.config.observation_noise;
        self.state
            .iter()
            .map(|x| x + gaussian_sample(rng) * noise)
            .collect()
    }
}

fn gaussian_sample(rng: &mut (impl Rng + ?Sized)) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn reset_never_starts_inside_obstacle() {
        let mut env = ForbiddenCircleEnv::new(EnvConfig::default(), 50, false);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..50 {
            env.reset(&mut rng);
            assert!(!env.inside_obstacle(env.true_state()));
        }
    }

    #[test]
    fn step_clamps_action_and_reports_violation() {
        let mut env = ForbiddenCircleEnv::new(EnvConfig::default(), 50, false);
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        env.reset(&mut rng);
        // Drive straight at the obstacle center for long enough to enter it.
        let center = env.config.obstacle_center.clone();
        let state = env.state.clone();
        let direction: Vec<f64> = center
            .iter()
            .zip(state.iter())
            .map(|(c, s)| c - s)
            .collect();
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        let action: Vec<f64> = direction.iter().map(|d| d / norm).collect();
        let mut violated_any = false;
        for _ in 0..40 {
            let outcome = env.step(&action, &mut rng);
            if outcome.info["violated_safety"] == true {
                violated_any = true;
            }
        }
        assert!(violated_any);
    }

    #[test]
    fn episode_ends_at_horizon() {
        let mut env = ForbiddenCircleEnv::new(EnvConfig::default(), 5, false);
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        env.reset(&mut rng);
        let mut done = false;
        for _ in 0..5 {
            let outcome = env.step(&[0.0, 0.0], &mut rng);
            done = outcome.done;
        }
        assert!(done);
    }

    #[test]
    fn gossip_disabled_by_default_emits_nothing() {
        let mut env = ForbiddenCircleEnv::new(EnvConfig::default(), 50, false);
        let mut rng = rand::rngs::StdRng::seed_from_u64(6);
        assert!(env.get_messages(&mut rng).is_empty());
    }
}
