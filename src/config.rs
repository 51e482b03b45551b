//! Hierarchical agent configuration: JSON load, section-wise defaulting,
//! and the validation rules enforced at agent construction.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::risk::RiskMode;

/// Environment geometry and observation noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    /// Dimension of the hidden state.
    pub state_dim: usize,
    /// Dimension of the action.
    pub action_dim: usize,
    /// Radius of the forbidden disk.
    pub obstacle_radius: f64,
    /// Center of the forbidden disk.
    pub obstacle_center: Vec<f64>,
    /// Center of the goal region.
    pub goal_region: Vec<f64>,
    /// Radius of the goal region.
    pub goal_radius: f64,
    /// Standard deviation of observation noise.
    pub observation_noise: f64,
    /// Maximum per-axis action magnitude.
    pub max_action: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            state_dim: 2,
            action_dim: 2,
            obstacle_radius: 0.3,
            obstacle_center: vec![0.0, 0.0],
            goal_region: vec![0.8, 0.8],
            goal_radius: 0.1,
            observation_noise: 0.1,
            max_action: 0.15,
        }
    }
}

/// Risk measure selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    /// `"cvar"` or `"mean"`.
    pub mode: String,
    /// CVaR tail fraction.
    pub alpha: f64,
    /// Nested CVaR is declared but not implemented (SPEC_FULL.md §9,
    /// open question 3); rejected at validation time.
    pub nested: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            mode: "cvar".to_string(),
            alpha: 0.1,
            nested: false,
        }
    }
}

impl RiskConfig {
    /// Parse `mode` into a `RiskMode`.
    pub fn risk_mode(&self) -> Result<RiskMode, DomainError> {
        match self.mode.as_str() {
            "cvar" => Ok(RiskMode::Cvar),
            "mean" => Ok(RiskMode::Mean),
            other => Err(DomainError::InvalidConfig {
                field: "risk.mode".to_string(),
                reason: format!("unknown risk mode '{other}'"),
            }),
        }
    }
}

/// CBF-QP safety filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetyConfig {
    /// Whether the CBF-QP filter is enabled.
    pub cbf: bool,
    /// Class-K gain.
    pub barrier_alpha: f64,
    /// QP dual-ascent iteration cap.
    pub qp_max_iter: usize,
    /// Nominal constraint slack tolerance.
    pub qp_slack: f64,
    /// Penalty weight on the slack variable.
    pub slack_penalty: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            cbf: true,
            barrier_alpha: 0.5,
            qp_max_iter: 50,
            qp_slack: 1e-3,
            slack_penalty: 1000.0,
        }
    }
}

/// Particle belief configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeliefConfig {
    /// Number of particles.
    pub particles: usize,
    /// ESS fraction below which a resample is triggered.
    pub resample_threshold: f64,
    /// Process noise used by jitter after resampling.
    pub process_noise: f64,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            particles: 5000,
            resample_threshold: 0.5,
            process_noise: 0.01,
        }
    }
}

/// Active querying configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Whether active querying is enabled.
    pub enabled: bool,
    /// Accounting cost of issuing a query.
    pub cost: f64,
    /// EVI threshold to trigger a query.
    pub delta_star: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cost: 0.2,
            delta_star: 0.15,
        }
    }
}

/// Credal-set configuration, used when a `BelnapValue::Both` message
/// arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredalConfig {
    /// Prior reliability seeded for sources not yet seen.
    pub trust_init: f64,
    /// Number of extreme posteriors to construct.
    pub k: usize,
    /// Maximum logit magnitude spanned by the credal interval.
    pub lambda_s_max: f64,
}

impl Default for CredalConfig {
    fn default() -> Self {
        Self {
            trust_init: 0.7,
            k: 5,
            lambda_s_max: 4.0,
        }
    }
}

/// The full agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// RNG seed.
    pub seed: u64,
    /// Discount factor.
    pub discount: f64,
    /// Episode horizon.
    pub horizon: usize,
    /// Environment section.
    pub env: EnvConfig,
    /// Risk section.
    pub risk: RiskConfig,
    /// Safety section.
    pub safety: SafetyConfig,
    /// Belief section.
    pub belief: BeliefConfig,
    /// Query section.
    pub query: QueryConfig,
    /// Credal section, present whenever contradictory claims are expected.
    pub credal: Option<CredalConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            seed: 42,
            discount: 0.98,
            horizon: 50,
            env: EnvConfig::default(),
            risk: RiskConfig::default(),
            safety: SafetyConfig::default(),
            belief: BeliefConfig::default(),
            query: QueryConfig::default(),
            credal: None,
        }
    }
}

impl Configuration {
    /// Parse a configuration from a JSON string, falling back to defaults
    /// for any section (or sub-field) that is absent.
    pub fn from_json_str(text: &str) -> Result<Self, DomainError> {
        let config: Configuration =
            serde_json::from_str(text).map_err(|e| DomainError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file on disk.
    pub fn from_path(path: &std::path::Path) -> Result<Self, DomainError> {
        let text = std::fs::read_to_string(path).map_err(|e| DomainError::Io(e.to_string()))?;
        Self::from_json_str(&text)
    }

    /// Validate every section per SPEC_FULL.md §4.9 / §6.3.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.discount <= 0.0 || self.discount > 1.0 {
            return Err(DomainError::InvalidConfig {
                field: "discount".to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.horizon == 0 {
            return Err(DomainError::InvalidConfig {
                field: "horizon".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.belief.particles < 100 {
            return Err(DomainError::InvalidConfig {
                field: "belief.particles".to_string(),
                reason: "must be at least 100".to_string(),
            });
        }
        // particles > 100_000 is a warning elsewhere (reports/logging), not
        // a hard validation failure.
        if !(0.1..=0.9).contains(&self.belief.resample_threshold) {
            return Err(DomainError::InvalidConfig {
                field: "belief.resample_threshold".to_string(),
                reason: "must be in [0.1, 0.9]".to_string(),
            });
        }
        if self.env.state_dim == 0 {
            return Err(DomainError::InvalidConfig {
                field: "env.state_dim".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.env.observation_noise <= 0.0 {
            return Err(DomainError::InvalidConfig {
                field: "env.observation_noise".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.safety.cbf && self.safety.barrier_alpha <= 0.0 {
            return Err(DomainError::InvalidConfig {
                field: "safety.barrier_alpha".to_string(),
                reason: "must be positive when safety.cbf is enabled".to_string(),
            });
        }
        // slack_penalty < 1.0 is a warning in the original design, not a
        // hard failure: a very small penalty just makes the filter cheaply
        // trade safety margin for action fidelity.
        if let Some(credal) = &self.credal {
            if !(0.0..1.0).contains(&credal.trust_init) || credal.trust_init <= 0.0 {
                return Err(DomainError::InvalidConfig {
                    field: "credal.trust_init".to_string(),
                    reason: "must be in (0, 1)".to_string(),
                });
            }
        }
        if self.query.enabled {
            if self.query.cost < 0.0 {
                return Err(DomainError::InvalidConfig {
                    field: "query.cost".to_string(),
                    reason: "must be non-negative".to_string(),
                });
            }
            if self.query.delta_star <= 0.0 {
                return Err(DomainError::InvalidConfig {
                    field: "query.delta_star".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        if self.risk.nested {
            return Err(DomainError::NotImplemented {
                feature: "risk.nested".to_string(),
            });
        }
        self.risk.risk_mode()?;
        Ok(())
    }

    /// Whether `belief.particles` exceeds the soft ceiling (a
    /// `NumericWarning`-worthy condition the CLI surfaces, not a hard
    /// validation failure).
    #[must_use]
    pub fn particles_exceed_soft_ceiling(&self) -> bool {
        self.belief.particles > 100_000
    }

    /// Canonical JSON serialization used for `config_hash` (sorted keys via
    /// `serde_json::to_value` + `BTreeMap` re-keying is unnecessary here
    /// since `serde_json::Map` already preserves insertion order from the
    /// derived struct fields, which is itself stable across runs).
    pub fn canonical_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|e| DomainError::Json(e.to_string()))
    }
}
