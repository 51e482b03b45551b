//! Source reliability tracking.
//!
//! Reliability is modeled as a Beta-Bernoulli posterior per source: every
//! confirmed or refuted claim updates `(alpha, beta)`, and the agent reads
//! back a clipped reliability / logit whenever it needs to weigh a new
//! claim from that source.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const CLIP_EPSILON: f64 = 1e-6;

/// Beta-Bernoulli reliability estimate for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceTrust {
    alpha: f64,
    beta: f64,
}

impl Default for SourceTrust {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl SourceTrust {
    /// Seed a trust estimate from a prior reliability in `(0, 1)`.
    ///
    /// The prior is translated into a `(alpha, beta)` pair with a fixed
    /// pseudo-count of 2, matching the Beta-Bernoulli convention used
    /// elsewhere in this module.
    #[must_use]
    pub fn from_prior(reliability: f64) -> Self {
        let r = reliability.clamp(CLIP_EPSILON, 1.0 - CLIP_EPSILON);
        Self {
            alpha: 2.0 * r,
            beta: 2.0 * (1.0 - r),
        }
    }

    /// Record an observation of this source being right (`success = true`)
    /// or wrong, with an optional evidence weight (default 1.0).
    pub fn update(&mut self, success: bool, weight: f64) -> Result<(), DomainError> {
        if weight <= 0.0 {
            return Err(DomainError::NonPositiveWeight { value: weight });
        }
        if success {
            self.alpha += weight;
        } else {
            self.beta += weight;
        }
        Ok(())
    }

    /// Reliability `r_s = alpha / (alpha + beta)`, clipped away from 0/1.
    #[must_use]
    pub fn reliability(&self) -> f64 {
        let r = self.alpha / (self.alpha + self.beta);
        r.clamp(CLIP_EPSILON, 1.0 - CLIP_EPSILON)
    }

    /// `logit(r_s) = ln(r_s / (1 - r_s))`.
    #[must_use]
    pub fn logit(&self) -> f64 {
        let r = self.reliability();
        (r / (1.0 - r)).ln()
    }

    /// True when the clipped reliability sits at either bound, worth
    /// surfacing as a `NumericWarning` to callers.
    #[must_use]
    pub fn near_bounds(&self) -> bool {
        let r = self.reliability();
        r <= CLIP_EPSILON * 2.0 || r >= 1.0 - CLIP_EPSILON * 2.0
    }
}

/// Per-source trust registry, looked up or lazily created by claim source id.
///
/// Mirrors the global/domain-override split of a simple in-memory trust
/// model: here there is a single global map keyed by source id, guarded by
/// an `RwLock` so an agent's trust bookkeeping can be read from report code
/// without taking `&mut Agent`.
#[derive(Debug, Default)]
pub struct TrustRegistry {
    sources: RwLock<HashMap<String, SourceTrust>>,
    default_prior: f64,
}

impl TrustRegistry {
    /// Create a registry that seeds unseen sources with `default_prior`
    /// (must be in `(0, 1)`).
    #[must_use]
    pub fn new(default_prior: f64) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            default_prior: default_prior.clamp(CLIP_EPSILON, 1.0 - CLIP_EPSILON),
        }
    }

    /// Look up a source's trust, creating it from the default prior on
    /// first mention.
    #[must_use]
    pub fn get_or_insert(&self, source_id: &str) -> SourceTrust {
        {
            let guard = self.sources.read().expect("trust registry lock poisoned");
            if let Some(trust) = guard.get(source_id) {
                return *trust;
            }
        }
        let mut guard = self.sources.write().expect("trust registry lock poisoned");
        *guard
            .entry(source_id.to_string())
            .or_insert_with(|| SourceTrust::from_prior(self.default_prior))
    }

    /// Record an outcome for a source, creating it from the default prior
    /// if it hasn't been seen yet.
    pub fn record(&self, source_id: &str, success: bool, weight: f64) -> Result<(), DomainError> {
        let mut guard = self.sources.write().expect("trust registry lock poisoned");
        let trust = guard
            .entry(source_id.to_string())
            .or_insert_with(|| SourceTrust::from_prior(self.default_prior));
        trust.update(success, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reliability_is_one_half() {
        let trust = SourceTrust::default();
        assert!((trust.reliability() - 0.5).abs() < 1e-9);
        assert!((trust.logit() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn update_shifts_reliability() {
        let mut trust = SourceTrust::default();
        for _ in 0..10 {
            trust.update(true, 1.0).unwrap();
        }
        assert!(trust.reliability() > 0.8);
        assert!(trust.logit() > 0.0);
    }

    #[test]
    fn rejects_non_positive_weight() {
        let mut trust = SourceTrust::default();
        assert!(trust.update(true, 0.0).is_err());
        assert!(trust.update(true, -1.0).is_err());
    }

    #[test]
    fn registry_seeds_from_default_prior() {
        let registry = TrustRegistry::new(0.7);
        let trust = registry.get_or_insert("sensor-1");
        assert!((trust.reliability() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn registry_persists_updates() {
        let registry = TrustRegistry::new(0.5);
        registry.record("sensor-1", true, 5.0).unwrap();
        let trust = registry.get_or_insert("sensor-1");
        assert!(trust.reliability() > 0.5);
    }
}
