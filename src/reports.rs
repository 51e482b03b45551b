//! Calibration, safety, risk, and credal reports over recorded episodes.
//!
//! These are pure functions over already-collected data; they perform no
//! I/O of their own (the CLI's `evaluate`/`calibrate` subcommands own
//! reading the input and writing the resulting JSON).

use serde::{Deserialize, Serialize};

use crate::episode::Episode;
use crate::risk::cvar;

/// Expected Calibration Error over equal-width bins.
#[must_use]
pub fn compute_ece(predictions: &[f64], labels: &[bool], n_bins: usize) -> f64 {
    assert_eq!(predictions.len(), labels.len());
    let n_bins = n_bins.max(1);
    let mut bin_conf = vec![0.0_f64; n_bins];
    let mut bin_acc = vec![0.0_f64; n_bins];
    let mut bin_count = vec![0usize; n_bins];

    for (p, label) in predictions.iter().zip(labels.iter()) {
        let bin = ((p * n_bins as f64) as usize).min(n_bins - 1);
        bin_conf[bin] += p;
        bin_acc[bin] += f64::from(u8::from(*label));
        bin_count[bin] += 1;
    }

    let total = predictions.len() as f64;
    if total == 0.0 {
        return 0.0;
    }
    let mut ece = 0.0;
    for bin in 0..n_bins {
        if bin_count[bin] == 0 {
            continue;
        }
        let n = bin_count[bin] as f64;
        ece += (n / total) * ((bin_acc[bin] / n) - (bin_conf[bin] / n)).abs();
    }
    ece
}

/// Brier score: mean squared error between predictions and labels.
#[must_use]
pub fn compute_brier(predictions: &[f64], labels: &[bool]) -> f64 {
    assert_eq!(predictions.len(), labels.len());
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, label)| (p - f64::from(u8::from(*label))).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

/// One bin of a reliability diagram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReliabilityBin {
    /// Mean predicted confidence within the bin.
    pub mean_confidence: f64,
    /// Empirical accuracy within the bin.
    pub empirical_accuracy: f64,
    /// Number of samples in the bin.
    pub count: usize,
}

/// Per-bin `(mean_confidence, empirical_accuracy, count)` for non-empty bins.
#[must_use]
pub fn reliability_diagram(predictions: &[f64], labels: &[bool], n_bins: usize) -> Vec<ReliabilityBin> {
    assert_eq!(predictions.len(), labels.len());
    let n_bins = n_bins.max(1);
    let mut bin_conf = vec![0.0_f64; n_bins];
    let mut bin_acc = vec![0.0_f64; n_bins];
    let mut bin_count = vec![0usize; n_bins];

    for (p, label) in predictions.iter().zip(labels.iter()) {
        let bin = ((p * n_bins as f64) as usize).min(n_bins - 1);
        bin_conf[bin] += p;
        bin_acc[bin] += f64::from(u8::from(*label));
        bin_count[bin] += 1;
    }

    (0..n_bins)
        .filter(|&bin| bin_count[bin] > 0)
        .map(|bin| {
            let n = bin_count[bin] as f64;
            ReliabilityBin {
                mean_confidence: bin_conf[bin] / n,
                empirical_accuracy: bin_acc[bin] / n,
                count: bin_count[bin],
            }
        })
        .collect()
}

/// Aggregate safety statistics over a set of recorded episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Number of episodes summarized.
    pub episodes: usize,
    /// Total steps across all episodes.
    pub total_steps: usize,
    /// Steps where `info.violated_safety` was true.
    pub violating_steps: usize,
    /// `violating_steps / total_steps`.
    pub violation_rate: f64,
    /// Fraction of steps where the safety filter was active.
    pub filter_activation_rate: f64,
}

/// Summarize safety behavior across `episodes`.
#[must_use]
pub fn safety_report(episodes: &[Episode]) -> SafetyReport {
    let mut total_steps = 0usize;
    let mut violating_steps = 0usize;
    let mut active_steps = 0usize;

    for episode in episodes {
        for step in &episode.steps {
            total_steps += 1;
            if step.info.get("violated_safety").and_then(|v| v.as_bool()) == Some(true) {
                violating_steps += 1;
            }
            if step.info.get("safety_filter_active").and_then(|v| v.as_bool()) == Some(true) {
                active_steps += 1;
            }
        }
    }

    let violation_rate = if total_steps > 0 {
        violating_steps as f64 / total_steps as f64
    } else {
        0.0
    };
    let filter_activation_rate = if total_steps > 0 {
        active_steps as f64 / total_steps as f64
    } else {
        0.0
    };

    SafetyReport {
        episodes: episodes.len(),
        total_steps,
        violating_steps,
        violation_rate,
        filter_activation_rate,
    }
}

/// Aggregate return statistics over a set of episode returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskReport {
    /// Mean return across episodes.
    pub mean_return: f64,
    /// CVaR of returns at the given alpha.
    pub cvar_return: f64,
    /// Worst observed return.
    pub worst_return: f64,
}

/// Summarize risk over a set of per-episode returns.
#[must_use]
pub fn risk_report(returns: &[f64], alpha: f64) -> RiskReport {
    let mean_return = returns.iter().sum::<f64>() / returns.len().max(1) as f64;
    let cvar_return = if returns.is_empty() { 0.0 } else { cvar(returns, alpha) };
    let worst_return = returns
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    RiskReport {
        mean_return,
        cvar_return,
        worst_return: if returns.is_empty() { 0.0 } else { worst_return },
    }
}

/// Aggregate credal-set activation statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CredalReport {
    /// Steps where a credal set was active.
    pub credal_steps: usize,
    /// Mean `K` over credal-active steps.
    pub mean_k: f64,
    /// Maximum `K` observed.
    pub max_k: usize,
}

/// Summarize credal-set activation across `episodes`.
#[must_use]
pub fn credal_report(episodes: &[Episode]) -> CredalReport {
    let mut credal_steps = 0usize;
    let mut sum_k = 0usize;
    let mut max_k = 0usize;

    for episode in episodes {
        for step in &episode.steps {
            let active = step.info.get("credal_set_active").and_then(|v| v.as_bool()) == Some(true);
            if !active {
                continue;
            }
            credal_steps += 1;
            if let Some(k) = step.info.get("credal_set_k").and_then(|v| v.as_u64()) {
                sum_k += k as usize;
                max_k = max_k.max(k as usize);
            }
        }
    }

    let mean_k = if credal_steps > 0 {
        sum_k as f64 / credal_steps as f64
    } else {
        0.0
    };

    CredalReport {
        credal_steps,
        mean_k,
        max_k,
    }
}
