//! Four-valued (Belnap) semantic logic.
//!
//! `BelnapValue` is encoded directly as its two-bit representation so the
//! bilattice operations are plain bit manipulation rather than match arms.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const TRUTH_BIT: u8 = 0b01;
const FALSITY_BIT: u8 = 0b10;

/// A four-valued truth value: no information, true, false, or contradictory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BelnapValue {
    /// No evidence either way (00).
    Neither,
    /// Supported, not countered (01).
    True,
    /// Countered, not supported (10).
    False,
    /// Both supported and countered: a contradiction (11).
    Both,
}

impl BelnapValue {
    fn bits(self) -> u8 {
        match self {
            Self::Neither => 0b00,
            Self::True => TRUTH_BIT,
            Self::False => FALSITY_BIT,
            Self::Both => TRUTH_BIT | FALSITY_BIT,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Neither,
            0b01 => Self::True,
            0b10 => Self::False,
            _ => Self::Both,
        }
    }

    /// Negation: swap the truth and falsity bits.
    #[must_use]
    pub fn not(self) -> Self {
        let bits = self.bits();
        let truth = bits & TRUTH_BIT;
        let falsity = bits & FALSITY_BIT;
        Self::from_bits((falsity >> 1) | (truth << 1))
    }

    /// Truth-lattice meet (∧_t): min of truth bits, max of falsity bits.
    #[must_use]
    pub fn and_t(self, other: Self) -> Self {
        let (a, b) = (self.bits(), other.bits());
        let truth = (a & TRUTH_BIT).min(b & TRUTH_BIT);
        let falsity = (a & FALSITY_BIT).max(b & FALSITY_BIT);
        Self::from_bits(truth | falsity)
    }

    /// Truth-lattice join (∨_t): max of truth bits, min of falsity bits.
    #[must_use]
    pub fn or_t(self, other: Self) -> Self {
        let (a, b) = (self.bits(), other.bits());
        let truth = (a & TRUTH_BIT).max(b & TRUTH_BIT);
        let falsity = (a & FALSITY_BIT).min(b & FALSITY_BIT);
        Self::from_bits(truth | falsity)
    }

    /// Knowledge-lattice meet (⊗), consensus: bitwise AND.
    #[must_use]
    pub fn consensus(self, other: Self) -> Self {
        Self::from_bits(self.bits() & other.bits())
    }

    /// Knowledge-lattice join (⊕), gullibility: bitwise OR.
    #[must_use]
    pub fn gullibility(self, other: Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    /// The probability-space surrogate used by reports and calibration.
    #[must_use]
    pub fn probability_surrogate(self) -> f64 {
        match self {
            Self::True => 0.9,
            Self::False => 0.1,
            Self::Neither | Self::Both => 0.5,
        }
    }
}

impl std::fmt::Display for BelnapValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Neither => "⊥",
            Self::True => "t",
            Self::False => "f",
            Self::Both => "⊤",
        };
        write!(f, "{symbol}")
    }
}

/// Calibrated thresholds for `status()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Upper threshold: support at or above this counts as asserted.
    pub tau: f64,
    /// Lower threshold: support at or above this counts as non-negligible.
    pub tau_prime: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tau: 0.7,
            tau_prime: 0.3,
        }
    }
}

impl Thresholds {
    /// Validate the ordering invariant `tau_prime < 0.5 < tau`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.tau_prime < 0.5 && 0.5 < self.tau) {
            return Err(DomainError::InvalidThresholds {
                tau: self.tau,
                tau_prime: self.tau_prime,
            });
        }
        Ok(())
    }
}

/// Classify a claim's support/countersupport into a `BelnapValue`.
///
/// `support` and `countersupport` must lie in `[0.0, 1.0]`.
pub fn status(
    support: f64,
    countersupport: f64,
    thresholds: Thresholds,
) -> Result<BelnapValue, DomainError> {
    if !(0.0..=1.0).contains(&support) {
        return Err(DomainError::SupportOutOfRange { value: support });
    }
    if !(0.0..=1.0).contains(&countersupport) {
        return Err(DomainError::SupportOutOfRange {
            value: countersupport,
        });
    }
    let Thresholds { tau, tau_prime } = thresholds;
    Ok(
        if support >= tau && countersupport >= tau {
            BelnapValue::Both
        } else if support >= tau && countersupport < tau_prime {
            BelnapValue::True
        } else if countersupport >= tau && support < tau_prime {
            BelnapValue::False
        } else {
            BelnapValue::Neither
        },
    )
}

/// One labeled calibration example: support, countersupport, ground truth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Aggregated evidence for the claim.
    pub support: f64,
    /// Aggregated evidence against the claim.
    pub countersupport: f64,
    /// Ground truth label (true/false).
    pub ground_truth: bool,
}

/// A 2x2 cost matrix for false positives / false negatives.
#[derive(Debug, Clone, Copy)]
pub struct CostMatrix {
    /// Cost of predicting true when the label is false.
    pub false_positive: f64,
    /// Cost of predicting false when the label is true.
    pub false_negative: f64,
}

impl Default for CostMatrix {
    fn default() -> Self {
        Self {
            false_positive: 1.0,
            false_negative: 1.0,
        }
    }
}

/// Result of threshold calibration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// The calibrated upper threshold.
    pub tau: f64,
    /// The calibrated lower threshold.
    pub tau_prime: f64,
    /// Expected Calibration Error measured at the fixed reference thresholds
    /// (tau=0.7, tau_prime=0.3) before optimization.
    pub ece_before: f64,
    /// Expected Calibration Error at the calibrated thresholds.
    pub ece_after: f64,
}

fn expected_calibration_error(samples: &[CalibrationSample], thresholds: Thresholds) -> f64 {
    // 10 equal-width bins over the probability surrogate.
    const N_BINS: usize = 10;
    let mut bin_conf = [0.0_f64; N_BINS];
    let mut bin_acc = [0.0_f64; N_BINS];
    let mut bin_count = [0usize; N_BINS];

    for sample in samples {
        let value = match status(sample.support, sample.countersupport, thresholds) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let confidence = value.probability_surrogate();
        let bin = ((confidence * N_BINS as f64) as usize).min(N_BINS - 1);
        bin_conf[bin] += confidence;
        bin_acc[bin] += f64::from(u8::from(sample.ground_truth));
        bin_count[bin] += 1;
    }

    let total = samples.len() as f64;
    if total == 0.0 {
        return 0.0;
    }
    let mut ece = 0.0;
    for bin in 0..N_BINS {
        if bin_count[bin] == 0 {
            continue;
        }
        let n = bin_count[bin] as f64;
        let avg_conf = bin_conf[bin] / n;
        let avg_acc = bin_acc[bin] / n;
        ece += (n / total) * (avg_acc - avg_conf).abs();
    }
    ece
}

fn total_cost(samples: &[CalibrationSample], thresholds: Thresholds, cost: CostMatrix) -> f64 {
    let mut total = 0.0;
    for sample in samples {
        let value = match status(sample.support, sample.countersupport, thresholds) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let predicted_true = matches!(value, BelnapValue::True | BelnapValue::Both);
        if predicted_true && !sample.ground_truth {
            total += cost.false_positive;
        } else if !predicted_true && sample.ground_truth {
            total += cost.false_negative;
        }
    }
    total
}

/// Grid-search calibration of `(tau, tau_prime)` minimizing
/// `ECE + 0.1 * normalized_cost`.
///
/// `cost` defaults to unit cost for both false positives and false
/// negatives when `None`.
pub fn calibrate_thresholds(
    samples: &[CalibrationSample],
    cost: Option<CostMatrix>,
) -> CalibrationResult {
    let cost = cost.unwrap_or_default();
    let reference = Thresholds::default();
    let ece_before = expected_calibration_error(samples, reference);

    const RESOLUTION: usize = 20;
    const LAMBDA: f64 = 0.1;

    let mut best = (reference.tau, reference.tau_prime, f64::INFINITY);
    for i in 0..RESOLUTION {
        let tau = 0.55 + 0.40 * (i as f64) / (RESOLUTION as f64 - 1.0);
        for j in 0..RESOLUTION {
            let tau_prime = 0.05 + 0.40 * (j as f64) / (RESOLUTION as f64 - 1.0);
            if tau_prime >= 0.5 || tau <= 0.5 {
                continue;
            }
            let thresholds = Thresholds { tau, tau_prime };
            let ece = expected_calibration_error(samples, thresholds);
            let cost_total = total_cost(samples, thresholds, cost);
            let objective = ece + LAMBDA * (cost_total / samples.len().max(1) as f64);
            if objective < best.2 {
                best = (tau, tau_prime, objective);
            }
        }
    }

    let ece_after = expected_calibration_error(
        samples,
        Thresholds {
            tau: best.0,
            tau_prime: best.1,
        },
    );

    CalibrationResult {
        tau: best.0,
        tau_prime: best.1,
        ece_before,
        ece_after,
    }
}

/// Source-weighted probability surrogate (§4.12): shrinks toward 0.5 in
/// proportion to `1 - reliability`.
#[must_use]
pub fn source_weighted_surrogate(value: BelnapValue, reliability: f64) -> f64 {
    0.5 + (value.probability_surrogate() - 0.5) * reliability
}
