//! Control-barrier-function quadratic program safety filter.
//!
//! No QP-solving crate exists in this crate's dependency stack, so the
//! filter solves its single-inequality-constraint QP directly from the
//! closed-form KKT stationarity conditions, iterated to convergence via
//! projected dual ascent. This keeps the "iteration cap" and "warm start"
//! contract meaningful: the dual variable persists across calls instead of
//! being reinitialized from zero every step.

use crate::barrier::BarrierFunction;
use crate::error::SolverError;

/// Outcome of a single filter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// The dual-ascent iteration converged within the cap.
    Optimal,
    /// The iteration cap was hit before convergence; the last iterate is
    /// returned anyway.
    OptimalInaccurate,
}

/// Result of one `CbfQpFilter::filter` call.
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// The filtered (safe) action.
    pub u_safe: Vec<f64>,
    /// The slack used to relax the constraint, if any.
    pub slack: f64,
    /// Whether the solve converged.
    pub status: SolverStatus,
}

/// A persistent CBF-QP filter instance. Owns its warm-start dual variable
/// across calls; re-instantiating per call is a correctness bug (it loses
/// the warm start this contract depends on).
pub struct CbfQpFilter {
    barrier: Box<dyn BarrierFunction>,
    /// Class-K gain (alpha in `dh/dt >= -alpha*h`).
    pub alpha: f64,
    /// Penalty weight on the slack variable.
    pub slack_penalty: f64,
    /// Iteration cap for the dual-ascent loop.
    pub max_iter: usize,
    mu: f64,
}

const CONVERGENCE_TOL: f64 = 1e-9;

impl CbfQpFilter {
    /// Construct a filter over `barrier` with the given gain, slack
    /// penalty, and iteration cap.
    #[must_use]
    pub fn new(barrier: Box<dyn BarrierFunction>, alpha: f64, slack_penalty: f64, max_iter: usize) -> Self {
        Self {
            barrier,
            alpha,
            slack_penalty,
            max_iter,
            mu: 0.0,
        }
    }

    /// Solve `minimize ||u - u_des||^2 + p*s` subject to
    /// `grad h(x) . u >= -alpha*h(x) - s`, `s >= 0`, warm-started from the
    /// dual variable left by the previous call.
    pub fn filter(&mut self, state: &[f64], u_desired: &[f64]) -> Result<FilterResult, SolverError> {
        let h = self.barrier.evaluate(state);
        let grad = self.barrier.gradient(state)?;
        let b = -self.alpha * h;

        // Exact Newton step for the (locally linear-in-mu) stationarity
        // condition: with u(mu) = u_des + (mu/2)*grad, dot(mu) is affine in
        // mu with slope 0.5*||grad||^2, so this step size zeroes the
        // residual in one move whenever the slack and mu>=0 branches don't
        // flip. A couple of extra iterations settle any branch flips.
        let grad_norm_sq: f64 = grad.iter().map(|g| g * g).sum();
        let step = 2.0 / grad_norm_sq;

        let mut mu = self.mu;
        let mut u = u_desired.to_vec();
        let mut slack = 0.0;
        let mut converged = false;

        for _ in 0..self.max_iter {
            for (u_i, (u_des_i, g_i)) in u.iter_mut().zip(u_desired.iter().zip(grad.iter())) {
                *u_i = u_des_i + 0.5 * mu * g_i;
            }
            let dot: f64 = grad.iter().zip(u.iter()).map(|(g, v)| g * v).sum();
            slack = (b - dot - self.slack_penalty).max(0.0);
            let residual = b - dot - slack;
            let new_mu = (mu + step * residual).max(0.0);
            let delta = (new_mu - mu).abs();
            mu = new_mu;
            if delta < CONVERGENCE_TOL {
                converged = true;
                break;
            }
        }

        // Recompute the final primal iterate at the converged/last dual value.
        for (u_i, (u_des_i, g_i)) in u.iter_mut().zip(u_desired.iter().zip(grad.iter())) {
            *u_i = u_des_i + 0.5 * mu * g_i;
        }
        let dot: f64 = grad.iter().zip(u.iter()).map(|(g, v)| g * v).sum();
        slack = (b - dot - self.slack_penalty).max(0.0);

        if u.iter().any(|v| !v.is_finite()) || !slack.is_finite() || !mu.is_finite() {
            return Err(SolverError::NonFiniteResult);
        }

        self.mu = mu;

        let status = if converged {
            SolverStatus::Optimal
        } else {
            SolverStatus::OptimalInaccurate
        };

        Ok(FilterResult {
            u_safe: u,
            slack,
            status,
        })
    }

    /// Whether the filter meaningfully deviated from the desired action.
    #[must_use]
    pub fn is_active(u_desired: &[f64], u_safe: &[f64]) -> bool {
        let dist_sq: f64 = u_desired
            .iter()
            .zip(u_safe.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        dist_sq.sqrt() > 1e-4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::CircleBarrier;

    fn make_filter() -> CbfQpFilter {
        CbfQpFilter::new(
            Box::new(CircleBarrier::new(vec![0.0, 0.0], 0.3)),
            0.5,
            1000.0,
            200,
        )
    }

    #[test]
    fn safe_state_barely_perturbs_desired_action() {
        let mut filter = make_filter();
        let result = filter.filter(&[2.0, 2.0], &[0.1, 0.1]).unwrap();
        assert!(!CbfQpFilter::is_active(&[0.1, 0.1], &result.u_safe));
    }

    #[test]
    fn approaching_boundary_filters_the_action() {
        let mut filter = make_filter();
        // Close to the boundary, heading straight at the center.
        let result = filter.filter(&[0.31, 0.0], &[-0.2, 0.0]).unwrap();
        assert!(result.u_safe[0] > -0.2);
    }

    #[test]
    fn filter_never_produces_non_finite_action() {
        let mut filter = make_filter();
        for _ in 0..20 {
            let result = filter.filter(&[0.31, 0.0], &[-0.4, 0.0]).unwrap();
            assert!(result.u_safe.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn singular_gradient_at_center_is_an_error() {
        let mut filter = make_filter();
        assert!(filter.filter(&[0.0, 0.0], &[0.1, 0.1]).is_err());
    }

    #[test]
    fn repeated_calls_reuse_warm_start() {
        let mut filter = make_filter();
        let first = filter.filter(&[0.31, 0.0], &[-0.4, 0.0]).unwrap();
        let second = filter.filter(&[0.31, 0.0], &[-0.4, 0.0]).unwrap();
        // Warm-started second call should already be at/near the fixed point.
        assert_eq!(second.status, SolverStatus::Optimal);
        let _ = first;
    }
}
