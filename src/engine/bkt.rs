//! Bayesian Knowledge Tracing update.

use crate::engine::config::BktConfig;
use crate::store::operations::catalog::TopicParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BktParams {
    pub p_init: f64,
    pub p_transit: f64,
    pub p_guess: f64,
    pub p_slip: f64,
}

impl BktParams {
    /// Topic calibration over engine defaults. Absent or non-finite fields take
    /// the default; out-of-range values are clamped into `[0, 1]`.
    pub fn resolve(topic: Option<&TopicParameters>, defaults: &BktConfig) -> Self {
        let pick = |value: Option<f64>, default: f64| match value {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => default,
        };
        let topic = topic.cloned().unwrap_or_default();
        Self {
            p_init: pick(topic.p_init, defaults.p_init),
            p_transit: pick(topic.p_transit, defaults.p_transit),
            p_guess: pick(topic.p_guess, defaults.p_guess),
            p_slip: pick(topic.p_slip, defaults.p_slip),
        }
    }
}

/// P(mastered | observation). A zero denominator yields 0.
pub fn posterior(p_l: f64, correct: bool, params: &BktParams) -> f64 {
    let (p_g, p_s) = (params.p_guess, params.p_slip);
    let (numerator, denominator) = if correct {
        let n = p_l * (1.0 - p_s);
        (n, n + (1.0 - p_l) * p_g)
    } else {
        let n = p_l * p_s;
        (n, n + (1.0 - p_l) * (1.0 - p_g))
    };
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn clamp_mastery(p: f64, epsilon: f64) -> f64 {
    if p.is_nan() {
        return epsilon;
    }
    p.clamp(epsilon, 1.0 - epsilon)
}

/// Posterior followed by the learning transition, clamped to `[epsilon, 1 - epsilon]`.
///
/// Both bounds are inclusive: a saturated estimate sits exactly at `1 - epsilon`
/// (or `epsilon`), never beyond it.
pub fn update(p_l: f64, correct: bool, params: &BktParams, epsilon: f64) -> f64 {
    let p_l = clamp_mastery(p_l, epsilon);
    let post = posterior(p_l, correct, params);
    clamp_mastery(post + (1.0 - post) * params.p_transit, epsilon)
}
