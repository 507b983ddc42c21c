//! Critic labels and their sanity bound.
//!
//! ```text
//! y = r + γ * (1 - done) * Q_target(s', μ_target(s'))
//! ```
//!
//! With rewards in [-1, 1] a discounted return can never exceed
//! `1 / (1 - γ)` in magnitude; labels outside that range point at a reward
//! scale or gamma misconfiguration and are reported, not rejected.

use std::fmt;

/// Compute TD labels element-wise.
pub fn critic_labels(
    rewards: &[f32],
    terminated: &[bool],
    target_q: &[f32],
    gamma: f32,
) -> Vec<f32> {
    debug_assert_eq!(rewards.len(), terminated.len());
    debug_assert_eq!(rewards.len(), target_q.len());
    rewards
        .iter()
        .zip(terminated)
        .zip(target_q)
        .map(|((&r, &done), &q)| {
            let not_done = if done { 0.0 } else { 1.0 };
            r + gamma * not_done * q
        })
        .collect()
}

/// Theoretical label magnitude bound `1 / (1 - gamma)`.
pub fn label_limit(gamma: f32) -> f32 {
    1.0 / (1.0 - gamma)
}

/// A label batch with values outside `[-limit, limit]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRangeWarning {
    pub max_label: f32,
    pub min_label: f32,
    pub limit: f32,
    pub out_of_range: usize,
}

impl fmt::Display for NumericRangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} labels out of range (min {:.4}, max {:.4}, limit {:.4})",
            self.out_of_range, self.min_label, self.max_label, self.limit
        )
    }
}

/// Min and max of a label batch. Empty batches give `(0, 0)`.
pub fn label_range(labels: &[f32]) -> (f32, f32) {
    if labels.is_empty() {
        return (0.0, 0.0);
    }
    labels
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &l| {
            (lo.min(l), hi.max(l))
        })
}

/// Check labels against the bound; logs and returns a warning when violated.
pub fn check_label_bounds(labels: &[f32], gamma: f32) -> Option<NumericRangeWarning> {
    let limit = label_limit(gamma);
    let out_of_range = labels.iter().filter(|l| l.abs() > limit).count();
    if out_of_range == 0 {
        return None;
    }
    let (min_label, max_label) = label_range(labels);
    let warning = NumericRangeWarning {
        max_label,
        min_label,
        limit,
        out_of_range,
    };
    log::warn!("{}", warning);
    Some(warning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_respect_terminal_mask() {
        let labels = critic_labels(&[1.0, 1.0], &[false, true], &[5.0, 5.0], 0.9);
        assert!((labels[0] - 5.5).abs() < 1e-5);
        assert!((labels[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_label_limit() {
        assert!((label_limit(0.9) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_in_range_labels_pass() {
        assert!(check_label_bounds(&[9.9, -9.9, 0.0], 0.9).is_none());
    }

    #[test]
    fn test_out_of_range_labels_warn() {
        let warning = check_label_bounds(&[10.5, 3.0, -12.0], 0.9).unwrap();
        assert_eq!(warning.out_of_range, 2);
        assert_eq!(warning.max_label, 10.5);
        assert_eq!(warning.min_label, -12.0);
        assert!(warning.to_string().contains("2 labels out of range"));
    }

    #[test]
    fn test_label_range_empty() {
        assert_eq!(label_range(&[]), (0.0, 0.0));
    }
}
