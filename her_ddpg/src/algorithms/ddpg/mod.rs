//! Deep Deterministic Policy Gradient.
//!
//! Per optimization step:
//!
//! ```text
//! 1. labels   y = r + γ(1 - done) Q'(s', μ'(s'))      (target networks)
//! 2. check    |y| <= 1 / (1 - γ)                      (warning only)
//! 3. critic   min MSE(Q(s, a), y) + L2
//! 4. reward   min MSE(R(s, a), r)                     (optional)
//! 5. actor    max Q(s, μ(s))
//! 6. targets  θ' ← τθ + (1 - τ)θ'
//! ```

pub mod labels;
pub mod model;
pub mod network;
pub mod update;

pub use labels::{check_label_bounds, critic_labels, label_limit, NumericRangeWarning};
pub use model::{ActorNet, CriticNet};
pub use network::{
    ActorCriticNetwork, ActorPolicy, CriticStats, DdpgNetwork, NetworkInput, ObservationSpec,
};
pub use update::{ddpg_update, OptimizationSummary};
