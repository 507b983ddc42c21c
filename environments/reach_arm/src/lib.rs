//! Planar arm reaching simulator for `her_ddpg` rollouts.
//!
//! A serial arm with revolute joints moves in the upper half plane among
//! random box obstacles. Each episode samples a workspace, then a start and a
//! goal configuration whose joint-space distance is bounded by the curriculum
//! difficulty.
//!
//! # Example
//!
//! ```rust,ignore
//! use reach_arm::{rollout_manager, ArmConfig, observation_spec};
//!
//! let config = TrainingConfig::from_file("config/config.yml")?;
//! let arm = ArmConfig::from_value(&config.environment)?;
//! let spec = observation_spec(&arm);
//! let mut rollout = rollout_manager(&config)?;
//! ```

pub mod config;
pub mod env;
pub mod goal_sampler;
pub mod kinematics;
pub mod workspace;
pub mod worker;

pub use config::ArmConfig;
pub use env::{ReachEnv, StepOutcome};
pub use goal_sampler::{GoalSampler, ReachTask};
pub use kinematics::{PlanarArm, END_EFFECTOR};
pub use workspace::{Obstacle, Workspace};
pub use worker::{observation_spec, rollout_manager, ArmRolloutWorker, InferenceBackend};
