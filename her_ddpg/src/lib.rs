//! # HER-DDPG: goal-conditioned reach training
//!
//! Trains a robotic-arm reaching policy with Deep Deterministic Policy
//! Gradient, Hindsight Experience Replay and a curriculum over workspace
//! difficulty.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           Trainer (1 thread)                          │
//! │                                                                       │
//! │  Curriculum ──difficulty──┐                                           │
//! │      ▲                    ▼                                           │
//! │      │            ┌───────────────┐    weights     ┌───────────────┐ │
//! │      │            │ RolloutManager│◄───PolicySlot──│  DdpgNetwork  │ │
//! │      │            │  worker 0..N  │                │ online/target │ │
//! │      │            └───────┬───────┘                └───────▲───────┘ │
//! │      │                    │ EpisodeResult                  │ batch   │
//! │      │                    ▼                                │         │
//! │      │            HindsightPolicy ──────► ReplayBuffer ────┘         │
//! │      │                                                               │
//! │  TrajectoryEvaluator (every test_every_cycles)                        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use her_ddpg::{Trainer, TrainingConfig};
//!
//! let config = TrainingConfig::from_file("config/config.yml")?;
//! let mut trainer = Trainer::new(config, network, rollout, evaluator, logger)?;
//! let history = trainer.run()?;
//! ```

pub mod algorithms;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod curriculum;
pub mod error;
pub mod evaluation;
pub mod hindsight;
pub mod metrics;
pub mod rollout;
pub mod trainer;

pub use crate::core::replay_buffer::{BufferConfig, ReplayBuffer, TransitionBatch};
pub use crate::core::reward::ReachReward;
pub use crate::core::transition::{
    pose_distance, ArmState, EpisodeResult, EpisodeStatus, Pose3, Transition, WorkspaceImage,
};
pub use algorithms::ddpg::{
    critic_labels, ddpg_update, ActorCriticNetwork, ActorPolicy, DdpgNetwork, NetworkInput,
    NumericRangeWarning, ObservationSpec, OptimizationSummary,
};
pub use checkpoint::{CheckpointError, Checkpointer, CheckpointerConfig};
pub use config::{ConfigError, TrainingConfig};
pub use curriculum::CurriculumManager;
pub use error::{Result, TrainingError};
pub use evaluation::{EvalSummary, RolloutEvaluator, TrajectoryEvaluator};
pub use hindsight::{HindsightPolicy, HindsightStats, HindsightStrategy};
pub use metrics::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, SummaryEvent};
pub use rollout::{EpisodeRequest, EpisodeSource, RolloutManager, RolloutWorker};
pub use trainer::{EpisodeCounters, TestResult, Trainer};
