//! Training configuration loaded from YAML.
//!
//! Required keys (`general.random_seed`, `model.batch_size`, ...) have no
//! defaults and fail parsing when absent. Every other section is optional and
//! falls back to the defaults below. Unknown keys are ignored.
//!
//! ```yaml
//! general:
//!   random_seed: 1234
//!   updates_cycle_count: 10000
//!   episodes_per_update: 16
//!   model_updates_per_cycle: 40
//!   write_train_summaries: 100
//! model:
//!   batch_size: 512
//!   gamma: 0.99
//!   intial_samples_before_train: 1000
//!   use_reward_model: false
//! test:
//!   test_every_cycles: 10
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hindsight::HindsightStrategy;

// ============================================================================
// Errors
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Read { path: PathBuf, reason: String },
    /// YAML was malformed or a required key was missing.
    Parse(String),
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// A parameter combination is inconsistent.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            ConfigError::Parse(msg) => write!(f, "invalid configuration: {}", msg),
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::Invalid { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidCount { field, value });
    }
    Ok(())
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

// ============================================================================
// Sections
// ============================================================================

/// `general` section: run identity and loop cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Run name; artifacts go to `run_dir/name`.
    #[serde(default)]
    pub name: Option<String>,
    pub random_seed: u64,
    pub updates_cycle_count: usize,
    pub episodes_per_update: usize,
    pub model_updates_per_cycle: usize,
    pub write_train_summaries: usize,
    /// Root directory for checkpoints, summaries and trajectories.
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
    /// Cycles between checkpoints (0 = only at the end).
    #[serde(default = "default_save_every_cycles")]
    pub save_every_cycles: usize,
    /// Checkpoints kept on disk (0 = keep all).
    #[serde(default = "default_keep_checkpoints")]
    pub keep_checkpoints: usize,
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_save_every_cycles() -> usize {
    100
}

fn default_keep_checkpoints() -> usize {
    5
}

/// `model` section: replay and TD settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub batch_size: usize,
    pub gamma: f32,
    /// Warm-up threshold: updates start once the buffer holds more than this.
    pub intial_samples_before_train: usize,
    pub use_reward_model: bool,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Soft update coefficient for target networks.
    #[serde(default = "default_tau")]
    pub tau: f32,
}

fn default_buffer_size() -> usize {
    1_000_000
}

fn default_tau() -> f32 {
    0.05
}

/// `network` section: architecture and optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_layers: Vec<usize>,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub reward_lr: f64,
    pub l2_regularization_coefficient: f32,
    /// Gradient norm clipping (None = unclipped).
    pub gradient_limit: Option<f32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![256, 256, 256],
            actor_lr: 1e-4,
            critic_lr: 1e-3,
            reward_lr: 1e-3,
            l2_regularization_coefficient: 1e-4,
            gradient_limit: Some(5.0),
        }
    }
}

/// `hindsight` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HindsightConfig {
    pub enable: bool,
    #[serde(rename = "type")]
    pub strategy: HindsightStrategy,
    /// Relabeled goals per timestep.
    pub k: usize,
    /// Do not relabel episodes that already reached their goal.
    pub skip_successful: bool,
}

impl Default for HindsightConfig {
    fn default() -> Self {
        Self {
            enable: true,
            strategy: HindsightStrategy::Future,
            k: 4,
            skip_successful: false,
        }
    }
}

/// `curriculum` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// When false, difficulty is pinned to the maximum level.
    pub enabled: bool,
    pub start_size: f32,
    pub increase: f32,
    pub max_size: f32,
    /// Explicit level list, overriding start/increase/max when present.
    pub levels: Option<Vec<f32>>,
    pub promotion_threshold: f32,
    pub demotion_threshold: Option<f32>,
    pub min_window_episodes: usize,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_size: 0.1,
            increase: 0.1,
            max_size: 3.0,
            levels: None,
            promotion_threshold: 0.9,
            demotion_threshold: None,
            min_window_episodes: 100,
        }
    }
}

/// `rollout` section: worker pool and exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub workers: usize,
    /// Standard deviation of Gaussian action noise.
    pub exploration_noise: f32,
    /// Probability of replacing the policy action with a uniform random one.
    pub random_action_probability: f32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            exploration_noise: 0.2,
            random_action_probability: 0.2,
        }
    }
}

/// `test` section: evaluation cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub test_every_cycles: usize,
    #[serde(default = "default_test_episodes")]
    pub number_of_episodes: usize,
    /// Write successful evaluation trajectories as JSON lines.
    #[serde(default)]
    pub save_trajectories: bool,
}

fn default_test_episodes() -> usize {
    100
}

/// `reward` section: shaping shared by the simulator and hindsight relabeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub success_reward: f32,
    pub collision_reward: f32,
    pub keep_alive_reward: f32,
    /// Distance below which the end effector counts as at the goal.
    pub goal_tolerance: f32,
    /// Reference point compared against the goal pose.
    pub end_effector: String,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            success_reward: 1.0,
            collision_reward: -1.0,
            keep_alive_reward: -0.01,
            goal_tolerance: 0.04,
            end_effector: "end_effector".to_string(),
        }
    }
}

// ============================================================================
// Training Config
// ============================================================================

/// Complete, validated training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub general: GeneralConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub hindsight: HindsightConfig,
    #[serde(default)]
    pub curriculum: CurriculumConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    pub test: TestConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    /// Simulator parameters, interpreted by the environment crate.
    #[serde(default)]
    pub environment: serde_yaml::Value,
}

impl TrainingConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: TrainingConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML (resolved defaults included).
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Directory for this run's artifacts: `run_dir/name`, or `run_dir` when unnamed.
    pub fn resolved_run_dir(&self) -> PathBuf {
        match &self.general.name {
            Some(name) => self.general.run_dir.join(name),
            None => self.general.run_dir.clone(),
        }
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.general.random_seed = seed;
        self
    }

    /// Set the number of training cycles.
    pub fn with_updates_cycle_count(mut self, cycles: usize) -> Self {
        self.general.updates_cycle_count = cycles;
        self
    }

    /// Set the run directory.
    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.general.run_dir = run_dir.into();
        self
    }

    /// Set the number of rollout workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.rollout.workers = workers;
        self
    }

    /// Set the warm-up threshold.
    pub fn with_warmup(mut self, samples: usize) -> Self {
        self.model.intial_samples_before_train = samples;
        self
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.general;
        check_count("general.updates_cycle_count", g.updates_cycle_count)?;
        check_count("general.episodes_per_update", g.episodes_per_update)?;
        check_count("general.model_updates_per_cycle", g.model_updates_per_cycle)?;
        check_count("general.write_train_summaries", g.write_train_summaries)?;

        let m = &self.model;
        check_count("model.batch_size", m.batch_size)?;
        check_count("model.buffer_size", m.buffer_size)?;
        if m.batch_size > m.buffer_size {
            return Err(ConfigError::Invalid {
                field: "model.batch_size",
                reason: format!(
                    "batch size {} exceeds buffer size {}",
                    m.batch_size, m.buffer_size
                ),
            });
        }
        // gamma = 1 makes the label bound 1/(1-gamma) infinite
        check_range("model.gamma", m.gamma, 0.0, 0.9999)?;
        check_range("model.tau", m.tau, 0.0, 1.0)?;

        let n = &self.network;
        if n.hidden_layers.iter().any(|&h| h == 0) {
            return Err(ConfigError::InvalidCount {
                field: "network.hidden_layers",
                value: 0,
            });
        }
        for (field, lr) in [
            ("network.actor_lr", n.actor_lr),
            ("network.critic_lr", n.critic_lr),
            ("network.reward_lr", n.reward_lr),
        ] {
            check_range(field, lr as f32, f32::MIN_POSITIVE, 1.0)?;
        }
        check_range(
            "network.l2_regularization_coefficient",
            n.l2_regularization_coefficient,
            0.0,
            1.0,
        )?;
        if let Some(limit) = n.gradient_limit {
            check_range("network.gradient_limit", limit, f32::MIN_POSITIVE, f32::MAX)?;
        }

        let c = &self.curriculum;
        check_range("curriculum.promotion_threshold", c.promotion_threshold, 0.0, 1.0)?;
        if let Some(demotion) = c.demotion_threshold {
            check_range("curriculum.demotion_threshold", demotion, 0.0, c.promotion_threshold)?;
        }
        check_count("curriculum.min_window_episodes", c.min_window_episodes)?;
        match &c.levels {
            Some(levels) if levels.is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "curriculum.levels",
                    reason: "level list is empty".to_string(),
                });
            }
            Some(levels) if levels.windows(2).any(|w| w[1] <= w[0]) => {
                return Err(ConfigError::Invalid {
                    field: "curriculum.levels",
                    reason: "levels must be strictly increasing".to_string(),
                });
            }
            Some(_) => {}
            None => {
                if c.increase <= 0.0 {
                    return Err(ConfigError::OutOfRange {
                        field: "curriculum.increase",
                        value: c.increase,
                        min: f32::MIN_POSITIVE,
                        max: f32::MAX,
                    });
                }
                if c.max_size < c.start_size {
                    return Err(ConfigError::Invalid {
                        field: "curriculum.max_size",
                        reason: format!(
                            "max size {} is below start size {}",
                            c.max_size, c.start_size
                        ),
                    });
                }
            }
        }

        let r = &self.rollout;
        check_count("rollout.workers", r.workers)?;
        check_range("rollout.exploration_noise", r.exploration_noise, 0.0, f32::MAX)?;
        check_range(
            "rollout.random_action_probability",
            r.random_action_probability,
            0.0,
            1.0,
        )?;

        check_count("test.test_every_cycles", self.test.test_every_cycles)?;
        check_count("test.number_of_episodes", self.test.number_of_episodes)?;

        check_range(
            "reward.goal_tolerance",
            self.reward.goal_tolerance,
            f32::MIN_POSITIVE,
            f32::MAX,
        )?;
        if self.hindsight.enable && self.hindsight.k == 0 {
            return Err(ConfigError::InvalidCount {
                field: "hindsight.k",
                value: 0,
            });
        }

        Ok(())
    }
}
