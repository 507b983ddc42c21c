//! Simulator parameters, read from the `environment` section of the training YAML.
//!
//! ```yaml
//! environment:
//!   link_lengths: [0.4, 0.3, 0.2]
//!   max_joint_step: 0.1
//!   max_steps: 100
//!   image_width: 22
//!   image_height: 11
//!   max_obstacles: 3
//! ```
//!
//! The workspace is the upper half plane `x ∈ [-extent, extent], y ∈ [0, extent]`
//! with the arm base at the origin; the image rasterizes it at twice as many
//! columns as rows.

use serde::{Deserialize, Serialize};

use her_ddpg::config::ConfigError;

// ============================================================================
// Arm Configuration
// ============================================================================

/// Planar arm and workspace parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    /// Link lengths from base to tip; one revolute joint per link.
    pub link_lengths: Vec<f32>,
    /// Joints are limited to `[-joint_limit, joint_limit]` radians.
    pub joint_limit: f32,
    /// Joint change for a unit action component.
    pub max_joint_step: f32,
    /// Episode length limit.
    pub max_steps: usize,
    pub image_width: usize,
    pub image_height: usize,
    /// Obstacles per workspace, drawn uniformly from `0..=max_obstacles`.
    pub max_obstacles: usize,
    pub min_obstacle_size: f32,
    pub max_obstacle_size: f32,
    /// Obstacles keep this distance from the base.
    pub base_clearance: f32,
    /// Tries per workspace when sampling a start/goal pair.
    pub goal_attempts: usize,
    /// Workspaces tried before falling back to an empty one.
    pub workspace_attempts: usize,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            link_lengths: vec![0.4, 0.3, 0.2],
            joint_limit: 2.8,
            max_joint_step: 0.1,
            max_steps: 100,
            image_width: 22,
            image_height: 11,
            max_obstacles: 3,
            min_obstacle_size: 0.05,
            max_obstacle_size: 0.15,
            base_clearance: 0.15,
            goal_attempts: 200,
            workspace_attempts: 20,
        }
    }
}

impl ArmConfig {
    /// Parse the `environment` value. `null` yields the defaults.
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self, ConfigError> {
        let config: ArmConfig = if value.is_null() {
            ArmConfig::default()
        } else {
            serde_yaml::from_value(value.clone())?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_link_lengths(mut self, link_lengths: Vec<f32>) -> Self {
        self.link_lengths = link_lengths;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_image_size(mut self, width: usize, height: usize) -> Self {
        self.image_width = width;
        self.image_height = height;
        self
    }

    pub fn with_max_obstacles(mut self, max_obstacles: usize) -> Self {
        self.max_obstacles = max_obstacles;
        self
    }

    pub fn n_joints(&self) -> usize {
        self.link_lengths.len()
    }

    /// Full reach of the arm; also the half-width of the workspace.
    pub fn extent(&self) -> f32 {
        self.link_lengths.iter().sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link_lengths.is_empty() {
            return Err(ConfigError::InvalidCount {
                field: "environment.link_lengths",
                value: 0,
            });
        }
        if self.link_lengths.iter().any(|&l| l <= 0.0) {
            return Err(ConfigError::Invalid {
                field: "environment.link_lengths",
                reason: "link lengths must be positive".to_string(),
            });
        }
        for (field, value) in [
            ("environment.max_steps", self.max_steps),
            ("environment.image_width", self.image_width),
            ("environment.image_height", self.image_height),
            ("environment.goal_attempts", self.goal_attempts),
            ("environment.workspace_attempts", self.workspace_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if !(self.joint_limit > 0.0 && self.joint_limit <= std::f32::consts::PI) {
            return Err(ConfigError::OutOfRange {
                field: "environment.joint_limit",
                value: self.joint_limit,
                min: 0.0,
                max: std::f32::consts::PI,
            });
        }
        if self.max_joint_step <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "environment.max_joint_step",
                value: self.max_joint_step,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        if self.min_obstacle_size <= 0.0 || self.max_obstacle_size < self.min_obstacle_size {
            return Err(ConfigError::Invalid {
                field: "environment.max_obstacle_size",
                reason: format!(
                    "obstacle sizes must satisfy 0 < {} <= {}",
                    self.min_obstacle_size, self.max_obstacle_size
                ),
            });
        }
        Ok(())
    }
}
