//! Transition and episode types for goal-conditioned arm reaching.
//!
//! A state is the joint configuration plus the 3D position of every named
//! reference point on the arm (link ends, end effector). Goals carry both a
//! target end-effector pose and the joint configuration that produced it.
//!
//! # Data Flow
//!
//! ```text
//! Rollout worker ──> EpisodeResult ──> HindsightPolicy ──> Transition ──> ReplayBuffer
//!                    (states, actions,                     (real + relabeled)
//!                     rewards, goal, image)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// 3D position of a reference point.
pub type Pose3 = [f32; 3];

/// Euclidean distance between two poses.
pub fn pose_distance(a: &Pose3, b: &Pose3) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// Arm State
// ============================================================================

/// Arm configuration at a single timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    /// Joint angles, ordered from base to tip.
    pub joints: Vec<f32>,
    /// Named reference points and their positions.
    pub poses: BTreeMap<String, Pose3>,
}

impl ArmState {
    /// Create a state from joints and reference point poses.
    pub fn new(joints: Vec<f32>, poses: BTreeMap<String, Pose3>) -> Self {
        Self { joints, poses }
    }

    /// Create a state with no reference points (tests, synthetic data).
    pub fn from_joints(joints: Vec<f32>) -> Self {
        Self {
            joints,
            poses: BTreeMap::new(),
        }
    }

    /// Add a reference point.
    pub fn with_pose(mut self, name: impl Into<String>, pose: Pose3) -> Self {
        self.poses.insert(name.into(), pose);
        self
    }

    /// Position of a named reference point.
    pub fn pose(&self, name: &str) -> Option<&Pose3> {
        self.poses.get(name)
    }

    /// Number of joints.
    pub fn n_joints(&self) -> usize {
        self.joints.len()
    }
}

// ============================================================================
// Workspace Image
// ============================================================================

/// Rasterized occupancy image of the workspace obstacles.
///
/// Pixels are row-major with values in [0, 1] (1 = occupied). Every transition
/// of an episode shares one image through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceImage {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl WorkspaceImage {
    /// Create an image, checking that the pixel count matches the dimensions.
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self, TrainingError> {
        if pixels.len() != width * height {
            return Err(TrainingError::MalformedEpisode(format!(
                "workspace image has {} pixels, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// An image with no obstacles.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Number of pixels (network input size of the image).
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Fraction of occupied pixels.
    pub fn occupancy(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().filter(|&&p| p > 0.5).count() as f32 / self.pixels.len() as f32
    }
}

// ============================================================================
// Episode Status
// ============================================================================

/// Outcome of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Episode still in progress.
    Running,
    /// Step limit reached before reaching the goal.
    MaxLengthExceeded,
    /// The arm hit an obstacle.
    Collision,
    /// End effector reached the goal.
    Success,
}

impl EpisodeStatus {
    /// Legacy integer code (0 = running .. 3 = success).
    pub fn code(self) -> u8 {
        match self {
            EpisodeStatus::Running => 0,
            EpisodeStatus::MaxLengthExceeded => 1,
            EpisodeStatus::Collision => 2,
            EpisodeStatus::Success => 3,
        }
    }

    /// Parse a legacy integer code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EpisodeStatus::Running),
            1 => Some(EpisodeStatus::MaxLengthExceeded),
            2 => Some(EpisodeStatus::Collision),
            3 => Some(EpisodeStatus::Success),
            _ => None,
        }
    }

    /// Whether the final transition of an episode with this status is terminal.
    ///
    /// Hitting the step limit is a time limit, not a terminal state, so the
    /// critic keeps bootstrapping through it.
    pub fn is_terminal(self) -> bool {
        matches!(self, EpisodeStatus::Collision | EpisodeStatus::Success)
    }

    /// Whether the episode has finished.
    pub fn is_done(self) -> bool {
        self != EpisodeStatus::Running
    }
}

// ============================================================================
// Transition
// ============================================================================

/// A single goal-conditioned transition stored in the replay buffer.
///
/// `state` and `next_state` always share the same goal and workspace image.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: ArmState,
    pub action: Vec<f32>,
    pub reward: f32,
    pub next_state: ArmState,
    pub terminated: bool,
    pub goal_pose: Pose3,
    pub goal_joints: Vec<f32>,
    pub workspace_image: Arc<WorkspaceImage>,
}

impl Transition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: ArmState,
        action: Vec<f32>,
        reward: f32,
        next_state: ArmState,
        terminated: bool,
        goal_pose: Pose3,
        goal_joints: Vec<f32>,
        workspace_image: Arc<WorkspaceImage>,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminated,
            goal_pose,
            goal_joints,
            workspace_image,
        }
    }
}

// ============================================================================
// Episode Result
// ============================================================================

/// A completed episode as returned by a rollout worker.
#[derive(Debug, Clone)]
pub struct EpisodeResult {
    pub status: EpisodeStatus,
    /// States visited, `steps + 1` entries.
    pub states: Vec<ArmState>,
    /// Actions taken, `steps` entries.
    pub actions: Vec<Vec<f32>>,
    /// Rewards received, `steps` entries.
    pub rewards: Vec<f32>,
    pub goal_pose: Pose3,
    pub goal_joints: Vec<f32>,
    pub workspace_image: Arc<WorkspaceImage>,
}

impl EpisodeResult {
    /// Number of transitions in the episode.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Sum of rewards.
    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    /// Check `len(states) == len(actions) + 1 == len(rewards) + 1`.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.states.len() != self.actions.len() + 1 || self.actions.len() != self.rewards.len() {
            return Err(TrainingError::MalformedEpisode(format!(
                "episode has {} states, {} actions and {} rewards",
                self.states.len(),
                self.actions.len(),
                self.rewards.len()
            )));
        }
        Ok(())
    }
}
