//! Reward shaping for goal-conditioned reaching.
//!
//! The simulator and hindsight relabeling share this function so relabeled
//! transitions carry exactly the reward the environment would have given.

use crate::config::RewardConfig;
use crate::core::transition::{pose_distance, ArmState, Pose3};

/// Sparse reach reward: success bonus, collision penalty, per-step keep-alive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachReward {
    pub success_reward: f32,
    pub collision_reward: f32,
    pub keep_alive_reward: f32,
    pub goal_tolerance: f32,
    pub end_effector: String,
}

impl ReachReward {
    pub fn from_config(config: &RewardConfig) -> Self {
        Self {
            success_reward: config.success_reward,
            collision_reward: config.collision_reward,
            keep_alive_reward: config.keep_alive_reward,
            goal_tolerance: config.goal_tolerance,
            end_effector: config.end_effector.clone(),
        }
    }

    /// End-effector pose of a state, if the state carries it.
    pub fn achieved_pose<'a>(&self, state: &'a ArmState) -> Option<&'a Pose3> {
        state.pose(&self.end_effector)
    }

    /// Whether the end effector of `state` lies within tolerance of `goal`.
    pub fn is_goal_reached(&self, state: &ArmState, goal: &Pose3) -> bool {
        self.achieved_pose(state)
            .map(|pose| pose_distance(pose, goal) < self.goal_tolerance)
            .unwrap_or(false)
    }

    /// Reward and terminal flag for arriving at `next_state`.
    ///
    /// Collision takes precedence over reaching the goal.
    pub fn evaluate(&self, next_state: &ArmState, goal: &Pose3, collided: bool) -> (f32, bool) {
        if collided {
            (self.collision_reward, true)
        } else if self.is_goal_reached(next_state, goal) {
            (self.success_reward, true)
        } else {
            (self.keep_alive_reward, false)
        }
    }
}

impl Default for ReachReward {
    fn default() -> Self {
        Self::from_config(&RewardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(x: f32) -> ArmState {
        ArmState::from_joints(vec![0.0]).with_pose("end_effector", [x, 0.0, 0.0])
    }

    #[test]
    fn test_evaluate_outcomes() {
        let reward = ReachReward::default();
        let goal = [1.0, 0.0, 0.0];

        assert_eq!(reward.evaluate(&state_at(1.01), &goal, false), (1.0, true));
        assert_eq!(reward.evaluate(&state_at(0.5), &goal, false), (-0.01, false));
        assert_eq!(reward.evaluate(&state_at(1.0), &goal, true), (-1.0, true));
    }

    #[test]
    fn test_missing_end_effector_never_reaches() {
        let reward = ReachReward::default();
        let state = ArmState::from_joints(vec![0.0]);
        assert!(!reward.is_goal_reached(&state, &[0.0; 3]));
    }
}
