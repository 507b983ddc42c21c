//! Start/goal sampling bounded by curriculum difficulty.
//!
//! Difficulty is the allowed joint-space path length: the goal configuration
//! lies within `difficulty` (Euclidean, radians) of the start. Both
//! configurations are collision free and the goal is not already reached at
//! the start.

use rand::Rng;

use her_ddpg::{pose_distance, Pose3};

use crate::kinematics::{joint_distance, PlanarArm};
use crate::workspace::Workspace;

/// A sampled task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachTask {
    pub start_joints: Vec<f32>,
    pub goal_joints: Vec<f32>,
    pub goal_pose: Pose3,
}

/// Samples tasks inside a given workspace.
#[derive(Debug, Clone)]
pub struct GoalSampler {
    arm: PlanarArm,
    goal_tolerance: f32,
    attempts: usize,
}

impl GoalSampler {
    pub fn new(arm: PlanarArm, goal_tolerance: f32, attempts: usize) -> Self {
        Self {
            arm,
            goal_tolerance,
            attempts,
        }
    }

    fn is_free(&self, workspace: &Workspace, joints: &[f32]) -> bool {
        !self.arm.self_collides(joints) && !workspace.collides(&self.arm.forward(joints))
    }

    fn random_configuration<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        let limit = self.arm.joint_limit();
        (0..self.arm.n_joints()).map(|_| rng.gen_range(-limit..=limit)).collect()
    }

    /// Uniform direction in joint space scaled to a radius in `(0, max_radius]`.
    fn random_offset<R: Rng>(&self, rng: &mut R, max_radius: f32) -> Vec<f32> {
        let n = self.arm.n_joints();
        let mut direction: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0f32..=1.0)).collect();
        let norm = direction.iter().map(|d| d * d).sum::<f32>().sqrt().max(1e-6);
        let radius = rng.gen_range(0.0..max_radius.max(1e-4));
        for d in direction.iter_mut() {
            *d *= radius / norm;
        }
        direction
    }

    /// Sample a task with `joint_distance(start, goal) <= difficulty`, or
    /// `None` if the workspace leaves no room within the attempt budget.
    pub fn sample<R: Rng>(
        &self,
        workspace: &Workspace,
        difficulty: f32,
        rng: &mut R,
    ) -> Option<ReachTask> {
        for _ in 0..self.attempts {
            let start = self.random_configuration(rng);
            if !self.is_free(workspace, &start) {
                continue;
            }
            let start_ee = self.arm.end_effector(&start);
            let start_pose = [start_ee[0], start_ee[1], 0.0];

            let mut goal: Vec<f32> = start
                .iter()
                .zip(self.random_offset(rng, difficulty))
                .map(|(q, dq)| q + dq)
                .collect();
            self.arm.clamp(&mut goal);
            if joint_distance(&start, &goal) > difficulty || !self.is_free(workspace, &goal) {
                continue;
            }

            let goal_ee = self.arm.end_effector(&goal);
            let goal_pose = [goal_ee[0], goal_ee[1], 0.0];
            if pose_distance(&start_pose, &goal_pose) < self.goal_tolerance {
                continue;
            }

            return Some(ReachTask {
                start_joints: start,
                goal_joints: goal,
                goal_pose,
            });
        }
        None
    }
}
