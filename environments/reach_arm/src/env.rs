//! Single-arm reaching environment.
//!
//! Actions are per-joint deltas in `[-1, 1]`, scaled by `max_joint_step`.
//! An episode ends on collision, on reaching the goal, or after `max_steps`.

use std::sync::Arc;

use rand::Rng;

use her_ddpg::{ArmState, EpisodeStatus, Pose3, ReachReward, WorkspaceImage};

use crate::config::ArmConfig;
use crate::goal_sampler::{GoalSampler, ReachTask};
use crate::kinematics::PlanarArm;
use crate::workspace::Workspace;

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: ArmState,
    pub reward: f32,
    pub status: EpisodeStatus,
}

/// Reaching task in a random obstacle workspace.
pub struct ReachEnv {
    config: ArmConfig,
    arm: PlanarArm,
    sampler: GoalSampler,
    reward: ReachReward,
    workspace: Workspace,
    image: Arc<WorkspaceImage>,
    joints: Vec<f32>,
    goal_pose: Pose3,
    goal_joints: Vec<f32>,
    steps: usize,
    status: EpisodeStatus,
}

impl ReachEnv {
    pub fn new(config: ArmConfig, reward: ReachReward) -> Self {
        let arm = PlanarArm::new(config.link_lengths.clone(), config.joint_limit);
        let sampler = GoalSampler::new(arm.clone(), reward.goal_tolerance, config.goal_attempts);
        let workspace = Workspace::empty(config.extent());
        let image = Arc::new(workspace.rasterize(config.image_width, config.image_height));
        let n = arm.n_joints();
        Self {
            config,
            arm,
            sampler,
            reward,
            workspace,
            image,
            joints: vec![0.0; n],
            goal_pose: [0.0; 3],
            goal_joints: vec![0.0; n],
            steps: 0,
            status: EpisodeStatus::Running,
        }
    }

    /// New workspace and task at `difficulty`; returns the start state.
    pub fn reset<R: Rng>(&mut self, difficulty: f32, rng: &mut R) -> ArmState {
        let mut sampled = None;
        for _ in 0..self.config.workspace_attempts {
            let workspace = Workspace::random(&self.config, rng);
            if let Some(task) = self.sampler.sample(&workspace, difficulty, rng) {
                sampled = Some((workspace, task));
                break;
            }
        }
        let (workspace, task) = match sampled {
            Some(found) => found,
            None => {
                log::warn!(
                    "no task found in {} workspaces at difficulty {:.3}, using an empty workspace",
                    self.config.workspace_attempts,
                    difficulty
                );
                let workspace = Workspace::empty(self.config.extent());
                let task = self.fallback_task(&workspace, difficulty, rng);
                (workspace, task)
            }
        };
        self.set_task(workspace, task)
    }

    fn fallback_task<R: Rng>(
        &self,
        workspace: &Workspace,
        difficulty: f32,
        rng: &mut R,
    ) -> ReachTask {
        self.sampler.sample(workspace, difficulty, rng).unwrap_or_else(|| {
            // Straight-up arm reaching a slightly bent pose.
            let start = vec![0.0; self.arm.n_joints()];
            let mut goal = start.clone();
            goal[0] = difficulty.min(self.arm.joint_limit());
            let ee = self.arm.end_effector(&goal);
            ReachTask {
                start_joints: start,
                goal_joints: goal,
                goal_pose: [ee[0], ee[1], 0.0],
            }
        })
    }

    /// Install a specific workspace and task.
    pub fn set_task(&mut self, workspace: Workspace, task: ReachTask) -> ArmState {
        self.image = Arc::new(
            workspace.rasterize(self.config.image_width, self.config.image_height),
        );
        self.workspace = workspace;
        self.joints = task.start_joints;
        self.goal_joints = task.goal_joints;
        self.goal_pose = task.goal_pose;
        self.steps = 0;
        self.status = EpisodeStatus::Running;
        self.state()
    }

    pub fn state(&self) -> ArmState {
        self.arm.state(&self.joints)
    }

    /// Apply `action` (one component per joint, clipped to `[-1, 1]`).
    pub fn step(&mut self, action: &[f32]) -> StepOutcome {
        for (q, a) in self.joints.iter_mut().zip(action) {
            *q += a.clamp(-1.0, 1.0) * self.config.max_joint_step;
        }
        self.arm.clamp(&mut self.joints);
        self.steps += 1;

        let next_state = self.state();
        let collided =
            self.arm.self_collides(&self.joints)
                || self.workspace.collides(&self.arm.forward(&self.joints));
        let (reward, _) = self.reward.evaluate(&next_state, &self.goal_pose, collided);

        self.status = if collided {
            EpisodeStatus::Collision
        } else if self.reward.is_goal_reached(&next_state, &self.goal_pose) {
            EpisodeStatus::Success
        } else if self.steps >= self.config.max_steps {
            EpisodeStatus::MaxLengthExceeded
        } else {
            EpisodeStatus::Running
        };

        StepOutcome {
            state: next_state,
            reward,
            status: self.status,
        }
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn image(&self) -> &Arc<WorkspaceImage> {
        &self.image
    }

    pub fn goal_pose(&self) -> Pose3 {
        self.goal_pose
    }

    pub fn goal_joints(&self) -> &[f32] {
        &self.goal_joints
    }

    pub fn joints(&self) -> &[f32] {
        &self.joints
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }
}
