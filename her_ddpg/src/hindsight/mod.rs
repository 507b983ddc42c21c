//! Hindsight Experience Replay.
//!
//! Every finished episode is stored twice over: once with its true goal, and
//! `k` more times per step with goals the arm actually achieved later in the
//! same episode. Relabeled rewards and terminal flags are recomputed with the
//! same [`ReachReward`] the simulator uses.
//!
//! ```text
//! states:   s0 ── s1 ── s2 ── ... ── sL
//!           t=0   │                   │
//!                 └─ Future: uniform in s[t+1..=L]
//!                                     └─ Final: s[L]
//! ```

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::HindsightConfig;
use crate::core::replay_buffer::ReplayBuffer;
use crate::core::reward::ReachReward;
use crate::core::transition::{EpisodeResult, EpisodeStatus, Transition};
use crate::error::{Result, TrainingError};

/// How substitute goals are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HindsightStrategy {
    /// A state visited after the current step, chosen uniformly.
    Future,
    /// The last state of the episode.
    Final,
}

/// Insertion counts for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HindsightStats {
    pub real: usize,
    pub relabeled: usize,
    /// Relabeled transitions that reach their substitute goal.
    pub relabeled_successes: usize,
}

impl HindsightStats {
    pub fn total(&self) -> usize {
        self.real + self.relabeled
    }

    pub fn merge(&mut self, other: HindsightStats) {
        self.real += other.real;
        self.relabeled += other.relabeled;
        self.relabeled_successes += other.relabeled_successes;
    }

    /// Share of relabeled transitions that reach their substitute goal.
    pub fn relabeled_success_rate(&self) -> f32 {
        if self.relabeled == 0 {
            0.0
        } else {
            self.relabeled_successes as f32 / self.relabeled as f32
        }
    }
}

/// Writes episodes into the replay buffer with hindsight relabeling.
#[derive(Debug, Clone)]
pub struct HindsightPolicy {
    enable: bool,
    strategy: HindsightStrategy,
    k: usize,
    skip_successful: bool,
    reward: ReachReward,
}

impl HindsightPolicy {
    pub fn new(config: &HindsightConfig, reward: ReachReward) -> Self {
        Self {
            enable: config.enable,
            strategy: config.strategy,
            k: config.k,
            skip_successful: config.skip_successful,
            reward,
        }
    }

    /// Relabeled goals per step that will actually be inserted for `status`.
    pub fn goals_per_step(&self, status: EpisodeStatus) -> usize {
        if !self.enable || (self.skip_successful && status == EpisodeStatus::Success) {
            0
        } else {
            self.k
        }
    }

    /// Insert the real and relabeled transitions of `episode`.
    ///
    /// An episode of length L produces `L * (1 + k)` insertions (just `L` when
    /// relabeling is disabled or skipped). Empty episodes insert nothing.
    pub fn append_to_replay_buffer(
        &self,
        episode: &EpisodeResult,
        buffer: &mut ReplayBuffer,
        rng: &mut StdRng,
    ) -> Result<HindsightStats> {
        episode.validate()?;
        let len = episode.len();
        let mut stats = HindsightStats::default();
        if len == 0 {
            return Ok(stats);
        }

        // Goals are resolved up front so a malformed episode inserts nothing.
        let k = self.goals_per_step(episode.status);
        let mut relabels = Vec::with_capacity(len * k);
        for t in 0..len {
            for _ in 0..k {
                let goal_idx = match self.strategy {
                    HindsightStrategy::Future => rng.gen_range(t + 1..=len),
                    HindsightStrategy::Final => len,
                };
                let goal_pose = *self
                    .reward
                    .achieved_pose(&episode.states[goal_idx])
                    .ok_or_else(|| {
                        TrainingError::MalformedEpisode(format!(
                            "state {} has no '{}' pose to relabel with",
                            goal_idx, self.reward.end_effector
                        ))
                    })?;
                relabels.push((t, goal_idx, goal_pose));
            }
        }

        for t in 0..len {
            let terminated = t == len - 1 && episode.status.is_terminal();
            buffer.insert(Transition::new(
                episode.states[t].clone(),
                episode.actions[t].clone(),
                episode.rewards[t],
                episode.states[t + 1].clone(),
                terminated,
                episode.goal_pose,
                episode.goal_joints.clone(),
                Arc::clone(&episode.workspace_image),
            ));
            stats.real += 1;
        }

        for (t, goal_idx, goal_pose) in relabels {
            let collided = episode.status == EpisodeStatus::Collision && t == len - 1;
            let next_state = &episode.states[t + 1];
            let (reward, terminated) = self.reward.evaluate(next_state, &goal_pose, collided);
            if terminated && !collided {
                stats.relabeled_successes += 1;
            }
            buffer.insert(Transition::new(
                episode.states[t].clone(),
                episode.actions[t].clone(),
                reward,
                next_state.clone(),
                terminated,
                goal_pose,
                episode.states[goal_idx].joints.clone(),
                Arc::clone(&episode.workspace_image),
            ));
            stats.relabeled += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::{ArmState, WorkspaceImage};
    use rand::SeedableRng;

    fn state(x: f32) -> ArmState {
        ArmState::from_joints(vec![x, -x]).with_pose("end_effector", [x, 0.0, 0.0])
    }

    /// Arm moving along x in unit steps, goal far away.
    fn episode(len: usize, status: EpisodeStatus) -> EpisodeResult {
        EpisodeResult {
            status,
            states: (0..=len).map(|i| state(i as f32)).collect(),
            actions: vec![vec![0.1, -0.1]; len],
            rewards: vec![-0.01; len],
            goal_pose: [100.0, 0.0, 0.0],
            goal_joints: vec![1.0, 1.0],
            workspace_image: Arc::new(WorkspaceImage::empty(4, 4)),
        }
    }

    fn policy(strategy: HindsightStrategy, k: usize, skip_successful: bool) -> HindsightPolicy {
        let config = HindsightConfig {
            enable: true,
            strategy,
            k,
            skip_successful,
        };
        HindsightPolicy::new(&config, ReachReward::default())
    }

    #[test]
    fn test_inserts_l_times_one_plus_k() {
        let mut rng = StdRng::seed_from_u64(0);
        for (len, k) in [(1, 4), (7, 4), (5, 1), (3, 8)] {
            let mut buffer = ReplayBuffer::with_capacity(1000);
            let stats = policy(HindsightStrategy::Future, k, false)
                .append_to_replay_buffer(
                    &episode(len, EpisodeStatus::MaxLengthExceeded),
                    &mut buffer,
                    &mut rng,
                )
                .unwrap();
            assert_eq!(buffer.len(), len * (1 + k));
            assert_eq!(stats.total(), len * (1 + k));
            assert_eq!(stats.real, len);
        }
    }

    #[test]
    fn test_empty_episode_inserts_nothing() {
        let mut buffer = ReplayBuffer::with_capacity(10);
        let mut rng = StdRng::seed_from_u64(0);
        let stats = policy(HindsightStrategy::Future, 4, false)
            .append_to_replay_buffer(&episode(0, EpisodeStatus::Collision), &mut buffer, &mut rng)
            .unwrap();
        assert!(buffer.is_empty());
        assert_eq!(stats, HindsightStats::default());
    }

    #[test]
    fn test_real_transitions_terminal_flags() {
        let mut rng = StdRng::seed_from_u64(0);
        for (status, last_terminal) in [
            (EpisodeStatus::Success, true),
            (EpisodeStatus::Collision, true),
            (EpisodeStatus::MaxLengthExceeded, false),
        ] {
            let mut buffer = ReplayBuffer::with_capacity(100);
            let mut config = HindsightConfig::default();
            config.enable = false;
            HindsightPolicy::new(&config, ReachReward::default())
                .append_to_replay_buffer(&episode(3, status), &mut buffer, &mut rng)
                .unwrap();
            let flags: Vec<bool> = buffer.iter_oldest_first().map(|t| t.terminated).collect();
            assert_eq!(flags, vec![false, false, last_terminal]);
        }
    }

    #[test]
    fn test_future_goals_come_from_later_states() {
        let mut buffer = ReplayBuffer::with_capacity(1000);
        let mut rng = StdRng::seed_from_u64(11);
        policy(HindsightStrategy::Future, 4, false)
            .append_to_replay_buffer(
                &episode(6, EpisodeStatus::MaxLengthExceeded),
                &mut buffer,
                &mut rng,
            )
            .unwrap();

        for t in buffer.iter_oldest_first().skip(6) {
            let step = t.state.joints[0];
            let goal_x = t.goal_pose[0];
            assert!(goal_x > step && goal_x <= 6.0, "goal {} for step {}", goal_x, step);
            assert_eq!(t.goal_joints, vec![goal_x, -goal_x]);
            // Reaching the relabeled goal is exactly goal == next state
            let reached = (goal_x - t.next_state.joints[0]).abs() < 1e-6;
            assert_eq!(t.terminated, reached);
            assert_eq!(t.reward, if reached { 1.0 } else { -0.01 });
        }
    }

    #[test]
    fn test_final_strategy_uses_last_state() {
        let mut buffer = ReplayBuffer::with_capacity(100);
        let mut rng = StdRng::seed_from_u64(0);
        let stats = policy(HindsightStrategy::Final, 2, false)
            .append_to_replay_buffer(
                &episode(4, EpisodeStatus::MaxLengthExceeded),
                &mut buffer,
                &mut rng,
            )
            .unwrap();

        assert!(buffer
            .iter_oldest_first()
            .skip(4)
            .all(|t| t.goal_pose == [4.0, 0.0, 0.0]));
        // Only the last step reaches the final state, k times
        assert_eq!(stats.relabeled_successes, 2);
    }

    #[test]
    fn test_collision_stays_terminal_when_relabeled() {
        let mut buffer = ReplayBuffer::with_capacity(100);
        let mut rng = StdRng::seed_from_u64(0);
        policy(HindsightStrategy::Final, 1, false)
            .append_to_replay_buffer(&episode(3, EpisodeStatus::Collision), &mut buffer, &mut rng)
            .unwrap();

        let last_relabeled = buffer.iter_oldest_first().last().unwrap();
        assert!(last_relabeled.terminated);
        assert_eq!(last_relabeled.reward, -1.0);
    }

    #[test]
    fn test_skip_successful_policy() {
        let mut rng = StdRng::seed_from_u64(0);

        let mut buffer = ReplayBuffer::with_capacity(100);
        policy(HindsightStrategy::Future, 4, true)
            .append_to_replay_buffer(&episode(3, EpisodeStatus::Success), &mut buffer, &mut rng)
            .unwrap();
        assert_eq!(buffer.len(), 3);

        let mut buffer = ReplayBuffer::with_capacity(100);
        policy(HindsightStrategy::Future, 4, false)
            .append_to_replay_buffer(&episode(3, EpisodeStatus::Success), &mut buffer, &mut rng)
            .unwrap();
        assert_eq!(buffer.len(), 15);
    }

    #[test]
    fn test_malformed_episode_rejected() {
        let mut bad = episode(3, EpisodeStatus::Success);
        bad.rewards.pop();
        let mut buffer = ReplayBuffer::with_capacity(100);
        let mut rng = StdRng::seed_from_u64(0);
        let result = policy(HindsightStrategy::Future, 4, false)
            .append_to_replay_buffer(&bad, &mut buffer, &mut rng);
        assert!(matches!(result, Err(TrainingError::MalformedEpisode(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_missing_goal_pose_leaves_buffer_untouched() {
        let mut bad = episode(3, EpisodeStatus::MaxLengthExceeded);
        bad.states[3] = ArmState::from_joints(vec![3.0, -3.0]);
        let mut buffer = ReplayBuffer::with_capacity(100);
        let mut rng = StdRng::seed_from_u64(0);
        let result = policy(HindsightStrategy::Final, 2, false)
            .append_to_replay_buffer(&bad, &mut buffer, &mut rng);
        assert!(matches!(result, Err(TrainingError::MalformedEpisode(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stats_merge() {
        let mut total = HindsightStats::default();
        assert_eq!(total.relabeled_success_rate(), 0.0);
        total.merge(HindsightStats {
            real: 4,
            relabeled: 8,
            relabeled_successes: 2,
        });
        total.merge(HindsightStats {
            real: 1,
            relabeled: 2,
            relabeled_successes: 3,
        });
        assert_eq!(total.total(), 15);
        assert!((total.relabeled_success_rate() - 0.5).abs() < 1e-6);
    }
}
