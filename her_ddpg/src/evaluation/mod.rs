//! Deterministic evaluation rollouts.
//!
//! Test episodes run without exploration noise. The evaluator reseeds its own
//! RNG on every call, so every evaluation at the same difficulty sees the same
//! workspaces and goals and successive results are comparable.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::core::transition::{EpisodeResult, EpisodeStatus, Pose3};
use crate::error::Result;
use crate::metrics::EpisodeCounters;
use crate::rollout::EpisodeSource;

/// Aggregated outcome of a batch of test episodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalSummary {
    pub episodes: usize,
    pub successes: usize,
    pub collisions: usize,
    pub max_length: usize,
    pub mean_reward: f32,
}

impl EvalSummary {
    pub fn from_episodes(episodes: &[EpisodeResult]) -> Self {
        let mut summary = EvalSummary {
            episodes: episodes.len(),
            ..Default::default()
        };
        let mut total_reward = 0.0;
        for episode in episodes {
            match episode.status {
                EpisodeStatus::Success => summary.successes += 1,
                EpisodeStatus::Collision => summary.collisions += 1,
                EpisodeStatus::MaxLengthExceeded => summary.max_length += 1,
                EpisodeStatus::Running => {}
            }
            total_reward += episode.total_reward();
        }
        if !episodes.is_empty() {
            summary.mean_reward = total_reward / episodes.len() as f32;
        }
        summary
    }

    pub fn counters(&self) -> EpisodeCounters {
        EpisodeCounters {
            episodes: self.episodes,
            successes: self.successes,
            collisions: self.collisions,
            max_length: self.max_length,
        }
    }

    pub fn success_rate(&self) -> f32 {
        self.counters().success_rate()
    }
}

/// Runs test episodes against an [`EpisodeSource`].
pub trait TrajectoryEvaluator {
    fn evaluate<S: EpisodeSource>(
        &mut self,
        source: &mut S,
        global_step: usize,
        difficulty: f32,
    ) -> Result<EvalSummary>;
}

/// One line of the trajectory log.
#[derive(Debug, Serialize)]
struct TrajectoryRecord<'a> {
    global_step: usize,
    difficulty: f32,
    index: usize,
    status: EpisodeStatus,
    total_reward: f32,
    goal_pose: Pose3,
    goal_joints: &'a [f32],
    joints: Vec<&'a [f32]>,
}

/// Evaluator that runs a fixed set of noise-free episodes.
pub struct RolloutEvaluator {
    episodes: usize,
    seed: u64,
    trajectory_log: Option<BufWriter<File>>,
}

impl RolloutEvaluator {
    /// `seed` fixes the test workspaces across evaluations.
    pub fn new(episodes: usize, seed: u64) -> Self {
        Self {
            episodes,
            seed,
            trajectory_log: None,
        }
    }

    /// Append successful test trajectories to `path` as JSON lines.
    pub fn with_trajectory_log(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        self.trajectory_log = Some(BufWriter::new(file));
        Ok(self)
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    fn write_trajectories(
        &mut self,
        global_step: usize,
        difficulty: f32,
        episodes: &[EpisodeResult],
    ) -> Result<()> {
        let Some(writer) = self.trajectory_log.as_mut() else {
            return Ok(());
        };
        for (index, episode) in episodes.iter().enumerate() {
            if episode.status != EpisodeStatus::Success {
                continue;
            }
            let record = TrajectoryRecord {
                global_step,
                difficulty,
                index,
                status: episode.status,
                total_reward: episode.total_reward(),
                goal_pose: episode.goal_pose,
                goal_joints: &episode.goal_joints,
                joints: episode.states.iter().map(|s| s.joints.as_slice()).collect(),
            };
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl TrajectoryEvaluator for RolloutEvaluator {
    fn evaluate<S: EpisodeSource>(
        &mut self,
        source: &mut S,
        global_step: usize,
        difficulty: f32,
    ) -> Result<EvalSummary> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let episodes = source.generate_episodes(self.episodes, difficulty, false, &mut rng)?;
        self.write_trajectories(global_step, difficulty, &episodes)?;
        Ok(EvalSummary::from_episodes(&episodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::{ArmState, WorkspaceImage};
    use rand::Rng;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn episode(status: EpisodeStatus, reward: f32) -> EpisodeResult {
        EpisodeResult {
            status,
            states: vec![ArmState::from_joints(vec![0.0]), ArmState::from_joints(vec![0.5])],
            actions: vec![vec![0.5]],
            rewards: vec![reward],
            goal_pose: [1.0, 0.0, 0.0],
            goal_joints: vec![0.5],
            workspace_image: Arc::new(WorkspaceImage::empty(2, 2)),
        }
    }

    /// Cycles statuses and records what it was asked for.
    struct ScriptedSource {
        explore_flags: Vec<bool>,
        seeds: Vec<u64>,
    }

    impl EpisodeSource for ScriptedSource {
        fn set_policy_weights(&mut self, _weights: Vec<u8>) -> Result<()> {
            Ok(())
        }

        fn generate_episodes(
            &mut self,
            count: usize,
            _difficulty: f32,
            explore: bool,
            rng: &mut StdRng,
        ) -> Result<Vec<EpisodeResult>> {
            self.explore_flags.push(explore);
            self.seeds.push(rng.gen());
            let statuses = [
                EpisodeStatus::Success,
                EpisodeStatus::Collision,
                EpisodeStatus::MaxLengthExceeded,
                EpisodeStatus::Success,
            ];
            Ok((0..count)
                .map(|i| episode(statuses[i % statuses.len()], i as f32))
                .collect())
        }

        fn end(&mut self) {}
    }

    fn source() -> ScriptedSource {
        ScriptedSource {
            explore_flags: Vec::new(),
            seeds: Vec::new(),
        }
    }

    #[test]
    fn test_summary_aggregation() {
        let episodes = vec![
            episode(EpisodeStatus::Success, 1.0),
            episode(EpisodeStatus::Collision, -1.0),
            episode(EpisodeStatus::MaxLengthExceeded, -0.5),
            episode(EpisodeStatus::Success, 1.5),
        ];
        let summary = EvalSummary::from_episodes(&episodes);
        assert_eq!(summary.episodes, 4);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.collisions, 1);
        assert_eq!(summary.max_length, 1);
        assert!((summary.mean_reward - 0.25).abs() < 1e-6);
        assert!((summary.success_rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_summary() {
        let summary = EvalSummary::from_episodes(&[]);
        assert_eq!(summary, EvalSummary::default());
    }

    #[test]
    fn test_evaluation_is_noise_free_and_reseeded() {
        let mut evaluator = RolloutEvaluator::new(8, 123);
        let mut source = source();

        let first = evaluator.evaluate(&mut source, 10, 0.3).unwrap();
        let second = evaluator.evaluate(&mut source, 20, 0.3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.episodes, 8);
        assert_eq!(first.successes, 4);
        assert_eq!(source.explore_flags, vec![false, false]);
        assert_eq!(source.seeds[0], source.seeds[1]);
    }

    #[test]
    fn test_trajectory_log_contains_successes_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("trajectories.jsonl");
        let mut evaluator = RolloutEvaluator::new(4, 0).with_trajectory_log(&path).unwrap();
        evaluator.evaluate(&mut source(), 5, 0.2).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["global_step"], 5);
        assert_eq!(record["status"], "success");
        assert_eq!(record["joints"].as_array().unwrap().len(), 2);
    }
}
