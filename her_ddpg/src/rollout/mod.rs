//! Local pool of rollout workers.
//!
//! ```text
//!                    job channel (EpisodeRequest)
//! RolloutManager ─────────────────────────────┬──────────┬──────────┐
//!      ▲                                      ▼          ▼          ▼
//!      │                                  worker-0   worker-1   worker-N
//!      │                                      │          │          │
//!      └──────── result channel (index, EpisodeResult) ─┴──────────┘
//!
//!  PolicySlot (versioned actor bytes) is read by every worker before an episode.
//! ```
//!
//! `generate_episodes` is a barrier: it returns once every requested episode
//! has come back, reordered by request index. Each request carries a seed
//! drawn from the caller's RNG, so results do not depend on which worker ran
//! which episode.

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::ConfigError;
use crate::core::policy_slot::{policy_slot, SharedPolicySlot};
use crate::core::transition::EpisodeResult;
use crate::error::{Result, TrainingError};

/// Parameters of one episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeRequest {
    /// Position in the batch; results are returned in this order.
    pub index: usize,
    /// Curriculum difficulty (allowed path size).
    pub difficulty: f32,
    /// Seed for the workspace, goal and exploration noise of this episode.
    pub seed: u64,
    /// Apply exploration noise.
    pub explore: bool,
}

/// A simulator plus policy that runs single episodes.
pub trait RolloutWorker: Send + 'static {
    /// Replace the policy with serialized actor weights.
    fn load_policy(&mut self, weights: &[u8]) -> Result<()>;

    fn run_episode(&mut self, request: &EpisodeRequest) -> Result<EpisodeResult>;
}

/// Anything that can produce batches of episodes for the trainer.
pub trait EpisodeSource {
    /// Policy used by subsequent `generate_episodes` calls.
    fn set_policy_weights(&mut self, weights: Vec<u8>) -> Result<()>;

    /// Run `count` episodes at `difficulty`, ordered by request.
    fn generate_episodes(
        &mut self,
        count: usize,
        difficulty: f32,
        explore: bool,
        rng: &mut StdRng,
    ) -> Result<Vec<EpisodeResult>>;

    /// Stop all workers. Further calls fail.
    fn end(&mut self);
}

// ============================================================================
// Messages
// ============================================================================

struct Job {
    batch: u64,
    request: EpisodeRequest,
}

struct Reply {
    batch: u64,
    worker_id: usize,
    index: usize,
    result: std::result::Result<EpisodeResult, String>,
}

// ============================================================================
// Worker thread
// ============================================================================

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn worker_loop<W: RolloutWorker>(
    worker_id: usize,
    mut worker: W,
    slot: SharedPolicySlot,
    jobs: Receiver<Job>,
    replies: Sender<Reply>,
) {
    let mut loaded_version = 0u64;

    while let Ok(job) = jobs.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some((version, bytes)) = slot.newer_than(loaded_version) {
                worker.load_policy(&bytes)?;
                loaded_version = version;
            }
            worker.run_episode(&job.request)
        }));

        let result = match outcome {
            Ok(Ok(episode)) => Ok(episode),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload)),
        };
        let failed = result.is_err();

        let reply = Reply {
            batch: job.batch,
            worker_id,
            index: job.request.index,
            result,
        };
        if replies.send(reply).is_err() || failed {
            break;
        }
    }
}

// ============================================================================
// Rollout Manager
// ============================================================================

/// Thread pool that runs episodes on a set of [`RolloutWorker`]s.
pub struct RolloutManager {
    job_tx: Option<Sender<Job>>,
    reply_rx: Receiver<Reply>,
    handles: Vec<JoinHandle<()>>,
    slot: SharedPolicySlot,
    batch: u64,
}

impl RolloutManager {
    /// Spawn one named thread per worker.
    pub fn new<W: RolloutWorker>(workers: Vec<W>) -> Result<Self> {
        if workers.is_empty() {
            return Err(ConfigError::InvalidCount {
                field: "rollout.workers",
                value: 0,
            }
            .into());
        }

        let (job_tx, job_rx) = unbounded::<Job>();
        let (reply_tx, reply_rx) = unbounded::<Reply>();
        let slot = policy_slot();

        let mut handles = Vec::with_capacity(workers.len());
        for (worker_id, worker) in workers.into_iter().enumerate() {
            let jobs = job_rx.clone();
            let replies = reply_tx.clone();
            let slot = slot.clone();
            let handle = std::thread::Builder::new()
                .name(format!("Rollout-Worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, worker, slot, jobs, replies))?;
            handles.push(handle);
        }

        log::info!("started {} rollout workers", handles.len());

        Ok(Self {
            job_tx: Some(job_tx),
            reply_rx,
            handles,
            slot,
            batch: 0,
        })
    }

    /// Build `n` workers with `factory(worker_id)`.
    pub fn from_factory<W, F>(n: usize, mut factory: F) -> Result<Self>
    where
        W: RolloutWorker,
        F: FnMut(usize) -> Result<W>,
    {
        let workers = (0..n).map(&mut factory).collect::<Result<Vec<_>>>()?;
        Self::new(workers)
    }

    pub fn n_workers(&self) -> usize {
        self.handles.len()
    }

    /// Version of the last published policy (0 = none).
    pub fn policy_version(&self) -> u64 {
        self.slot.version()
    }

    /// Whether `end` has been called.
    pub fn is_stopped(&self) -> bool {
        self.job_tx.is_none()
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the job channel and workers exit.
        self.job_tx = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("rollout worker thread panicked during shutdown");
            }
        }
    }
}

impl EpisodeSource for RolloutManager {
    fn set_policy_weights(&mut self, weights: Vec<u8>) -> Result<()> {
        self.slot.publish(weights);
        Ok(())
    }

    fn generate_episodes(
        &mut self,
        count: usize,
        difficulty: f32,
        explore: bool,
        rng: &mut StdRng,
    ) -> Result<Vec<EpisodeResult>> {
        let job_tx = self.job_tx.as_ref().ok_or_else(|| TrainingError::WorkerFailure {
            worker_id: 0,
            reason: "rollout manager already stopped".to_string(),
        })?;

        self.batch += 1;
        let batch = self.batch;

        for index in 0..count {
            let request = EpisodeRequest {
                index,
                difficulty,
                seed: rng.gen(),
                explore,
            };
            job_tx
                .send(Job { batch, request })
                .map_err(|_| TrainingError::WorkerFailure {
                    worker_id: 0,
                    reason: "all rollout workers exited".to_string(),
                })?;
        }

        let mut slots: Vec<Option<EpisodeResult>> = (0..count).map(|_| None).collect();
        let mut received = 0;
        while received < count {
            let reply = self.reply_rx.recv().map_err(|_| TrainingError::WorkerFailure {
                worker_id: 0,
                reason: "all rollout workers exited".to_string(),
            })?;
            if reply.batch != batch {
                continue;
            }
            match reply.result {
                Ok(episode) => {
                    slots[reply.index] = Some(episode);
                    received += 1;
                }
                Err(reason) => {
                    log::error!("rollout worker {} failed: {}", reply.worker_id, reason);
                    return Err(TrainingError::WorkerFailure {
                        worker_id: reply.worker_id,
                        reason,
                    });
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    fn end(&mut self) {
        if !self.is_stopped() {
            self.stop();
            log::info!("rollout workers stopped");
        }
    }
}

impl Drop for RolloutManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::{ArmState, EpisodeStatus, WorkspaceImage};
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns an episode whose length and first joint encode the request.
    struct EchoWorker {
        loaded: Vec<u8>,
        fail_on: Option<usize>,
        panic_on: Option<usize>,
    }

    impl EchoWorker {
        fn new() -> Self {
            Self {
                loaded: Vec::new(),
                fail_on: None,
                panic_on: None,
            }
        }
    }

    impl RolloutWorker for EchoWorker {
        fn load_policy(&mut self, weights: &[u8]) -> Result<()> {
            self.loaded = weights.to_vec();
            Ok(())
        }

        fn run_episode(&mut self, request: &EpisodeRequest) -> Result<EpisodeResult> {
            if self.fail_on == Some(request.index) {
                return Err(TrainingError::MalformedEpisode("scripted failure".to_string()));
            }
            if self.panic_on == Some(request.index) {
                panic!("scripted panic");
            }
            // Later requests finish first to shuffle arrival order.
            std::thread::sleep(Duration::from_millis((8 - request.index.min(8)) as u64));

            let marker = self.loaded.first().copied().unwrap_or(0) as f32;
            let steps = 1 + request.index % 3;
            Ok(EpisodeResult {
                status: EpisodeStatus::MaxLengthExceeded,
                states: (0..=steps)
                    .map(|_| ArmState::from_joints(vec![request.index as f32, marker]))
                    .collect(),
                actions: vec![vec![0.0, 0.0]; steps],
                rewards: vec![request.seed as f32 % 7.0; steps],
                goal_pose: [0.0; 3],
                goal_joints: vec![0.0, 0.0],
                workspace_image: Arc::new(WorkspaceImage::empty(2, 2)),
            })
        }
    }

    #[test]
    fn test_results_returned_in_request_order() {
        let mut manager = RolloutManager::from_factory(3, |_| Ok(EchoWorker::new())).unwrap();
        assert_eq!(manager.n_workers(), 3);
        let mut rng = StdRng::seed_from_u64(0);

        let episodes = manager.generate_episodes(8, 0.5, true, &mut rng).unwrap();
        assert_eq!(episodes.len(), 8);
        for (i, episode) in episodes.iter().enumerate() {
            assert_eq!(episode.states[0].joints[0], i as f32);
            assert_eq!(episode.len(), 1 + i % 3);
        }
        manager.end();
        assert!(manager.is_stopped());
    }

    #[test]
    fn test_results_reproducible_for_same_seed() {
        let mut a = RolloutManager::from_factory(2, |_| Ok(EchoWorker::new())).unwrap();
        let mut b = RolloutManager::from_factory(4, |_| Ok(EchoWorker::new())).unwrap();

        let ra = a.generate_episodes(6, 1.0, true, &mut StdRng::seed_from_u64(9)).unwrap();
        let rb = b.generate_episodes(6, 1.0, true, &mut StdRng::seed_from_u64(9)).unwrap();
        let rewards_a: Vec<f32> = ra.iter().map(|e| e.rewards[0]).collect();
        let rewards_b: Vec<f32> = rb.iter().map(|e| e.rewards[0]).collect();
        assert_eq!(rewards_a, rewards_b);
    }

    #[test]
    fn test_workers_load_published_policy() {
        let mut manager = RolloutManager::from_factory(2, |_| Ok(EchoWorker::new())).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        manager.set_policy_weights(vec![42]).unwrap();
        assert_eq!(manager.policy_version(), 1);
        let episodes = manager.generate_episodes(4, 0.1, false, &mut rng).unwrap();
        assert!(episodes.iter().all(|e| e.states[0].joints[1] == 42.0));

        manager.set_policy_weights(vec![7]).unwrap();
        let episodes = manager.generate_episodes(4, 0.1, false, &mut rng).unwrap();
        assert!(episodes.iter().all(|e| e.states[0].joints[1] == 7.0));
    }

    #[test]
    fn test_zero_episodes() {
        let mut manager = RolloutManager::from_factory(1, |_| Ok(EchoWorker::new())).unwrap();
        let episodes = manager
            .generate_episodes(0, 0.1, true, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(episodes.is_empty());
    }

    #[test]
    fn test_worker_error_is_fatal() {
        let mut manager = RolloutManager::from_factory(2, |_| {
            let mut worker = EchoWorker::new();
            worker.fail_on = Some(3);
            Ok(worker)
        })
        .unwrap();
        let result = manager.generate_episodes(5, 0.1, true, &mut StdRng::seed_from_u64(0));
        match result {
            Err(TrainingError::WorkerFailure { reason, .. }) => {
                assert!(reason.contains("scripted failure"))
            }
            other => panic!("expected worker failure, got {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn test_worker_panic_is_fatal() {
        let mut manager = RolloutManager::from_factory(2, |_| {
            let mut worker = EchoWorker::new();
            worker.panic_on = Some(1);
            Ok(worker)
        })
        .unwrap();
        let result = manager.generate_episodes(3, 0.1, true, &mut StdRng::seed_from_u64(0));
        match result {
            Err(TrainingError::WorkerFailure { reason, .. }) => {
                assert!(reason.contains("scripted panic"))
            }
            other => panic!("expected worker failure, got {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn test_empty_pool_rejected() {
        let result = RolloutManager::new(Vec::<EchoWorker>::new());
        assert!(matches!(result, Err(TrainingError::Config(ConfigError::InvalidCount { .. }))));
    }

    #[test]
    fn test_generate_after_end_fails() {
        let mut manager = RolloutManager::from_factory(1, |_| Ok(EchoWorker::new())).unwrap();
        manager.end();
        let result = manager.generate_episodes(1, 0.1, true, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(TrainingError::WorkerFailure { .. })));
    }
}
