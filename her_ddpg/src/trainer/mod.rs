//! Training loop orchestration.
//!
//! One cycle:
//!
//! ```text
//! curriculum(last test counts) ──► allowed_size
//!        │
//!        ▼
//! publish actor weights ──► EpisodeSource::generate_episodes(explore)
//!        │
//!        ▼
//! HindsightPolicy ──► ReplayBuffer
//!        │
//!        ▼  (buffer.len() > intial_samples_before_train)
//! model_updates_per_cycle × ddpg_update ──► global_step += 1
//!        │
//!        ▼  (cycle % test_every_cycles == 0)
//! publish actor weights ──► TrajectoryEvaluator ──► TestResult
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::algorithms::ddpg::{ddpg_update, ActorCriticNetwork};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::TrainingConfig;
use crate::core::replay_buffer::{BufferConfig, ReplayBuffer};
use crate::core::reward::ReachReward;
use crate::core::transition::EpisodeStatus;
use crate::curriculum::CurriculumManager;
use crate::error::Result;
use crate::evaluation::TrajectoryEvaluator;
use crate::hindsight::{HindsightPolicy, HindsightStats};
use crate::metrics::{MetricsLogger, SummaryEvent};
use crate::rollout::EpisodeSource;

pub use crate::metrics::EpisodeCounters;

/// One entry of the test history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub global_step: usize,
    /// Training episodes collected so far.
    pub train_episodes: usize,
    pub test_successes: usize,
    pub allowed_size: f32,
}

/// Owns every training component and runs the cycle loop.
pub struct Trainer<N, S, E, L>
where
    N: ActorCriticNetwork,
    S: EpisodeSource,
    E: TrajectoryEvaluator,
    L: MetricsLogger,
{
    config: TrainingConfig,
    network: N,
    source: S,
    evaluator: E,
    logger: L,
    buffer: ReplayBuffer,
    hindsight: HindsightPolicy,
    curriculum: CurriculumManager,
    checkpointer: Checkpointer,
    rng: StdRng,
    run_dir: PathBuf,
    global_step: usize,
    train_counters: EpisodeCounters,
    hindsight_stats: HindsightStats,
    test_episodes: usize,
    test_successes: usize,
    last_test_rate: Option<f32>,
    history: Vec<TestResult>,
}

impl<N, S, E, L> Trainer<N, S, E, L>
where
    N: ActorCriticNetwork,
    S: EpisodeSource,
    E: TrajectoryEvaluator,
    L: MetricsLogger,
{
    /// Validate `config`, create the run directory and write `config.yml` into it.
    pub fn new(
        config: TrainingConfig,
        network: N,
        source: S,
        evaluator: E,
        logger: L,
    ) -> Result<Self> {
        config.validate()?;

        let run_dir = config.resolved_run_dir();
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join("config.yml"), config.to_yaml()?)?;

        let checkpointer = Checkpointer::new(
            CheckpointerConfig::new(run_dir.join("checkpoints"))
                .with_save_interval(config.general.save_every_cycles)
                .with_keep_last_n(config.general.keep_checkpoints),
        )?;

        let buffer = ReplayBuffer::new(
            BufferConfig::new(config.model.buffer_size, config.model.batch_size),
        );
        let hindsight =
            HindsightPolicy::new(&config.hindsight, ReachReward::from_config(&config.reward));
        let curriculum = CurriculumManager::new(&config.curriculum);
        let rng = StdRng::seed_from_u64(config.general.random_seed);

        log::info!(
            "run directory {}, buffer capacity {}, initial difficulty {:.3}",
            run_dir.display(),
            buffer.capacity(),
            curriculum.allowed_size()
        );

        Ok(Self {
            config,
            network,
            source,
            evaluator,
            logger,
            buffer,
            hindsight,
            curriculum,
            checkpointer,
            rng,
            run_dir,
            global_step: 0,
            train_counters: EpisodeCounters::default(),
            hindsight_stats: HindsightStats::default(),
            test_episodes: 0,
            test_successes: 0,
            last_test_rate: None,
            history: Vec::new(),
        })
    }

    /// Run `updates_cycle_count` cycles and return the test history.
    ///
    /// The episode source is ended whether or not training succeeds.
    pub fn run(&mut self) -> Result<Vec<TestResult>> {
        let start = Instant::now();
        let result = self.run_cycles();
        self.source.end();
        self.logger.flush();
        result?;

        log::info!(
            "training finished in {:.1}s: {} cycles, {} optimization steps, {} train episodes",
            start.elapsed().as_secs_f32(),
            self.config.general.updates_cycle_count,
            self.global_step,
            self.train_counters.episodes
        );
        Ok(self.history.clone())
    }

    fn run_cycles(&mut self) -> Result<()> {
        for cycle in 0..self.config.general.updates_cycle_count {
            self.run_cycle(cycle)?;
        }
        self.network
            .save_checkpoint(&mut self.checkpointer, self.global_step, self.last_test_rate)
    }

    /// One full cycle: curriculum, collection, updates, test and checkpoint.
    pub fn run_cycle(&mut self, cycle: usize) -> Result<()> {
        let (allowed_size, has_changed) = self
            .curriculum
            .get_next_parameters(self.test_episodes, self.test_successes);
        // The curriculum keeps its own window, so each test result is handed over once.
        self.test_episodes = 0;
        self.test_successes = 0;
        if has_changed {
            log::info!("cycle {}: allowed size now {:.3}", cycle, allowed_size);
        }

        self.collect(allowed_size)?;
        self.optimize()?;

        if cycle % self.config.test.test_every_cycles == 0 {
            self.test(allowed_size)?;
        }

        if self.checkpointer.should_save(cycle) {
            self.network
                .save_checkpoint(&mut self.checkpointer, self.global_step, self.last_test_rate)?;
        }
        Ok(())
    }

    fn collect(&mut self, allowed_size: f32) -> Result<()> {
        let start = Instant::now();
        self.source
            .set_policy_weights(self.network.actor_online_weights()?)?;
        let episodes = self.source.generate_episodes(
            self.config.general.episodes_per_update,
            allowed_size,
            true,
            &mut self.rng,
        )?;

        for episode in &episodes {
            let stats = self
                .hindsight
                .append_to_replay_buffer(episode, &mut self.buffer, &mut self.rng)?;
            self.hindsight_stats.merge(stats);
            self.train_counters.episodes += 1;
            match episode.status {
                EpisodeStatus::MaxLengthExceeded => self.train_counters.max_length += 1,
                EpisodeStatus::Collision => self.train_counters.collisions += 1,
                EpisodeStatus::Success => self.train_counters.successes += 1,
                EpisodeStatus::Running => {}
            }
        }

        log::debug!(
            "data collection took {:.3}s ({} episodes, buffer {}/{})",
            start.elapsed().as_secs_f32(),
            episodes.len(),
            self.buffer.len(),
            self.buffer.capacity()
        );
        Ok(())
    }

    /// Whether the buffer holds enough data to start optimizing.
    pub fn is_warmed_up(&self) -> bool {
        self.buffer.len() > self.config.model.intial_samples_before_train && self.buffer.is_ready()
    }

    fn optimize(&mut self) -> Result<()> {
        if !self.is_warmed_up() {
            return Ok(());
        }

        let start = Instant::now();
        let model = &self.config.model;
        for _ in 0..self.config.general.model_updates_per_cycle {
            let batch = self.buffer.sample_batch(model.batch_size, &mut self.rng)?;
            let summary =
                ddpg_update(&mut self.network, &batch, model.gamma, model.use_reward_model)?;

            if self.global_step % self.config.general.write_train_summaries == 0 {
                self.logger.log(&SummaryEvent::TrainEpisodes {
                    step: self.global_step,
                    counters: self.train_counters,
                    hindsight: self.hindsight_stats,
                });
                self.logger.log(&SummaryEvent::Optimization {
                    step: self.global_step,
                    summary,
                });
            }
            self.global_step += 1;
        }

        log::debug!(
            "{} updates took {:.3}s",
            self.config.general.model_updates_per_cycle,
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    fn test(&mut self, allowed_size: f32) -> Result<()> {
        // Tests run on the weights the recorded step refers to.
        self.source
            .set_policy_weights(self.network.actor_online_weights()?)?;
        let summary = self
            .evaluator
            .evaluate(&mut self.source, self.global_step, allowed_size)?;
        self.test_episodes = summary.episodes;
        self.test_successes = summary.successes;
        self.last_test_rate = Some(summary.success_rate());

        self.logger.log(&SummaryEvent::TestEpisodes {
            step: self.global_step,
            summary,
        });
        self.logger.log(&SummaryEvent::Curriculum {
            step: self.global_step,
            allowed_size,
        });
        self.history.push(TestResult {
            global_step: self.global_step,
            train_episodes: self.train_counters.episodes,
            test_successes: summary.successes,
            allowed_size,
        });
        Ok(())
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn curriculum(&self) -> &CurriculumManager {
        &self.curriculum
    }

    pub fn train_counters(&self) -> EpisodeCounters {
        self.train_counters
    }

    /// Insertion counts accumulated over all training episodes.
    pub fn hindsight_stats(&self) -> HindsightStats {
        self.hindsight_stats
    }

    pub fn history(&self) -> &[TestResult] {
        &self.history
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}
