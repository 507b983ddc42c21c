//! HER-DDPG on the planar reach arm.
//!
//! ```text
//! config.yml ──► TrainingConfig ──┬──► DdpgNetwork<Autodiff<NdArray>>
//!                                 ├──► RolloutManager × ArmRolloutWorker
//!                                 ├──► RolloutEvaluator (trajectories.jsonl)
//!                                 └──► ConsoleLogger + CSVLogger (summaries.csv)
//! ```

use std::fs;
use std::path::Path;

use burn::backend::{Autodiff, NdArray};

use her_ddpg::{
    CSVLogger, ConsoleLogger, DdpgNetwork, MultiLogger, RolloutEvaluator, TestResult, Trainer,
    TrainingConfig, TrainingError,
};
use reach_arm::{observation_spec, rollout_manager, ArmConfig};

type B = Autodiff<NdArray<f32>>;

/// Test workspaces differ from the training stream but stay fixed per run.
const EVAL_SEED_OFFSET: u64 = 0x5EED;

pub fn run(config_path: &Path) -> i32 {
    let config = match TrainingConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };
    log::info!("loaded {}", config_path.display());

    match train(config) {
        Ok(history) => {
            for result in &history {
                log::info!(
                    "step {:>8}  train episodes {:>7}  test successes {:>4}  allowed size {:.3}",
                    result.global_step,
                    result.train_episodes,
                    result.test_successes,
                    result.allowed_size
                );
            }
            0
        }
        Err(TrainingError::Config(e)) => {
            log::error!("{}", e);
            1
        }
        Err(e) => {
            log::error!("training failed: {}", e);
            2
        }
    }
}

pub fn show_config(config_path: &Path) -> i32 {
    let resolved = TrainingConfig::from_file(config_path).and_then(|c| {
        ArmConfig::from_value(&c.environment)?;
        c.to_yaml()
    });
    match resolved {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

fn train(config: TrainingConfig) -> her_ddpg::Result<Vec<TestResult>> {
    let arm = ArmConfig::from_value(&config.environment)?;
    let spec = observation_spec(&arm);
    log::info!(
        "{} joints, {}x{} workspace image, observation size {}",
        spec.n_joints,
        spec.image_width,
        spec.image_height,
        spec.obs_size()
    );

    let run_dir = config.resolved_run_dir();
    fs::create_dir_all(&run_dir)?;

    let network = DdpgNetwork::<B>::new(spec, &config.network, &config.model, &Default::default());
    let rollout = rollout_manager(&config)?;

    let mut evaluator = RolloutEvaluator::new(
        config.test.number_of_episodes,
        config.general.random_seed.wrapping_add(EVAL_SEED_OFFSET),
    );
    if config.test.save_trajectories {
        evaluator = evaluator.with_trajectory_log(run_dir.join("trajectories.jsonl"))?;
    }

    let logger = MultiLogger::new()
        .add(ConsoleLogger::new())
        .add(CSVLogger::new(run_dir.join("summaries.csv"))?);

    let mut trainer = Trainer::new(config, network, rollout, evaluator, logger)?;
    trainer.run()
}
