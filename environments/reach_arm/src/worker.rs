//! Rollout worker driving [`ReachEnv`] with a broadcast actor.

use burn::backend::NdArray;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use her_ddpg::config::ConfigError;
use her_ddpg::{
    ActorPolicy, EpisodeRequest, EpisodeResult, ObservationSpec, ReachReward, Result,
    RolloutManager, RolloutWorker, TrainingConfig,
};

use crate::config::ArmConfig;
use crate::env::ReachEnv;

/// CPU backend used for inference inside worker threads.
pub type InferenceBackend = NdArray<f32>;

/// Network input layout produced by this simulator.
pub fn observation_spec(arm: &ArmConfig) -> ObservationSpec {
    ObservationSpec::new(arm.n_joints(), arm.image_width, arm.image_height)
}

/// One simulator plus a local copy of the actor.
pub struct ArmRolloutWorker {
    env: ReachEnv,
    policy: ActorPolicy<InferenceBackend>,
    noise: Normal<f32>,
    random_action_probability: f32,
}

impl ArmRolloutWorker {
    pub fn new(arm: ArmConfig, config: &TrainingConfig) -> Result<Self> {
        let noise = Normal::new(0.0, config.rollout.exploration_noise).map_err(|_| {
            ConfigError::OutOfRange {
                field: "rollout.exploration_noise",
                value: config.rollout.exploration_noise,
                min: 0.0,
                max: f32::MAX,
            }
        })?;
        let policy = ActorPolicy::new(
            observation_spec(&arm),
            &config.network.hidden_layers,
            &Default::default(),
        );
        let env = ReachEnv::new(arm, ReachReward::from_config(&config.reward));
        Ok(Self {
            env,
            policy,
            noise,
            random_action_probability: config.rollout.random_action_probability,
        })
    }

    /// Random action with probability `random_action_probability`, otherwise
    /// Gaussian noise on the policy action; clipped to `[-1, 1]`.
    fn explore(&self, action: &mut [f32], rng: &mut StdRng) {
        if rng.gen::<f32>() < self.random_action_probability {
            for a in action.iter_mut() {
                *a = rng.gen_range(-1.0..=1.0);
            }
        } else {
            for a in action.iter_mut() {
                *a = (*a + self.noise.sample(rng)).clamp(-1.0, 1.0);
            }
        }
    }
}

impl RolloutWorker for ArmRolloutWorker {
    fn load_policy(&mut self, weights: &[u8]) -> Result<()> {
        self.policy.load_bytes(weights)
    }

    fn run_episode(&mut self, request: &EpisodeRequest) -> Result<EpisodeResult> {
        let mut rng = StdRng::seed_from_u64(request.seed);
        let mut state = self.env.reset(request.difficulty, &mut rng);
        let goal_pose = self.env.goal_pose();
        let goal_joints = self.env.goal_joints().to_vec();
        let image = self.env.image().clone();

        let mut states = vec![state.clone()];
        let mut actions = Vec::new();
        let mut rewards = Vec::new();
        loop {
            let mut action = self.policy.act(&state.joints, &goal_pose, &goal_joints, &image)?;
            if request.explore {
                self.explore(&mut action, &mut rng);
            }
            let outcome = self.env.step(&action);
            actions.push(action);
            rewards.push(outcome.reward);
            states.push(outcome.state.clone());
            state = outcome.state;
            if outcome.status.is_done() {
                break;
            }
        }

        Ok(EpisodeResult {
            status: self.env.status(),
            states,
            actions,
            rewards,
            goal_pose,
            goal_joints,
            workspace_image: image,
        })
    }
}

/// Rollout pool of `config.rollout.workers` arm simulators.
pub fn rollout_manager(config: &TrainingConfig) -> Result<RolloutManager> {
    let arm = ArmConfig::from_value(&config.environment)?;
    RolloutManager::from_factory(config.rollout.workers, |_| {
        ArmRolloutWorker::new(arm.clone(), config)
    })
}
