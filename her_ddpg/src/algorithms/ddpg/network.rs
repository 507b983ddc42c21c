//! Online/target actor-critic parameter sets and their training ops.
//!
//! ```text
//! ┌──────────────── DdpgNetwork<B: AutodiffBackend> ─────────────────┐
//! │  online actor  (B)      ──soft_update──►  target actor  (inner)  │
//! │  online critic (B)      ──soft_update──►  target critic (inner)  │
//! │  reward model  (B, optional)                                     │
//! │  Adam × 3 (critic with L2 weight decay, all with norm clipping)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Targets live on the inner (non-autodiff) backend: they are only read for
//! labels and only written by Polyak averaging.

use std::panic::{self, AssertUnwindSafe};

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::ddpg::model::{ActorNet, CriticNet};
use crate::checkpoint::Checkpointer;
use crate::config::{ModelConfig, NetworkConfig};
use crate::core::replay_buffer::TransitionBatch;
use crate::core::target_network::soft_update;
use crate::core::transition::{ArmState, Pose3, WorkspaceImage};
use crate::error::{Result, TrainingError};

// ============================================================================
// Observation Encoding
// ============================================================================

/// Sizes of the network input pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationSpec {
    pub n_joints: usize,
    pub image_width: usize,
    pub image_height: usize,
}

impl ObservationSpec {
    pub fn new(n_joints: usize, image_width: usize, image_height: usize) -> Self {
        Self {
            n_joints,
            image_width,
            image_height,
        }
    }

    /// `joints ++ goal_pose ++ goal_joints ++ image`.
    pub fn obs_size(&self) -> usize {
        2 * self.n_joints + 3 + self.image_width * self.image_height
    }

    /// One action component per joint.
    pub fn action_dim(&self) -> usize {
        self.n_joints
    }
}

/// Row-major feature matrix built from goal-conditioned states.
#[derive(Debug, Clone)]
pub struct NetworkInput {
    spec: ObservationSpec,
    features: Vec<f32>,
    rows: usize,
}

impl NetworkInput {
    pub fn new(spec: ObservationSpec) -> Self {
        Self {
            spec,
            features: Vec::new(),
            rows: 0,
        }
    }

    /// Append one observation row.
    pub fn push(
        &mut self,
        joints: &[f32],
        goal_pose: &Pose3,
        goal_joints: &[f32],
        image: &WorkspaceImage,
    ) -> Result<()> {
        let spec = &self.spec;
        if joints.len() != spec.n_joints
            || goal_joints.len() != spec.n_joints
            || image.width() != spec.image_width
            || image.height() != spec.image_height
        {
            return Err(TrainingError::MalformedEpisode(format!(
                "observation does not match network input: {} joints, {} goal joints, {}x{} image \
                 (expected {} joints, {}x{} image)",
                joints.len(),
                goal_joints.len(),
                image.width(),
                image.height(),
                spec.n_joints,
                spec.image_width,
                spec.image_height
            )));
        }
        self.features.extend_from_slice(joints);
        self.features.extend_from_slice(goal_pose);
        self.features.extend_from_slice(goal_joints);
        self.features.extend_from_slice(image.pixels());
        self.rows += 1;
        Ok(())
    }

    fn from_states(
        spec: ObservationSpec,
        batch: &TransitionBatch,
        states: &[ArmState],
    ) -> Result<Self> {
        let mut input = Self::new(spec);
        input.features.reserve(states.len() * spec.obs_size());
        for (i, state) in states.iter().enumerate() {
            input.push(
                &state.joints,
                &batch.goal_poses[i],
                &batch.goal_joints[i],
                &batch.workspace_images[i],
            )?;
        }
        Ok(input)
    }

    /// Observations for `batch.states`.
    pub fn current_states(spec: ObservationSpec, batch: &TransitionBatch) -> Result<Self> {
        Self::from_states(spec, batch, &batch.states)
    }

    /// Observations for `batch.next_states`.
    pub fn next_states(spec: ObservationSpec, batch: &TransitionBatch) -> Result<Self> {
        Self::from_states(spec, batch, &batch.next_states)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(self.features.as_slice(), device)
            .reshape([self.rows, self.spec.obs_size()])
    }
}

fn actions_tensor<B: Backend>(
    actions: &[Vec<f32>],
    action_dim: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    if let Some(bad) = actions.iter().find(|a| a.len() != action_dim) {
        return Err(TrainingError::MalformedEpisode(format!(
            "action has {} components, expected {}",
            bad.len(),
            action_dim
        )));
    }
    let flat: Vec<f32> = actions.iter().flatten().copied().collect();
    Ok(Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([actions.len(), action_dim]))
}

fn tensor_to_scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_data().as_slice::<f32>().map(|s| s[0]).unwrap_or(f32::NAN)
}

fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f32> {
    tensor
        .into_data()
        .as_slice::<f32>()
        .map(|s| s.to_vec())
        .unwrap_or_default()
}

// ============================================================================
// Actor-Critic Interface
// ============================================================================

/// Critic step results.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CriticStats {
    pub loss: f32,
    pub mean_q: f32,
}

/// Training operations the update protocol needs from a network.
pub trait ActorCriticNetwork {
    /// `Q_target(s', μ_target(s'))` for every row of the batch.
    fn predict_target_policy_q(&self, batch: &TransitionBatch) -> Result<Vec<f32>>;

    /// One critic step on MSE against `labels`.
    fn train_critic(&mut self, batch: &TransitionBatch, labels: &[f32]) -> Result<CriticStats>;

    /// One reward-model step on MSE against the batch rewards.
    fn train_reward(&mut self, batch: &TransitionBatch) -> Result<f32>;

    /// One actor step maximizing `Q(s, μ(s))`. Returns the actor loss.
    fn train_actor(&mut self, batch: &TransitionBatch) -> Result<f32>;

    /// Polyak-average both targets towards the online networks.
    fn update_target_networks(&mut self);

    /// Serialized online actor weights for rollout workers.
    fn actor_online_weights(&self) -> Result<Vec<u8>>;

    /// Persist the online networks.
    fn save_checkpoint(
        &self,
        checkpointer: &mut Checkpointer,
        step: usize,
        metric: Option<f32>,
    ) -> Result<()>;
}

// ============================================================================
// DDPG Network
// ============================================================================

type AdamFor<M, B> = OptimizerAdaptor<Adam, M, B>;

/// Burn implementation of the DDPG actor-critic.
pub struct DdpgNetwork<B: AutodiffBackend> {
    spec: ObservationSpec,
    device: B::Device,
    actor: ActorNet<B>,
    critic: CriticNet<B>,
    reward_model: Option<CriticNet<B>>,
    target_actor: ActorNet<B::InnerBackend>,
    target_critic: CriticNet<B::InnerBackend>,
    actor_optimizer: AdamFor<ActorNet<B>, B>,
    critic_optimizer: AdamFor<CriticNet<B>, B>,
    reward_optimizer: AdamFor<CriticNet<B>, B>,
    actor_lr: f64,
    critic_lr: f64,
    reward_lr: f64,
    tau: f32,
}

impl<B: AutodiffBackend> DdpgNetwork<B> {
    /// Build online networks and hard-copy them into the targets.
    pub fn new(
        spec: ObservationSpec,
        network: &NetworkConfig,
        model: &ModelConfig,
        device: &B::Device,
    ) -> Self {
        let obs = spec.obs_size();
        let act = spec.action_dim();
        let actor = ActorNet::new(obs, act, &network.hidden_layers, device);
        let critic = CriticNet::new(obs, act, &network.hidden_layers, device);
        let reward_model = model
            .use_reward_model
            .then(|| CriticNet::new(obs, act, &network.hidden_layers, device));

        let clipping = network.gradient_limit.map(GradientClippingConfig::Norm);
        let base = AdamConfig::new()
            .with_epsilon(1e-5)
            .with_grad_clipping(clipping);
        let critic_config = base.clone().with_weight_decay(
            (network.l2_regularization_coefficient > 0.0)
                .then(|| WeightDecayConfig::new(network.l2_regularization_coefficient)),
        );

        Self {
            spec,
            device: device.clone(),
            target_actor: actor.valid(),
            target_critic: critic.valid(),
            actor,
            critic,
            reward_model,
            actor_optimizer: base.init(),
            critic_optimizer: critic_config.init(),
            reward_optimizer: base.init(),
            actor_lr: network.actor_lr,
            critic_lr: network.critic_lr,
            reward_lr: network.reward_lr,
            tau: model.tau,
        }
    }

    pub fn spec(&self) -> ObservationSpec {
        self.spec
    }

    pub fn actor(&self) -> &ActorNet<B> {
        &self.actor
    }

    pub fn critic(&self) -> &CriticNet<B> {
        &self.critic
    }

    pub fn target_actor(&self) -> &ActorNet<B::InnerBackend> {
        &self.target_actor
    }

    pub fn target_critic(&self) -> &CriticNet<B::InnerBackend> {
        &self.target_critic
    }
}

impl<B: AutodiffBackend> ActorCriticNetwork for DdpgNetwork<B> {
    fn predict_target_policy_q(&self, batch: &TransitionBatch) -> Result<Vec<f32>> {
        let next_obs = NetworkInput::next_states(self.spec, batch)?
            .to_tensor::<B::InnerBackend>(&self.device);
        let target_actions = self.target_actor.forward(next_obs.clone());
        let q = self.target_critic.forward(next_obs, target_actions);
        Ok(tensor_to_vec(q.flatten(0, 1)))
    }

    fn train_critic(&mut self, batch: &TransitionBatch, labels: &[f32]) -> Result<CriticStats> {
        let n = batch.len();
        let obs = NetworkInput::current_states(self.spec, batch)?.to_tensor::<B>(&self.device);
        let actions = actions_tensor::<B>(&batch.actions, self.spec.action_dim(), &self.device)?;
        let labels = Tensor::<B, 1>::from_floats(labels, &self.device).reshape([n, 1]);

        let q = self.critic.forward(obs, actions);
        let mean_q = tensor_to_scalar(q.clone().detach().mean());
        let loss = (q - labels).powf_scalar(2.0).mean();
        let loss_val = tensor_to_scalar(loss.clone().detach());

        let grads = GradientsParams::from_grads(loss.backward(), &self.critic);
        self.critic = self
            .critic_optimizer
            .step(self.critic_lr, self.critic.clone(), grads);

        Ok(CriticStats {
            loss: loss_val,
            mean_q,
        })
    }

    fn train_reward(&mut self, batch: &TransitionBatch) -> Result<f32> {
        let Some(reward_model) = self.reward_model.clone() else {
            return Ok(0.0);
        };
        let n = batch.len();
        let obs = NetworkInput::current_states(self.spec, batch)?.to_tensor::<B>(&self.device);
        let actions = actions_tensor::<B>(&batch.actions, self.spec.action_dim(), &self.device)?;
        let rewards =
            Tensor::<B, 1>::from_floats(batch.rewards.as_slice(), &self.device).reshape([n, 1]);

        let predicted = reward_model.forward(obs, actions);
        let loss = (predicted - rewards).powf_scalar(2.0).mean();
        let loss_val = tensor_to_scalar(loss.clone().detach());

        let grads = GradientsParams::from_grads(loss.backward(), &reward_model);
        self.reward_model = Some(self.reward_optimizer.step(self.reward_lr, reward_model, grads));
        Ok(loss_val)
    }

    fn train_actor(&mut self, batch: &TransitionBatch) -> Result<f32> {
        let obs = NetworkInput::current_states(self.spec, batch)?.to_tensor::<B>(&self.device);
        let actions = self.actor.forward(obs.clone());
        let q = self.critic.forward(obs, actions);
        let loss = q.mean().neg();
        let loss_val = tensor_to_scalar(loss.clone().detach());

        // Only actor parameters are stepped; critic gradients are dropped.
        let grads = GradientsParams::from_grads(loss.backward(), &self.actor);
        self.actor = self
            .actor_optimizer
            .step(self.actor_lr, self.actor.clone(), grads);
        Ok(loss_val)
    }

    fn update_target_networks(&mut self) {
        self.target_actor = soft_update::<B::InnerBackend, _>(
            &self.actor.valid(),
            self.target_actor.clone(),
            self.tau,
        );
        self.target_critic = soft_update::<B::InnerBackend, _>(
            &self.critic.valid(),
            self.target_critic.clone(),
            self.tau,
        );
    }

    fn actor_online_weights(&self) -> Result<Vec<u8>> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        recorder
            .record(self.actor.valid().into_record(), ())
            .map_err(|e| TrainingError::Serialization(e.to_string()))
    }

    fn save_checkpoint(
        &self,
        checkpointer: &mut Checkpointer,
        step: usize,
        metric: Option<f32>,
    ) -> Result<()> {
        checkpointer.save::<B::InnerBackend, _>("actor", &self.actor.valid(), step, metric)?;
        checkpointer.save::<B::InnerBackend, _>("critic", &self.critic.valid(), step, metric)?;
        if let Some(reward_model) = &self.reward_model {
            checkpointer.save::<B::InnerBackend, _>(
                "reward",
                &reward_model.valid(),
                step,
                metric,
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// Inference Policy
// ============================================================================

/// Actor used by rollout workers, reloaded from broadcast weights.
pub struct ActorPolicy<B: Backend> {
    spec: ObservationSpec,
    actor: ActorNet<B>,
    device: B::Device,
}

impl<B: Backend> ActorPolicy<B> {
    pub fn new(spec: ObservationSpec, hidden: &[usize], device: &B::Device) -> Self {
        Self {
            spec,
            actor: ActorNet::new(spec.obs_size(), spec.action_dim(), hidden, device),
            device: device.clone(),
        }
    }

    /// Replace the weights with bytes produced by `actor_online_weights`.
    ///
    /// The bytes recorder panics on truncated input, so decoding runs under
    /// `catch_unwind` and both failure kinds surface as `Serialization`.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
            recorder.load(bytes.to_vec(), &self.device)
        }));
        let record = match decoded {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => return Err(TrainingError::Serialization(e.to_string())),
            Err(_) => {
                return Err(TrainingError::Serialization(format!(
                    "malformed actor weights ({} bytes)",
                    bytes.len()
                )))
            }
        };
        self.actor = self.actor.clone().load_record(record);
        Ok(())
    }

    /// Deterministic action in [-1, 1]^n_joints.
    pub fn act(
        &self,
        joints: &[f32],
        goal_pose: &Pose3,
        goal_joints: &[f32],
        image: &WorkspaceImage,
    ) -> Result<Vec<f32>> {
        let mut input = NetworkInput::new(self.spec);
        input.push(joints, goal_pose, goal_joints, image)?;
        let action = self.actor.forward(input.to_tensor::<B>(&self.device));
        Ok(tensor_to_vec(action.flatten(0, 1)))
    }

    pub fn spec(&self) -> ObservationSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::Transition;
    use crate::core::replay_buffer::ReplayBuffer;
    use burn::backend::{Autodiff, NdArray};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn spec() -> ObservationSpec {
        ObservationSpec::new(2, 2, 2)
    }

    fn model_config(tau: f32, use_reward_model: bool) -> ModelConfig {
        ModelConfig {
            batch_size: 8,
            gamma: 0.9,
            intial_samples_before_train: 0,
            use_reward_model,
            buffer_size: 100,
            tau,
        }
    }

    fn network_config() -> NetworkConfig {
        NetworkConfig {
            hidden_layers: vec![16],
            ..NetworkConfig::default()
        }
    }

    fn test_network(
        tau: f32,
        use_reward_model: bool,
        device: &<TestBackend as Backend>::Device,
    ) -> DdpgNetwork<TestBackend> {
        DdpgNetwork::new(
            spec(),
            &network_config(),
            &model_config(tau, use_reward_model),
            device,
        )
    }

    fn batch(n: usize) -> TransitionBatch {
        let image = Arc::new(WorkspaceImage::empty(2, 2));
        let mut buffer = ReplayBuffer::with_capacity(n);
        for i in 0..n {
            let x = i as f32 * 0.1;
            buffer.insert(Transition::new(
                ArmState::from_joints(vec![x, -x]),
                vec![0.5, -0.5],
                if i % 2 == 0 { 1.0 } else { -0.01 },
                ArmState::from_joints(vec![x + 0.05, -x]),
                i % 2 == 0,
                [0.3, 0.2, 0.0],
                vec![0.1, 0.1],
                Arc::clone(&image),
            ));
        }
        buffer.sample_batch(n, &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_observation_spec_sizes() {
        let spec = ObservationSpec::new(3, 4, 4);
        assert_eq!(spec.obs_size(), 3 + 3 + 3 + 16);
        assert_eq!(spec.action_dim(), 3);
    }

    #[test]
    fn test_network_input_rejects_mismatched_dims() {
        let mut input = NetworkInput::new(spec());
        let image = WorkspaceImage::empty(2, 2);
        assert!(input.push(&[0.0, 0.0], &[0.0; 3], &[0.0, 0.0], &image).is_ok());
        assert!(input.push(&[0.0], &[0.0; 3], &[0.0, 0.0], &image).is_err());
        assert!(input
            .push(&[0.0, 0.0], &[0.0; 3], &[0.0, 0.0], &WorkspaceImage::empty(3, 2))
            .is_err());
        assert_eq!(input.rows(), 1);
        assert_eq!(input.features().len(), spec().obs_size());
    }

    #[test]
    fn test_targets_start_equal_to_online() {
        let device = Default::default();
        let network = test_network(0.05, false, &device);
        let b = batch(4);

        let target_q = network.predict_target_policy_q(&b).unwrap();
        let obs = NetworkInput::next_states(spec(), &b).unwrap().to_tensor::<NdArray<f32>>(&device);
        let online_actor = network.actor().valid();
        let online_q = network.critic().valid().forward(obs.clone(), online_actor.forward(obs));
        let online_q = tensor_to_vec(online_q.flatten(0, 1));

        for (t, o) in target_q.iter().zip(online_q.iter()) {
            assert!((t - o).abs() < 1e-6);
        }
    }

    #[test]
    fn test_critic_training_reduces_loss() {
        let device = Default::default();
        let mut network = test_network(0.05, false, &device);
        let b = batch(8);
        let labels = vec![1.0; 8];

        let first = network.train_critic(&b, &labels).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = network.train_critic(&b, &labels).unwrap();
        }
        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
        assert!(last.mean_q > first.mean_q);
    }

    #[test]
    fn test_actor_and_reward_steps_run() {
        let device = Default::default();
        let mut network = test_network(0.05, true, &device);
        let b = batch(8);

        assert!(network.train_actor(&b).unwrap().is_finite());
        assert!(network.train_reward(&b).unwrap() > 0.0);
    }

    #[test]
    fn test_soft_update_moves_targets_partially() {
        let device = Default::default();
        let mut network = test_network(0.5, false, &device);
        let b = batch(8);
        let before = network.predict_target_policy_q(&b).unwrap();

        for _ in 0..20 {
            network.train_critic(&b, &[2.0; 8]).unwrap();
        }
        let online = {
            let obs = NetworkInput::next_states(spec(), &b)
                .unwrap()
                .to_tensor::<NdArray<f32>>(&device);
            let actor = network.actor().valid();
            let q = network.critic().valid().forward(obs.clone(), actor.forward(obs));
            tensor_to_vec(q.flatten(0, 1))
        };
        network.update_target_networks();
        let after = network.predict_target_policy_q(&b).unwrap();

        // Targets move towards the online critic but do not reach it in one step
        let dist = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f32>();
        assert!(dist(&after, &online) < dist(&before, &online));
        assert!(dist(&after, &online) > 1e-4);
    }

    #[test]
    fn test_weight_broadcast_round_trip() {
        let device = Default::default();
        let network = test_network(0.05, false, &device);
        let bytes = network.actor_online_weights().unwrap();

        let mut policy = ActorPolicy::<NdArray<f32>>::new(spec(), &[16], &device);
        policy.load_bytes(&bytes).unwrap();

        let image = WorkspaceImage::empty(2, 2);
        let action = policy.act(&[0.1, 0.2], &[0.3, 0.2, 0.0], &[0.1, 0.1], &image).unwrap();

        let mut input = NetworkInput::new(spec());
        input.push(&[0.1, 0.2], &[0.3, 0.2, 0.0], &[0.1, 0.1], &image).unwrap();
        let expected = network.actor().valid().forward(input.to_tensor::<NdArray<f32>>(&device));
        let expected = tensor_to_vec(expected.flatten(0, 1));

        assert_eq!(action.len(), 2);
        for (a, e) in action.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_load_bytes_rejects_garbage() {
        let device = Default::default();
        let mut policy = ActorPolicy::<NdArray<f32>>::new(spec(), &[16], &device);
        for bytes in [&[][..], &[1, 2, 3][..]] {
            assert!(matches!(
                policy.load_bytes(bytes),
                Err(TrainingError::Serialization(_))
            ));
        }
    }
}
