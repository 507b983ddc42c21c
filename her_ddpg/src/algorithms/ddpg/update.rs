//! One DDPG optimization step over a sampled batch.

use crate::algorithms::ddpg::labels::{check_label_bounds, critic_labels, label_range};
use crate::algorithms::ddpg::network::ActorCriticNetwork;
use crate::core::replay_buffer::TransitionBatch;
use crate::error::Result;

/// Scalars produced by one optimization step, written to train summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptimizationSummary {
    pub critic_loss: f32,
    pub mean_q: f32,
    pub label_min: f32,
    pub label_max: f32,
    pub actor_loss: f32,
    pub reward_loss: Option<f32>,
    pub out_of_range_labels: usize,
}

/// Labels → critic → (reward model) → actor → target update.
pub fn ddpg_update<N: ActorCriticNetwork>(
    network: &mut N,
    batch: &TransitionBatch,
    gamma: f32,
    use_reward_model: bool,
) -> Result<OptimizationSummary> {
    let target_q = network.predict_target_policy_q(batch)?;
    let labels = critic_labels(&batch.rewards, &batch.terminated, &target_q, gamma);
    let warning = check_label_bounds(&labels, gamma);
    let (label_min, label_max) = label_range(&labels);

    let critic = network.train_critic(batch, &labels)?;
    let reward_loss = if use_reward_model {
        Some(network.train_reward(batch)?)
    } else {
        None
    };
    let actor_loss = network.train_actor(batch)?;
    network.update_target_networks();

    Ok(OptimizationSummary {
        critic_loss: critic.loss,
        mean_q: critic.mean_q,
        label_min,
        label_max,
        actor_loss,
        reward_loss,
        out_of_range_labels: warning.map(|w| w.out_of_range).unwrap_or(0),
    })
}
