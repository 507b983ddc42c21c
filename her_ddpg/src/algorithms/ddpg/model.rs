//! Default actor and critic architectures.
//!
//! ```text
//! Actor:   obs ──► [Linear ─ ReLU] × H ──► Linear ──► tanh ──► action ∈ [-1, 1]^n
//! Critic:  concat(obs, action) ──► [Linear ─ ReLU] × H ──► Linear ──► Q
//! ```
//!
//! The reward model reuses the critic architecture, regressing r(s, a).

use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Output layers start near zero so early actions and Q-values are small.
const HEAD_INIT_RANGE: f64 = 3e-3;

fn hidden_stack<B: Backend>(
    input: usize,
    hidden: &[usize],
    device: &B::Device,
) -> (Vec<Linear<B>>, usize) {
    let mut layers = Vec::with_capacity(hidden.len());
    let mut width = input;
    for &size in hidden {
        layers.push(LinearConfig::new(width, size).init(device));
        width = size;
    }
    (layers, width)
}

fn head<B: Backend>(input: usize, output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(input, output)
        .with_initializer(Initializer::Uniform {
            min: -HEAD_INIT_RANGE,
            max: HEAD_INIT_RANGE,
        })
        .init(device)
}

/// Deterministic policy network.
#[derive(Module, Debug)]
pub struct ActorNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    head: Linear<B>,
}

impl<B: Backend> ActorNet<B> {
    pub fn new(obs_size: usize, action_dim: usize, hidden: &[usize], device: &B::Device) -> Self {
        let (hidden, width) = hidden_stack(obs_size, hidden, device);
        Self {
            hidden,
            head: head(width, action_dim, device),
        }
    }

    /// `[batch, obs] -> [batch, action_dim]`, bounded by tanh.
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(obs, |x, layer| relu(layer.forward(x)));
        self.head.forward(x).tanh()
    }
}

/// State-action value network; also used as the reward model.
#[derive(Module, Debug)]
pub struct CriticNet<B: Backend> {
    hidden: Vec<Linear<B>>,
    head: Linear<B>,
}

impl<B: Backend> CriticNet<B> {
    pub fn new(obs_size: usize, action_dim: usize, hidden: &[usize], device: &B::Device) -> Self {
        let (hidden, width) = hidden_stack(obs_size + action_dim, hidden, device);
        Self {
            hidden,
            head: head(width, 1, device),
        }
    }

    /// `([batch, obs], [batch, action_dim]) -> [batch, 1]`.
    pub fn forward(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = Tensor::cat(vec![obs, action], 1);
        let x = self
            .hidden
            .iter()
            .fold(x, |x, layer| relu(layer.forward(x)));
        self.head.forward(x)
    }
}
