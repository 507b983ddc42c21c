//! Core data structures: transitions, replay storage, reward shaping,
//! target-network utilities and the policy broadcast slot.

pub mod policy_slot;
pub mod replay_buffer;
pub mod reward;
pub mod target_network;
pub mod transition;

pub use policy_slot::{policy_slot, PolicySlot, SharedPolicySlot};
pub use replay_buffer::{BufferConfig, ReplayBuffer, TransitionBatch};
pub use reward::ReachReward;
pub use target_network::{hard_copy, soft_update};
pub use transition::{ArmState, EpisodeResult, EpisodeStatus, Pose3, Transition, WorkspaceImage};
