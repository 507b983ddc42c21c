//! Uniform replay buffer over goal-conditioned transitions.
//!
//! - **Ring buffer** semantics (overwrite oldest when full)
//! - **Uniform sampling** with replacement from the stored transitions
//! - **Single owner**: the trainer thread inserts and samples, so no locking
//!
//! Sampling draws from a caller-supplied `StdRng` so a whole run is
//! reproducible from one seed.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::core::transition::{ArmState, Pose3, Transition, WorkspaceImage};
use crate::error::{Result, TrainingError};

// ============================================================================
// Buffer Configuration
// ============================================================================

/// Configuration for the replay buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum number of transitions to store.
    pub capacity: usize,
    /// Batch size for sampling.
    pub batch_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            batch_size: 512,
        }
    }
}

impl BufferConfig {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            capacity,
            batch_size,
        }
    }

    /// Builder pattern: set capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder pattern: set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

// ============================================================================
// Ring Buffer (Internal)
// ============================================================================

/// Ring buffer with O(1) insert and random access.
struct RingBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    /// Next position to write (circular). Once full this is also the oldest slot.
    write_pos: usize,
}

impl<T> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, item: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
        } else {
            self.buffer[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    #[inline]
    fn get(&self, idx: usize) -> &T {
        &self.buffer[idx]
    }

    #[inline]
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }

    /// Items from oldest to newest.
    fn iter_ordered(&self) -> impl Iterator<Item = &T> {
        let split = if self.buffer.len() < self.capacity {
            0
        } else {
            self.write_pos
        };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }
}

// ============================================================================
// Transition Batch
// ============================================================================

/// Column-wise batch of transitions; index `i` of every column is one transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    pub states: Vec<ArmState>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub next_states: Vec<ArmState>,
    pub terminated: Vec<bool>,
    pub goal_poses: Vec<Pose3>,
    pub goal_joints: Vec<Vec<f32>>,
    pub workspace_images: Vec<Arc<WorkspaceImage>>,
}

impl TransitionBatch {
    fn with_capacity(n: usize) -> Self {
        Self {
            states: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            next_states: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            goal_poses: Vec::with_capacity(n),
            goal_joints: Vec::with_capacity(n),
            workspace_images: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, t: &Transition) {
        self.states.push(t.state.clone());
        self.actions.push(t.action.clone());
        self.rewards.push(t.reward);
        self.next_states.push(t.next_state.clone());
        self.terminated.push(t.terminated);
        self.goal_poses.push(t.goal_pose);
        self.goal_joints.push(t.goal_joints.clone());
        self.workspace_images.push(Arc::clone(&t.workspace_image));
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

// ============================================================================
// Replay Buffer
// ============================================================================

/// Fixed-capacity transition store with uniform random sampling.
pub struct ReplayBuffer {
    config: BufferConfig,
    storage: RingBuffer<Transition>,
}

impl ReplayBuffer {
    pub fn new(config: BufferConfig) -> Self {
        assert!(config.capacity > 0, "replay buffer capacity must be > 0");
        Self {
            storage: RingBuffer::new(config.capacity),
            config,
        }
    }

    /// Buffer with the given capacity and default batch size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(BufferConfig::default().with_capacity(capacity))
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Insert a transition, evicting the oldest when full.
    pub fn insert(&mut self, transition: Transition) {
        self.storage.push(transition);
    }

    /// Insert several transitions in order.
    pub fn insert_many(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        for t in transitions {
            self.storage.push(t);
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Fill ratio in [0, 1].
    pub fn utilization(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Whether a batch of the configured size can be sampled.
    pub fn is_ready(&self) -> bool {
        self.len() >= self.config.batch_size
    }

    /// Stored transitions from oldest to newest.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &Transition> {
        self.storage.iter_ordered()
    }

    /// Sample `n` transitions uniformly with replacement.
    ///
    /// Fails with `InsufficientData` when fewer than `n` transitions are stored.
    pub fn sample_batch(&self, n: usize, rng: &mut StdRng) -> Result<TransitionBatch> {
        let available = self.len();
        if available < n || available == 0 {
            return Err(TrainingError::InsufficientData {
                requested: n,
                available,
            });
        }

        let mut batch = TransitionBatch::with_capacity(n);
        for _ in 0..n {
            let idx = rng.gen_range(0..available);
            batch.push(self.storage.get(idx));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn make_transition(id: usize) -> Transition {
        let image = Arc::new(WorkspaceImage::empty(2, 2));
        Transition::new(
            ArmState::from_joints(vec![id as f32]),
            vec![id as f32 * 0.1],
            id as f32,
            ArmState::from_joints(vec![id as f32 + 1.0]),
            id % 2 == 0,
            [id as f32, 0.0, 0.0],
            vec![id as f32],
            image,
        )
    }

    #[test]
    fn test_buffer_config_builder() {
        let config = BufferConfig::default()
            .with_capacity(100)
            .with_batch_size(32);
        assert_eq!(config.capacity, 100);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_insert_and_len() {
        let mut buffer = ReplayBuffer::with_capacity(10);
        assert!(buffer.is_empty());

        buffer.insert_many((0..5).map(make_transition));
        assert_eq!(buffer.len(), 5);
        assert!((buffer.utilization() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ring_keeps_latest_capacity() {
        let capacity = 10;
        let mut buffer = ReplayBuffer::with_capacity(capacity);
        for i in 0..capacity + 7 {
            buffer.insert(make_transition(i));
        }

        assert_eq!(buffer.len(), capacity);
        let rewards: Vec<f32> = buffer.iter_oldest_first().map(|t| t.reward).collect();
        let expected: Vec<f32> = (7..17).map(|i| i as f32).collect();
        assert_eq!(rewards, expected);
    }

    #[test]
    fn test_sample_insufficient_data() {
        let mut buffer = ReplayBuffer::with_capacity(100);
        buffer.insert_many((0..5).map(make_transition));
        let mut rng = StdRng::seed_from_u64(0);

        match buffer.sample_batch(6, &mut rng) {
            Err(TrainingError::InsufficientData {
                requested,
                available,
            }) => {
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|b| b.len())),
        }

        let empty = ReplayBuffer::with_capacity(4);
        assert!(empty.sample_batch(0, &mut rng).is_err());
    }

    #[test]
    fn test_sample_batch_aligned_and_from_existing_data() {
        let mut buffer = ReplayBuffer::with_capacity(20);
        for i in 0..30 {
            buffer.insert(make_transition(i));
        }
        let mut rng = StdRng::seed_from_u64(42);
        let batch = buffer.sample_batch(16, &mut rng).unwrap();

        assert_eq!(batch.len(), 16);
        assert_eq!(batch.actions.len(), 16);
        assert_eq!(batch.workspace_images.len(), 16);
        for i in 0..batch.len() {
            let id = batch.rewards[i] as usize;
            // Only the latest 20 survive eviction
            assert!((10..30).contains(&id));
            assert_eq!(batch.states[i].joints[0], id as f32);
            assert_eq!(batch.next_states[i].joints[0], id as f32 + 1.0);
            assert_eq!(batch.terminated[i], id % 2 == 0);
            assert_eq!(batch.goal_poses[i][0], id as f32);
        }
    }

    #[test]
    fn test_sampling_is_seed_reproducible() {
        let mut buffer = ReplayBuffer::with_capacity(50);
        buffer.insert_many((0..50).map(make_transition));

        let a = buffer
            .sample_batch(16, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let b = buffer
            .sample_batch(16, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a.rewards, b.rewards);
    }

    #[test]
    fn test_ready_once_a_batch_fits() {
        let mut buffer = ReplayBuffer::new(BufferConfig::new(20, 8));
        buffer.insert_many((0..7).map(make_transition));
        assert!(!buffer.is_ready());
        buffer.insert(make_transition(7));
        assert!(buffer.is_ready());
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReplayBuffer::with_capacity(4);
        buffer.insert_many((0..6).map(make_transition));
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.insert(make_transition(1));
        assert_eq!(buffer.iter_oldest_first().count(), 1);
    }
}
