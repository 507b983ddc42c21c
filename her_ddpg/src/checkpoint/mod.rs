//! Model checkpointing.
//!
//! ```rust,ignore
//! let mut checkpointer = Checkpointer::new(
//!     CheckpointerConfig::new(run_dir.join("checkpoints")).with_keep_last_n(5),
//! )?;
//! if checkpointer.should_save(cycle) {
//!     network.save_checkpoint(&mut checkpointer, global_step, Some(success_rate))?;
//! }
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
